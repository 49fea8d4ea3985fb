//! Push channel wire format and the client-facing event surface.
//!
//! The processing service speaks JSON messages discriminated by a `type`
//! field. Task ids arrive under `taskId`, `task_id`, or both at once
//! depending on the emitting code path; normalization into [`ChannelEvent`]
//! happens here, in one place, so nothing downstream ever sees the raw wire
//! shapes.

use serde::{Deserialize, Serialize};
use task_ledger::{TaskKind, TaskPatch};
use tokio::sync::mpsc;

pub mod client;

/// Inbound message as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireEvent {
    Connected,
    Progress {
        #[serde(flatten)]
        id: WireTaskId,
        #[serde(flatten)]
        patch: TaskPatch,
    },
    TaskUpdate {
        #[serde(flatten)]
        id: WireTaskId,
        #[serde(flatten)]
        patch: TaskPatch,
    },
    TaskLog {
        #[serde(flatten)]
        id: WireTaskId,
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        message: String,
    },
    TranscriptReady {
        #[serde(flatten)]
        id: WireTaskId,
        #[serde(default)]
        transcript: String,
    },
}

/// The service writes the id under both spellings in most messages; either
/// alone is accepted, and the camelCase one wins when they disagree.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireTaskId {
    #[serde(default, rename = "taskId")]
    camel: Option<String>,
    #[serde(default, rename = "task_id")]
    snake: Option<String>,
}

impl WireTaskId {
    fn into_id(self) -> Option<String> {
        self.camel.or(self.snake)
    }
}

impl WireEvent {
    /// Collapses the wire shape into a [`ChannelEvent`]. Returns None when a
    /// task-scoped message carries no id at all.
    pub(crate) fn normalize(self) -> Option<ChannelEvent> {
        Some(match self {
            WireEvent::Connected => ChannelEvent::Connected,
            WireEvent::Progress { id, patch } => ChannelEvent::Progress {
                task_id: id.into_id()?,
                patch,
            },
            WireEvent::TaskUpdate { id, patch } => ChannelEvent::TaskUpdate {
                task_id: id.into_id()?,
                patch,
            },
            WireEvent::TaskLog { id, level, message } => ChannelEvent::TaskLog {
                task_id: id.into_id()?,
                level: LogLevel::parse(level.as_deref()),
                message,
            },
            WireEvent::TranscriptReady { id, transcript } => ChannelEvent::TranscriptReady {
                task_id: id.into_id()?,
                transcript,
            },
        })
    }
}

/// Severity of a remote task log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn parse(level: Option<&str>) -> Self {
        match level {
            Some("debug") => LogLevel::Debug,
            Some("warning") | Some("warn") => LogLevel::Warning,
            Some("error") => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Normalized event delivered to subscribers.
///
/// `TransportError` and `Closed` are generated locally by the client; the
/// rest mirror wire messages.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Progress {
        task_id: String,
        patch: TaskPatch,
    },
    TaskUpdate {
        task_id: String,
        patch: TaskPatch,
    },
    TaskLog {
        task_id: String,
        level: LogLevel,
        message: String,
    },
    TranscriptReady {
        task_id: String,
        transcript: String,
    },
    TransportError {
        message: String,
    },
    Closed {
        reconnecting: bool,
    },
}

/// What a subscription wants to see. `Any` is the catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Any,
    Connected,
    Progress,
    TaskUpdate,
    TaskLog,
    TranscriptReady,
    TransportError,
    Closed,
}

impl EventFilter {
    pub fn matches(&self, event: &ChannelEvent) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::Connected => matches!(event, ChannelEvent::Connected),
            EventFilter::Progress => matches!(event, ChannelEvent::Progress { .. }),
            EventFilter::TaskUpdate => matches!(event, ChannelEvent::TaskUpdate { .. }),
            EventFilter::TaskLog => matches!(event, ChannelEvent::TaskLog { .. }),
            EventFilter::TranscriptReady => {
                matches!(event, ChannelEvent::TranscriptReady { .. })
            }
            EventFilter::TransportError => {
                matches!(event, ChannelEvent::TransportError { .. })
            }
            EventFilter::Closed => matches!(event, ChannelEvent::Closed { .. }),
        }
    }
}

/// Outbound message to the processing service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    StartProcessing { tasks: Vec<StartItem> },
}

/// One task entry of a start request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartItem {
    pub id: String,
    pub kind: TaskKind,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub template_instruction: String,
}

/// Seam between the orchestrator and whatever carries its messages.
pub trait CommandChannel {
    /// Hands a message to the transport. Returns false, after logging a
    /// warning, when the channel is not connected; messages are never queued
    /// for later and failures here never panic.
    fn send(&self, message: OutboundMessage) -> bool;

    /// Registers a subscription. Dropping the receiver unsubscribes.
    fn subscribe(&self, filter: EventFilter) -> mpsc::UnboundedReceiver<ChannelEvent>;
}
