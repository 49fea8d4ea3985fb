use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use task_ledger::{TaskLedger, TaskPatch, TaskStatus};

use crate::{
    channel::{ChannelEvent, CommandChannel, EventFilter, LogLevel, OutboundMessage, StartItem},
    error::PulseError,
    export::{ExportRequest, Exporter},
    notify::Notifier,
    summary::{SummaryRequest, SummaryStreamer},
    templates::SummaryTemplate,
};

pub mod builder;

/// Progress once a transcript is in hand and summarization starts.
const SUMMARIZING_PROGRESS: u8 = 60;
/// Progress while the finished summary is being written out.
const EXPORTING_PROGRESS: u8 = 95;

/// Ties the pieces together: remote events flow into the ledger, transcripts
/// trigger summarization, finished summaries get exported.
///
/// Summarizations run as spawned tasks so the event loop keeps draining while
/// a summary streams. A per-task permit set makes sure each transcript is
/// summarized at most once at a time, whatever the service re-sends.
pub struct SummaryOrchestrator<C, S, E, N>
where
    C: CommandChannel + Send + Sync + 'static,
    S: SummaryStreamer + Send + Sync + 'static,
    E: Exporter + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    inner: Arc<OrchestratorInner<C, S, E, N>>,
}

struct OrchestratorInner<C, S, E, N> {
    ledger: Arc<TaskLedger>,
    channel: C,
    streamer: S,
    exporter: E,
    notifier: N,
    active: Arc<Mutex<HashSet<String>>>,
    template: Mutex<Option<SummaryTemplate>>,
}

impl<C, S, E, N> SummaryOrchestrator<C, S, E, N>
where
    C: CommandChannel + Send + Sync + 'static,
    S: SummaryStreamer + Send + Sync + 'static,
    E: Exporter + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    pub fn ledger(&self) -> Arc<TaskLedger> {
        self.inner.ledger.clone()
    }

    /// Asks the service to start every pending task, all in one request
    /// carrying the chosen template's instruction. Returns the batch size.
    ///
    /// Without a usable template nothing is sent: the user gets a notice and
    /// the tasks stay pending.
    #[tracing::instrument(skip_all)]
    pub fn start_processing(&self, template: Option<&SummaryTemplate>) -> usize {
        let pending = self.inner.ledger.pending();
        if pending.is_empty() {
            tracing::info!("No pending tasks to start");
            return 0;
        }

        let Some(template) = template.filter(|t| !t.instruction.trim().is_empty()) else {
            tracing::warn!(
                pending = pending.len(),
                "No summary template selected; tasks stay pending"
            );
            self.inner
                .notifier
                .notify("No template selected", "Pick a summary template before starting.");
            return 0;
        };

        *lock(&self.inner.template) = Some(template.clone());

        let tasks: Vec<StartItem> = pending
            .iter()
            .map(|task| StartItem {
                id: task.id.clone(),
                kind: task.kind,
                source: task.source.clone(),
                label: task.label.clone(),
                template_instruction: template.instruction.clone(),
            })
            .collect();
        let count = tasks.len();

        if self
            .inner
            .channel
            .send(OutboundMessage::StartProcessing { tasks })
        {
            tracing::info!(count, template = %template.id, "Requested processing");
        } else {
            tracing::warn!(count, "Start request dropped; channel not connected");
        }
        count
    }

    /// Drains the channel subscription until the channel goes away. Run this
    /// concurrently with whatever else the process does.
    pub async fn run(&self) {
        let mut events = self.inner.channel.subscribe(EventFilter::Any);
        tracing::debug!("Orchestrator event loop started");
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("Channel subscription ended; orchestrator loop exiting");
    }

    fn handle_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => tracing::info!("Processing service connected"),
            ChannelEvent::Progress { task_id, patch }
            | ChannelEvent::TaskUpdate { task_id, patch } => {
                self.inner.ledger.apply(&task_id, patch);
            }
            ChannelEvent::TaskLog {
                task_id,
                level,
                message,
            } => log_remote(&task_id, level, &message),
            ChannelEvent::TranscriptReady {
                task_id,
                transcript,
            } => self.on_transcript_ready(task_id, transcript),
            ChannelEvent::TransportError { message } => {
                tracing::warn!(%message, "Channel transport error");
            }
            ChannelEvent::Closed { reconnecting } => {
                tracing::info!(reconnecting, "Channel closed");
            }
        }
    }

    #[tracing::instrument(skip(self, transcript), fields(transcript_len = transcript.len()))]
    fn on_transcript_ready(&self, task_id: String, transcript: String) {
        // The duplicate check comes first so that a redelivered event, whatever
        // it carries, cannot touch a task with a summarization in flight.
        let Some(permit) = SummaryPermit::acquire(&self.inner.active, &task_id) else {
            tracing::debug!("Summarization already in flight; ignoring duplicate transcript");
            return;
        };
        let Some(task) = self.inner.ledger.get(&task_id) else {
            tracing::debug!("Transcript for unknown task; ignoring");
            return;
        };
        if task.status.is_terminal() {
            tracing::debug!(status = ?task.status, "Transcript for settled task; ignoring");
            return;
        }
        if transcript.trim().is_empty() {
            let reason = PulseError::EmptyTranscript.to_string();
            self.inner.ledger.apply(&task_id, TaskPatch::failed(&reason));
            self.inner.notifier.notify("Summarization failed", &reason);
            return;
        }

        self.inner.ledger.apply(
            &task_id,
            TaskPatch::progress(
                TaskStatus::Processing,
                SUMMARIZING_PROGRESS,
                "Generating summary",
            ),
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _permit = permit;
            inner.summarize(&task_id, transcript).await;
        });
    }
}

impl<C, S, E, N> Clone for SummaryOrchestrator<C, S, E, N>
where
    C: CommandChannel + Send + Sync + 'static,
    S: SummaryStreamer + Send + Sync + 'static,
    E: Exporter + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        SummaryOrchestrator {
            inner: self.inner.clone(),
        }
    }
}

impl<C, S, E, N> OrchestratorInner<C, S, E, N>
where
    C: CommandChannel + Send + Sync + 'static,
    S: SummaryStreamer + Send + Sync + 'static,
    E: Exporter + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
{
    async fn summarize(&self, task_id: &str, transcript: String) {
        let instruction = lock(&self.template)
            .as_ref()
            .map(|t| t.instruction.clone())
            .unwrap_or_default();
        if instruction.is_empty() {
            tracing::debug!(task_id = %task_id, "No template on record; summarizing without instruction");
        }

        let request = SummaryRequest {
            transcript,
            instruction,
        };
        let result = self
            .streamer
            .stream_summary(
                request,
                |delta| {
                    tracing::trace!(task_id = %task_id, delta_len = delta.len(), "Summary delta");
                },
                |progress, note| {
                    self.ledger.apply(
                        task_id,
                        TaskPatch {
                            progress: Some(progress),
                            message: Some(note.to_string()),
                            ..Default::default()
                        },
                    );
                },
            )
            .await;

        match result {
            Ok(summary) => self.finish(task_id, summary).await,
            Err(e) => {
                tracing::error!(error = %e, task_id = %task_id, "Summarization failed");
                let reason = e.to_string();
                self.ledger.apply(task_id, TaskPatch::failed(&reason));
                self.notifier.notify("Summarization failed", &reason);
            }
        }
    }

    async fn finish(&self, task_id: &str, summary: String) {
        let Some(task) = self.ledger.get(task_id) else {
            tracing::debug!(task_id = %task_id, "Task removed mid-summarization; discarding result");
            return;
        };

        self.ledger.apply(
            task_id,
            TaskPatch {
                progress: Some(EXPORTING_PROGRESS),
                message: Some("Exporting summary".to_string()),
                ..Default::default()
            },
        );

        let request = ExportRequest {
            task_id: task.id,
            kind: task.kind,
            source: task.source,
            label: task.label,
            summary,
        };
        match self.exporter.export(request).await {
            Ok(location) => {
                self.ledger.apply(task_id, TaskPatch::completed(&location));
                tracing::info!(task_id = %task_id, location = %location, "Task completed");
                self.notifier.notify("Summary ready", &location);
            }
            Err(e) => {
                tracing::error!(error = %e, task_id = %task_id, "Failed to export summary");
                let reason = format!("Export failed: {e}");
                self.ledger.apply(task_id, TaskPatch::failed(&reason));
                self.notifier.notify("Summarization failed", &reason);
            }
        }
    }
}

/// Membership in the active set, released on drop so every exit path of a
/// summarization run frees its task.
struct SummaryPermit {
    active: Arc<Mutex<HashSet<String>>>,
    task_id: String,
}

impl SummaryPermit {
    fn acquire(active: &Arc<Mutex<HashSet<String>>>, task_id: &str) -> Option<Self> {
        if !lock(active).insert(task_id.to_string()) {
            return None;
        }
        Some(SummaryPermit {
            active: active.clone(),
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for SummaryPermit {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.task_id);
    }
}

fn log_remote(task_id: &str, level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(task_id = %task_id, "{message}"),
        LogLevel::Info => tracing::info!(task_id = %task_id, "{message}"),
        LogLevel::Warning => tracing::warn!(task_id = %task_id, "{message}"),
        LogLevel::Error => tracing::error!(task_id = %task_id, "{message}"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
