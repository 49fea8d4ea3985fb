mod bridge;
pub mod channel;
mod error;
pub mod export;
pub mod notify;
pub mod summary;
pub mod templates;
pub mod tracing;

pub use bridge::{builder::SummaryOrchestratorBuilder, SummaryOrchestrator};
pub use channel::{
    client::PushChannelClient, ChannelEvent, CommandChannel, EventFilter, OutboundMessage,
    StartItem,
};
pub use error::PulseError;
pub use export::{ExportRequest, Exporter, MarkdownExporter};
pub use notify::{LogNotifier, Notifier};
pub use summary::{backend::BackendClient, SummaryRequest, SummaryStreamer};
pub use templates::SummaryTemplate;
