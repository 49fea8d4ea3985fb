use task_ledger::ValidationError;

/// Errors surfaced by the pipeline.
///
/// Transport problems are recovered locally (logged, reported, and retried by
/// the channel's reconnect loop); task-level failures are terminal for that
/// task only and never take the process down.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("transcript is empty; nothing to summarize")]
    EmptyTranscript,
    #[error("summarization failed: {message}")]
    Summarization { message: String },
    #[error("summarization stream ended without producing any content")]
    EmptyResponse,
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}
