use std::future::Future;

pub mod backend;
pub mod sse;

/// Input for one summarization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub transcript: String,
    /// Template instruction forwarded verbatim to the endpoint.
    pub instruction: String,
}

/// Streams a summary for a transcript.
///
/// The call suspends for the duration of the stream. `on_chunk` fires once
/// per text delta in arrival order; `on_progress` reports coarse percentage
/// waypoints with a short status note. The resolved value is the full
/// concatenated summary.
pub trait SummaryStreamer {
    type Error: std::fmt::Display + Send;

    fn stream_summary(
        &self,
        request: SummaryRequest,
        on_chunk: impl FnMut(&str) + Send,
        on_progress: impl FnMut(u8, &str) + Send,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}
