use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use summary_pulse::{SummaryRequest, SummaryStreamer};

/// Scripted summarizer. Replays the configured chunks through `on_chunk`
/// and records every request it receives.
#[derive(Clone)]
pub struct MockStreamer {
    requests: Arc<Mutex<Vec<SummaryRequest>>>,
    chunks: Vec<String>,
    delay: Option<Duration>,
    fail_with: Option<String>,
}

impl MockStreamer {
    pub fn new(chunks: &[&str]) -> Self {
        MockStreamer {
            requests: Arc::new(Mutex::new(Vec::new())),
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            delay: None,
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut streamer = Self::new(&[]);
        streamer.fail_with = Some(message.to_string());
        streamer
    }

    /// Keeps the call in flight for `delay` before streaming anything.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SummaryRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl SummaryStreamer for MockStreamer {
    type Error = anyhow::Error;

    async fn stream_summary(
        &self,
        request: SummaryRequest,
        mut on_chunk: impl FnMut(&str) + Send,
        mut on_progress: impl FnMut(u8, &str) + Send,
    ) -> Result<String, anyhow::Error> {
        self.requests.lock().unwrap().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{message}");
        }

        let mut summary = String::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            on_chunk(chunk);
            on_progress(60 + i as u8, "Generating summary");
            summary.push_str(chunk);
        }
        Ok(summary)
    }
}
