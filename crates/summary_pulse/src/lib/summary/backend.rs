use std::{path::PathBuf, time::Duration};

use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::PulseError,
    summary::{sse::collect_frames, SummaryRequest, SummaryStreamer},
};

/// HTTP client for the processing backend: file staging and the streaming
/// summarization endpoint.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    const REQUEST_TIMEOUT_SECS: u64 = 120;

    pub fn new(base_url: impl Into<String>) -> Result<Self, PulseError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(Self::REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(BackendClient {
            client,
            base_url: base_url.into(),
        })
    }

    /// Stages a local file with the backend and returns the server-side path
    /// to use as the task source.
    pub async fn upload_file(&self, file: impl Into<PathBuf>) -> Result<UploadResponse, PulseError> {
        let path = file.into();
        let bytes = tokio::fs::read(&path).await?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(PulseError::Api { status, message });
        }

        Ok(resp.json::<UploadResponse>().await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub path: String,
}

impl SummaryStreamer for BackendClient {
    type Error = PulseError;

    async fn stream_summary(
        &self,
        request: SummaryRequest,
        mut on_chunk: impl FnMut(&str) + Send,
        mut on_progress: impl FnMut(u8, &str) + Send,
    ) -> Result<String, PulseError> {
        let body = serde_json::json!({
            "transcript": request.transcript,
            "templateInstruction": request.instruction,
        });

        let resp = self
            .client
            .post(format!("{}/api/summarize/stream", self.base_url))
            .json(&body)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(PulseError::Api { status, message });
        }

        let stream = resp.bytes_stream();
        futures::pin_mut!(stream);

        let mut chunks_seen: u32 = 0;
        let mut last_reported: u8 = 0;
        collect_frames(stream, |text| {
            on_chunk(text);
            chunks_seen += 1;
            let pct = streaming_progress(chunks_seen);
            if pct != last_reported {
                last_reported = pct;
                on_progress(pct, "Generating summary");
            }
        })
        .await
    }
}

/// Maps chunk count onto the streaming progress band. The transcript lands at
/// 60; streaming creeps toward 95 and completion sets 100.
fn streaming_progress(chunks_seen: u32) -> u8 {
    let crept = (chunks_seen / 2).min(35) as u8;
    60 + crept
}
