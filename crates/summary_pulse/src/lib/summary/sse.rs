//! Incremental decoding of the summarization endpoint's event stream.
//!
//! The endpoint responds with SSE-style framing: each frame is a single
//! `data: <json>` line terminated by a blank line, and network reads may cut
//! frames anywhere, including inside a multi-byte character. [`FrameDecoder`]
//! buffers raw bytes and yields only complete frames; [`collect_frames`]
//! drives a decoder over a byte stream and applies the end-of-stream rules.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::PulseError;

const DATA_MARKER: &str = "data: ";
const FRAME_SEPARATOR: &[u8] = b"\n\n";

/// One decoded frame of the summary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A delta of summary text, in arrival order.
    Chunk { text: String },
    /// The endpoint finished cleanly. Nothing after this frame matters.
    Done,
    /// The endpoint failed mid-generation.
    Error { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WirePayload {
    Chunk {
        #[serde(default)]
        text: String,
    },
    Done,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Reassembles frames from arbitrarily fragmented reads.
///
/// Feed it whatever the transport hands over; it returns every frame that
/// completed with that read. Malformed frames are logged and skipped, so
/// keep-alives and junk lines cannot poison the stream. A trailing fragment
/// that never sees its separator is silently discarded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = find_separator(&self.buffer) {
            let unit: Vec<u8> = self.buffer.drain(..pos + FRAME_SEPARATOR.len()).collect();
            if let Some(frame) = parse_unit(&unit[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_SEPARATOR.len())
        .position(|w| w == FRAME_SEPARATOR)
}

fn parse_unit(unit: &[u8]) -> Option<StreamFrame> {
    let Ok(text) = std::str::from_utf8(unit) else {
        tracing::warn!("Skipping frame with invalid utf-8");
        return None;
    };
    let line = text.trim();
    if line.is_empty() {
        return None;
    }
    let Some(payload) = line.strip_prefix(DATA_MARKER) else {
        tracing::debug!("Skipping non-data line in summary stream");
        return None;
    };

    match serde_json::from_str::<WirePayload>(payload) {
        Ok(WirePayload::Chunk { text }) => Some(StreamFrame::Chunk { text }),
        Ok(WirePayload::Done) => Some(StreamFrame::Done),
        Ok(WirePayload::Error { message }) => Some(StreamFrame::Error {
            message: message.unwrap_or_else(|| "summarization failed".to_string()),
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed frame in summary stream");
            None
        }
    }
}

/// Consumes a byte stream through a [`FrameDecoder`], invoking `on_chunk` for
/// every text delta, and resolves with the concatenated summary.
///
/// Resolution rules, in order:
/// - a `done` frame completes immediately, without waiting for the transport
///   to close;
/// - an `error` frame fails with [`PulseError::Summarization`];
/// - end of stream with accumulated text completes leniently;
/// - end of stream with nothing accumulated fails with
///   [`PulseError::EmptyResponse`].
pub async fn collect_frames<S, E>(
    mut stream: S,
    mut on_chunk: impl FnMut(&str),
) -> Result<String, PulseError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<PulseError>,
{
    let mut decoder = FrameDecoder::new();
    let mut summary = String::new();

    while let Some(read) = stream.next().await {
        let bytes = read.map_err(Into::into)?;
        for frame in decoder.feed(&bytes) {
            match frame {
                StreamFrame::Chunk { text } => {
                    on_chunk(&text);
                    summary.push_str(&text);
                }
                StreamFrame::Done => return Ok(summary),
                StreamFrame::Error { message } => {
                    return Err(PulseError::Summarization { message })
                }
            }
        }
    }

    if summary.is_empty() {
        Err(PulseError::EmptyResponse)
    } else {
        tracing::warn!("Summary stream ended without a done frame; keeping accumulated text");
        Ok(summary)
    }
}
