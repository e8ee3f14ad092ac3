use crate::error::{ProjectionError, Result};
use crate::llm::types::GenerateContentResponse;
use log::warn;
use serde::Deserialize;

pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    Done,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChunkPayload {
    Relay { text: String },
    Error { error: serde_json::Value },
    Gemini(GenerateContentResponse),
}

/// Incremental decoder for `text/event-stream` bodies. Bytes may be split
/// anywhere, including inside a UTF-8 sequence; events are emitted once
/// their terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((end, separator_len)) = find_event_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + separator_len).take(end).collect();
            if let Some(event) = self.decode_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<Result<StreamEvent>> {
        let block = std::mem::take(&mut self.buffer);
        self.decode_block(&block).into_iter().collect()
    }

    fn decode_block(&mut self, block: &[u8]) -> Option<Result<StreamEvent>> {
        if self.finished {
            return None;
        }

        let text = match std::str::from_utf8(block) {
            Ok(text) => text,
            Err(e) => {
                return Some(Err(ProjectionError::StreamDecode(format!(
                    "invalid UTF-8 in event: {}",
                    e
                ))))
            }
        };

        let data: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|value| value.strip_prefix(' ').unwrap_or(value))
            .collect();
        if data.is_empty() {
            return None;
        }

        let data = data.join("\n");
        if data.trim() == DONE_MARKER {
            self.finished = true;
            return Some(Ok(StreamEvent::Done));
        }

        match decode_payload(&data) {
            Ok(Some(chunk)) => Some(Ok(StreamEvent::Text(chunk))),
            Ok(None) => None,
            Err(e) => {
                warn!("Dropping malformed stream chunk: {}", e);
                Some(Err(e))
            }
        }
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn decode_payload(data: &str) -> Result<Option<String>> {
    let payload: ChunkPayload = serde_json::from_str(data)
        .map_err(|e| ProjectionError::StreamDecode(format!("{}: {}", e, data)))?;

    match payload {
        ChunkPayload::Relay { text } => Ok(Some(text).filter(|t| !t.is_empty())),
        ChunkPayload::Error { error } => Err(ProjectionError::AnalysisFailed(error.to_string())),
        ChunkPayload::Gemini(response) => Ok(response.first_text().filter(|t| !t.is_empty())),
    }
}
