//! Server-sent event framing.
//!
//! Both directions of the chat stream speak the same framing: one event is
//! one or more `data:` lines terminated by a blank line. The gateway uses
//! [`FrameDecoder`] to read the upstream completion stream, and the chat
//! client uses it to rebuild assistant replies from the gateway's stream.

use serde::Serialize;

/// Prefix of an event data line.
pub const DATA_PREFIX: &str = "data:";

/// Upstream sentinel marking the end of an OpenAI-style completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Encode a payload as one event frame: `data: <json>\n\n`.
pub fn encode_frame<T: Serialize>(payload: &T) -> serde_json::Result<String> {
    Ok(format!("{} {}\n\n", DATA_PREFIX, serde_json::to_string(payload)?))
}

/// Extract the data payload from a single event.
///
/// Multiple `data:` lines are joined with `\n`. Comment lines (`:`) and other
/// fields (`event:`, `id:`) are ignored. Returns `None` for events with no data.
pub fn data_payload(event: &str) -> Option<String> {
    let mut lines: Vec<&str> = Vec::new();

    for line in event.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Incremental decoder turning arbitrary byte chunks into event payloads.
///
/// Chunks may end anywhere: inside a frame, inside a delimiter, or inside a
/// multi-byte UTF-8 sequence. Bytes are buffered until a full frame is seen.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the data payloads of every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((pos, delimiter_len)) = find_boundary(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..pos + delimiter_len).collect();
            let text = String::from_utf8_lossy(&frame[..pos]);
            if text.trim().is_empty() {
                continue;
            }
            if let Some(payload) = data_payload(&text) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            return None;
        }
        data_payload(&text)
    }
}

/// Locate the earliest frame boundary, returning its offset and length.
fn find_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|pos| (pos, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
