//! Rebuilds an assistant reply from the gateway's event stream.

use crate::error::{ClientError, ClientResult};
use futures_util::{Stream, StreamExt};
use jobot_common::{FrameDecoder, StreamFrame};
use std::fmt::Display;

enum Step {
    Continue,
    Done,
}

fn apply_payload<F>(payload: &str, text: &mut String, on_update: &mut F) -> ClientResult<Step>
where
    F: FnMut(&str),
{
    let frame: StreamFrame = match serde_json::from_str(payload) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, payload, "Skipping malformed stream frame");
            return Ok(Step::Continue);
        }
    };

    if let Some(error) = frame.error {
        return Err(ClientError::Server(error));
    }
    if let Some(content) = frame.content {
        text.push_str(&content);
        on_update(text);
    }
    if frame.done {
        return Ok(Step::Done);
    }
    Ok(Step::Continue)
}

/// Read frames until `done`, an error frame, or the end of the stream.
///
/// `on_update` receives the accumulated reply after every content frame.
/// Returns the full reply text.
pub async fn reconstruct<S, B, E, F>(chunks: S, mut on_update: F) -> ClientResult<String>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    F: FnMut(&str),
{
    let mut chunks = std::pin::pin!(chunks);
    let mut decoder = FrameDecoder::new();
    let mut text = String::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| ClientError::Transport(e.to_string()))?;
        for payload in decoder.push(chunk.as_ref()) {
            if let Step::Done = apply_payload(&payload, &mut text, &mut on_update)? {
                return Ok(text);
            }
        }
    }

    if let Some(payload) = decoder.finish() {
        apply_payload(&payload, &mut text, &mut on_update)?;
    }
    tracing::debug!("Stream closed without a done frame");
    Ok(text)
}
