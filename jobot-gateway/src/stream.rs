//! Event-stream relay from upstream fragments to the chat client.

use crate::provider::FragmentStream;
use async_stream::stream;
use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use jobot_common::sse::encode_frame;
use jobot_common::StreamFrame;
use std::convert::Infallible;

fn frame_text(frame: &StreamFrame) -> String {
    // StreamFrame holds only strings and a bool
    encode_frame(frame).unwrap_or_else(|_| "data: {\"error\":\"encoding failed\"}\n\n".to_string())
}

/// Build the streaming response for an already-opened upstream stream.
///
/// Emits one `{"content"}` frame per non-empty fragment and a final
/// `{"done":true}`. If the upstream fails part-way the stream ends with a
/// single `{"error"}` frame instead of `done`.
pub fn event_stream_response(mut fragments: FragmentStream, request_id: String) -> Response {
    let body = stream! {
        let mut relayed = 0usize;

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    relayed += 1;
                    yield frame_text(&StreamFrame::content(fragment));
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        relayed,
                        error = %e,
                        "Upstream stream failed"
                    );
                    yield frame_text(&StreamFrame::error(e.message));
                    return;
                }
            }
        }

        tracing::debug!(request_id = %request_id, relayed, "Stream complete");
        yield frame_text(&StreamFrame::done());
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body.map(Ok::<_, Infallible>)),
    )
        .into_response()
}
