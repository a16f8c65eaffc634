//! Line-oriented SSE pass-through with usage injection.
//!
//! The upstream body is relayed byte-for-byte except for one case: a
//! `data:` chunk whose first choice has `finish_reason = "stop"` and no
//! `usage` field is re-serialized with usage synthesized from the token
//! estimator. Everything else, including the `data: [DONE]` terminator
//! and any comment or event lines, passes through unchanged.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::provider::ActiveGuard;
use crate::protocol::StreamChunk;
use crate::usage::TokenEstimator;

/// State carried across the relayed stream
struct Splice<S> {
    upstream: S,
    buffer: BytesMut,
    estimator: TokenEstimator,
    // Held so a client disconnect releases the provider's in-flight slot
    _guard: ActiveGuard,
    finished: bool,
}

/// Relay an upstream SSE body line by line, injecting usage where missing.
///
/// `upstream` is the raw byte stream of the provider response; the guard
/// is dropped when the returned stream is, covering client disconnects.
pub fn relay_sse<S>(
    upstream: S,
    estimator: TokenEstimator,
    guard: ActiveGuard,
) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let splice = Splice {
        upstream,
        buffer: BytesMut::new(),
        estimator,
        _guard: guard,
        finished: false,
    };

    futures_util::stream::unfold(splice, |mut splice| async move {
        if splice.finished {
            return None;
        }

        loop {
            // Emit the next complete line if the buffer holds one
            if let Some(newline) = splice.buffer.iter().position(|&b| b == b'\n') {
                let line = splice.buffer.split_to(newline + 1);
                let out = process_line(&line, &mut splice.estimator);
                return Some((Ok(out), splice));
            }

            match splice.upstream.next().await {
                Some(Ok(chunk)) => splice.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    splice.finished = true;
                    return Some((
                        Err(std::io::Error::other(format!("upstream stream error: {e}"))),
                        splice,
                    ));
                }
                None => {
                    splice.finished = true;
                    if splice.buffer.is_empty() {
                        return None;
                    }
                    // Trailing bytes without a newline: flush as-is
                    let line = splice.buffer.split();
                    let out = process_line(&line, &mut splice.estimator);
                    return Some((Ok(out), splice));
                }
            }
        }
    })
}

/// Inspect one raw line (terminator included) and rewrite it if it is the
/// final content chunk missing usage.
fn process_line(line: &[u8], estimator: &mut TokenEstimator) -> Bytes {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(_) => return Bytes::copy_from_slice(line),
    };

    let trimmed = text.trim_end_matches(['\r', '\n']);
    let Some(payload) = trimmed.strip_prefix("data:") else {
        return Bytes::copy_from_slice(line);
    };
    let payload = payload.trim_start();

    if payload == "[DONE]" {
        return Bytes::copy_from_slice(line);
    }

    let Ok(mut chunk) = serde_json::from_str::<StreamChunk>(payload) else {
        // Not a completion chunk; pass through untouched
        return Bytes::copy_from_slice(line);
    };

    if let Some(choice) = chunk.choices.first() {
        estimator.observe_delta(&choice.delta);
    }

    let stop = chunk
        .choices
        .first()
        .is_some_and(|c| c.finish_reason.as_deref() == Some("stop"));

    if stop && chunk.usage.is_none() {
        chunk.usage = Some(estimator.usage());
        match serde_json::to_string(&chunk) {
            Ok(rewritten) => {
                let terminator = &text[trimmed.len()..];
                return Bytes::from(format!("data: {rewritten}{terminator}"));
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to re-serialize usage chunk, passing through");
            }
        }
    }

    Bytes::copy_from_slice(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChatMessage;

    fn estimator() -> TokenEstimator {
        TokenEstimator::new(&[ChatMessage::text("user", "say something")])
    }

    fn line(s: &str) -> Vec<u8> {
        format!("{s}\n").into_bytes()
    }

    #[test]
    fn non_data_lines_pass_through() {
        let mut est = estimator();
        let raw = line(": keep-alive comment");
        assert_eq!(process_line(&raw, &mut est), Bytes::from(raw.clone()));

        let blank = line("");
        assert_eq!(process_line(&blank, &mut est), Bytes::from(blank.clone()));
    }

    #[test]
    fn done_terminator_passes_through() {
        let mut est = estimator();
        let raw = line("data: [DONE]");
        assert_eq!(process_line(&raw, &mut est), Bytes::from(raw.clone()));
    }

    #[test]
    fn intermediate_chunks_pass_through_unchanged() {
        let mut est = estimator();
        let raw = line(r#"data: {"id":"c","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"hi"},"finish_reason":null}]}"#);
        assert_eq!(process_line(&raw, &mut est), Bytes::from(raw.clone()));
    }

    #[test]
    fn stop_chunk_without_usage_is_rewritten() {
        let mut est = estimator();

        // Content arrives first so the estimator has something to count
        let content = line(r#"data: {"id":"c","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"hello world"},"finish_reason":null}]}"#);
        process_line(&content, &mut est);

        let stop = line(r#"data: {"id":"c","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#);
        let out = process_line(&stop, &mut est);
        let text = std::str::from_utf8(&out).unwrap();

        let payload = text.trim_end().strip_prefix("data: ").unwrap();
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        let usage = &value["usage"];
        let prompt = usage["prompt_tokens"].as_u64().unwrap();
        let completion = usage["completion_tokens"].as_u64().unwrap();
        assert!(prompt >= 1);
        assert!(completion >= 1);
        assert_eq!(usage["total_tokens"].as_u64().unwrap(), prompt + completion);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn stop_chunk_with_usage_is_preserved_verbatim() {
        let mut est = estimator();
        let raw = line(r#"data: {"id":"c","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#);
        assert_eq!(process_line(&raw, &mut est), Bytes::from(raw.clone()));
    }

    #[test]
    fn unparseable_data_lines_pass_through() {
        let mut est = estimator();
        let raw = line("data: {not json");
        assert_eq!(process_line(&raw, &mut est), Bytes::from(raw.clone()));
    }
}
