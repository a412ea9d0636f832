//! SSE forwarder (spec.md §4.B): pumps an upstream byte stream to a
//! downstream writer, optionally transforming each event through a chunk
//! parser, with client-disconnect detection and pooled line buffers.

mod cancel;
mod pool;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use pool::BufferPool;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use relaygate_protocol::sse::SseParser;
use relaygate_protocol::stream::ChunkParser;
use relaygate_protocol::types::UnifiedChunk;
use std::future::Future;

pub const STANDARD_STREAM_HEADERS: &[(&str, &str)] = &[
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-accel-buffering", "no"),
];

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("client disconnected")]
    ClientDisconnected,
    #[error("upstream read failed: {0}")]
    UpstreamIo(String),
    #[error("downstream writer rejected data: {0}")]
    WriterRejected(String),
}

/// A downstream sink the forwarder writes SSE frames to. Implementations
/// should treat `flush` failing as fatal — the forwarder does (spec.md §4.B:
/// "rejects a downstream writer that cannot flush").
pub trait DownstreamWriter: Send {
    fn write_all(&mut self, data: Bytes) -> impl Future<Output = std::io::Result<()>> + Send;
    fn flush(&mut self) -> impl Future<Output = std::io::Result<()>> + Send;
}

#[derive(Debug, Default)]
pub struct ForwardOutcome {
    pub events_sent: u64,
    pub sent_done: bool,
}

/// Pump `upstream` to `writer`, decoding SSE framing and optionally running
/// each event's `data` payload through `parser`. `on_chunk` observes every
/// successfully parsed [`UnifiedChunk`] (used by the handler to accumulate
/// content/usage for fallback token estimation, spec.md §4.I.11).
pub async fn forward<S, W, P>(
    mut upstream: S,
    mut writer: W,
    cancel: CancelSignal,
    mut parser: Option<P>,
    mut on_chunk: impl FnMut(&UnifiedChunk),
    pool: &BufferPool,
) -> Result<ForwardOutcome, ForwardError>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
    W: DownstreamWriter,
    P: ChunkParser,
{
    writer
        .flush()
        .await
        .map_err(|e| ForwardError::WriterRejected(e.to_string()))?;

    let mut outcome = ForwardOutcome::default();
    let seed = String::from_utf8(pool.acquire()).unwrap_or_default();
    let mut sse = SseParser::with_buffer(seed);

    loop {
        if cancel.is_cancelled() {
            pool.release(sse.into_buffer().into_bytes());
            return Err(ForwardError::ClientDisconnected);
        }

        let next = upstream.next().await;
        let Some(item) = next else { break };
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(err) => {
                pool.release(sse.into_buffer().into_bytes());
                return Err(ForwardError::UpstreamIo(err.to_string()));
            }
        };

        for event in sse.push_bytes(&chunk) {
            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                write_event(&mut writer, done_sentinel()).await?;
                outcome.sent_done = true;
                outcome.events_sent += 1;
                pool.release(sse.into_buffer().into_bytes());
                return Ok(outcome);
            }

            let unified = match &mut parser {
                Some(p) => match p.parse_chunk(data) {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => continue,
                    Err(_) => continue,
                },
                None => continue,
            };

            on_chunk(&unified);
            let Ok(encoded) = serde_json::to_vec(&unified) else {
                continue;
            };
            write_event(&mut writer, encode_sse_data(&encoded)).await?;
            outcome.events_sent += 1;
        }
    }

    for event in sse.finish() {
        let data = event.data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        if let Some(p) = &mut parser
            && let Ok(Some(unified)) = p.parse_chunk(data)
        {
            on_chunk(&unified);
            if let Ok(encoded) = serde_json::to_vec(&unified) {
                write_event(&mut writer, encode_sse_data(&encoded)).await?;
                outcome.events_sent += 1;
            }
        }
    }

    pool.release(sse.into_buffer().into_bytes());
    Ok(outcome)
}

async fn write_event<W: DownstreamWriter>(writer: &mut W, frame: Bytes) -> Result<(), ForwardError> {
    writer
        .write_all(frame)
        .await
        .map_err(|e| ForwardError::WriterRejected(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| ForwardError::WriterRejected(e.to_string()))
}

fn encode_sse_data(json: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(json.len() + 8);
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(json);
    out.extend_from_slice(b"\n\n");
    Bytes::from(out)
}

pub fn done_sentinel() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_protocol::stream::openai::OpenAiChunkParser;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingWriter {
        frames: Arc<Mutex<Vec<Bytes>>>,
    }

    impl DownstreamWriter for RecordingWriter {
        async fn write_all(&mut self, data: Bytes) -> std::io::Result<()> {
            self.frames.lock().unwrap().push(data);
            Ok(())
        }
        async fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn upstream_of(lines: Vec<&str>) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        futures_util::stream::iter(
            lines
                .into_iter()
                .map(|l| Ok(Bytes::from(l.to_string())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn forwards_chunks_and_terminates_on_done() {
        let upstream = upstream_of(vec![
            "data: {\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let writer = RecordingWriter::default();
        let (_handle, cancel) = cancel_pair();
        let pool = BufferPool::new();
        let mut seen = 0;
        let outcome = forward(
            upstream,
            writer.clone(),
            cancel,
            Some(OpenAiChunkParser::default()),
            |_| seen += 1,
            &pool,
        )
        .await
        .unwrap();

        assert!(outcome.sent_done);
        assert_eq!(seen, 1);
        let frames = writer.frames.lock().unwrap();
        assert_eq!(frames.last().unwrap().as_ref(), done_sentinel().as_ref());
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let upstream = upstream_of(vec!["data: {}\n\n"]);
        let writer = RecordingWriter::default();
        let (handle, cancel) = cancel_pair();
        handle.cancel();
        let pool = BufferPool::new();
        let result = forward(
            upstream,
            writer,
            cancel,
            Some(OpenAiChunkParser::default()),
            |_| {},
            &pool,
        )
        .await;
        assert!(matches!(result, Err(ForwardError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn unparseable_chunk_is_skipped_silently() {
        let upstream = upstream_of(vec!["data: not json\n\n", "data: [DONE]\n\n"]);
        let writer = RecordingWriter::default();
        let (_handle, cancel) = cancel_pair();
        let pool = BufferPool::new();
        let outcome = forward(
            upstream,
            writer,
            cancel,
            Some(OpenAiChunkParser::default()),
            |_| {},
            &pool,
        )
        .await
        .unwrap();
        assert!(outcome.sent_done);
        assert_eq!(outcome.events_sent, 1);
    }

    #[tokio::test]
    async fn tolerates_a_large_sse_line() {
        let big = "x".repeat(40 * 1024);
        let line = format!(
            "data: {{\"id\":\"1\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{big}\"}}}}]}}\n\n"
        );
        let upstream = upstream_of(vec![line.as_str(), "data: [DONE]\n\n"]);
        let writer = RecordingWriter::default();
        let (_handle, cancel) = cancel_pair();
        let pool = BufferPool::new();
        let mut content_len = 0;
        let outcome = forward(
            upstream,
            writer,
            cancel,
            Some(OpenAiChunkParser::default()),
            |chunk| {
                if let Some(c) = &chunk.choices[0].delta.content {
                    content_len = c.len();
                }
            },
            &pool,
        )
        .await
        .unwrap();
        assert!(outcome.sent_done);
        assert_eq!(content_len, big.len());
    }
}
