//! Incremental decoding of streamed chat responses.
//!
//! Bytes arrive in arbitrary chunks. [`LineDecoder`] reassembles complete
//! lines, [`classify_line`] tells SSE `data:` payloads, bare NDJSON lines and
//! noise apart, and each adapter supplies a [`ChunkDecoder`] that turns one
//! payload into at most one text delta. A spawned reader task forwards the
//! result as [`StreamEvent`]s over a bounded channel to a [`DeltaStream`].

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_core::types::{StreamEvent, UsageInfo};
use parley_core::CancellationToken;

use crate::error::ProviderError;

/// Capacity of the event channel between reader task and consumer.
const EVENT_BUFFER: usize = 64;

// ─────────────────────────────────────────────
// Line reassembly
// ─────────────────────────────────────────────

/// Splits a byte stream into lines, holding partial lines between chunks.
///
/// Buffering raw bytes (not text) keeps multi-byte UTF-8 sequences intact
/// when a chunk boundary falls inside one.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Feed a chunk; returns every line it completed (without `\r\n`/`\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(to_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Whatever is left once the body ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(to_line(&rest))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ─────────────────────────────────────────────
// Frame classification
// ─────────────────────────────────────────────

/// What one line of a streamed body means.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A JSON payload to hand to the adapter.
    Data(&'a str),
    /// The `[DONE]` sentinel.
    Done,
    /// Blank lines, SSE comments and non-data SSE fields.
    Skip,
}

/// Classify a line as SSE (`data: {...}`) or bare NDJSON (`{...}`).
///
/// Bare lines may also be elements of a streamed JSON array, so leading `[`
/// or `,` and trailing `]` or `,` are stripped.
pub fn classify_line(line: &str) -> Frame<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Frame::Skip;
    }
    if let Some(payload) = line.strip_prefix("data:") {
        let payload = payload.trim();
        return match payload {
            "" => Frame::Skip,
            "[DONE]" => Frame::Done,
            p => Frame::Data(p),
        };
    }
    if ["event:", "id:", "retry:"].iter().any(|f| line.starts_with(f)) {
        return Frame::Skip;
    }
    if line == "[DONE]" {
        return Frame::Done;
    }
    let payload = line
        .trim_start_matches(['[', ','])
        .trim_end_matches([']', ','])
        .trim();
    if payload.is_empty() {
        Frame::Skip
    } else {
        Frame::Data(payload)
    }
}

/// What an adapter extracted from one payload.
#[derive(Debug, Default, PartialEq)]
pub struct ChunkUpdate {
    pub delta: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
}

/// Adapter hook decoding one JSON payload.
pub type ChunkDecoder = fn(&str) -> Result<ChunkUpdate, serde_json::Error>;

// ─────────────────────────────────────────────
// DeltaStream
// ─────────────────────────────────────────────

/// Consumer side of a streamed generation.
///
/// Yields `Delta`s then exactly one terminal `Done` or `Error`. Dropping it
/// stops the producer, which drops the underlying HTTP response.
#[derive(Debug)]
pub struct DeltaStream {
    rx: mpsc::Receiver<StreamEvent>,
    closed: CancellationToken,
}

/// Producer side of a [`DeltaStream`].
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: mpsc::Sender<StreamEvent>,
    closed: CancellationToken,
}

impl DeltaStream {
    /// A connected sink/stream pair.
    pub fn channel() -> (StreamSink, DeltaStream) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let closed = CancellationToken::new();
        (
            StreamSink {
                tx,
                closed: closed.clone(),
            },
            DeltaStream { rx, closed },
        )
    }

    /// Next event, or `None` once the terminal event has been taken.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Drain the stream and join every delta.
    pub async fn collect_text(mut self) -> Result<String, ProviderError> {
        let mut text = String::new();
        while let Some(event) = self.rx.recv().await {
            match event {
                StreamEvent::Delta(delta) => text.push_str(&delta),
                StreamEvent::Done { .. } => return Ok(text),
                StreamEvent::Error(message) => return Err(ProviderError::Stream(message)),
            }
        }
        Err(ProviderError::Stream("stream closed without a terminal event".into()))
    }
}

impl Stream for DeltaStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for DeltaStream {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl StreamSink {
    /// Forward an event. Returns `false` once the consumer is gone.
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Resolves when the consumer drops its [`DeltaStream`].
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

// ─────────────────────────────────────────────
// Reader task
// ─────────────────────────────────────────────

/// Spawn a task reading `response` incrementally and return its stream.
pub(crate) fn spawn_reader(
    provider: &'static str,
    response: reqwest::Response,
    decode: ChunkDecoder,
    cancel: CancellationToken,
    idle_timeout: Duration,
) -> DeltaStream {
    let (sink, stream) = DeltaStream::channel();
    let body = response.bytes_stream();
    tokio::spawn(pump(provider, body, decode, cancel, idle_timeout, sink));
    stream
}

/// Accumulated terminal metadata.
#[derive(Default)]
struct Tail {
    finish_reason: Option<String>,
    usage: Option<UsageInfo>,
}

enum Flow {
    Continue,
    Finished,
    ConsumerGone,
}

async fn pump<S, B, E>(
    provider: &'static str,
    body: S,
    decode: ChunkDecoder,
    cancel: CancellationToken,
    idle_timeout: Duration,
    sink: StreamSink,
) where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    futures_util::pin_mut!(body);
    let mut lines = LineDecoder::default();
    let mut tail = Tail::default();
    let mut deltas = 0usize;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(provider, deltas, "Stream cancelled");
                sink.send(StreamEvent::Error(ProviderError::Cancelled.to_string())).await;
                return;
            }
            _ = sink.closed() => {
                debug!(provider, deltas, "Stream consumer dropped");
                return;
            }
            next = tokio::time::timeout(idle_timeout, body.next()) => next,
        };

        let chunk = match next {
            Err(_) => {
                warn!(provider, idle_secs = idle_timeout.as_secs(), "Stream idle timeout");
                let err = ProviderError::Timeout(format!(
                    "no data received for {}s",
                    idle_timeout.as_secs()
                ));
                sink.send(StreamEvent::Error(err.to_string())).await;
                return;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!(provider, error = %e, "Stream read failed");
                sink.send(StreamEvent::Error(e.to_string())).await;
                return;
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        for line in lines.push(chunk.as_ref()) {
            if cancel.is_cancelled() {
                debug!(provider, deltas, "Stream cancelled");
                sink.send(StreamEvent::Error(ProviderError::Cancelled.to_string())).await;
                return;
            }
            match handle_line(provider, &line, decode, &sink, &mut tail, &mut deltas).await {
                Flow::Continue => {}
                Flow::Finished => return finish(provider, &sink, tail, deltas).await,
                Flow::ConsumerGone => return,
            }
        }
    }

    if let Some(line) = lines.finish() {
        match handle_line(provider, &line, decode, &sink, &mut tail, &mut deltas).await {
            Flow::ConsumerGone => return,
            Flow::Continue | Flow::Finished => {}
        }
    }
    finish(provider, &sink, tail, deltas).await;
}

async fn handle_line(
    provider: &'static str,
    line: &str,
    decode: ChunkDecoder,
    sink: &StreamSink,
    tail: &mut Tail,
    deltas: &mut usize,
) -> Flow {
    let payload = match classify_line(line) {
        Frame::Skip => return Flow::Continue,
        Frame::Done => return Flow::Finished,
        Frame::Data(payload) => payload,
    };

    let update = match decode(payload) {
        Ok(update) => update,
        Err(e) => {
            warn!(provider, error = %e, "Skipping malformed stream frame");
            return Flow::Continue;
        }
    };

    if update.finish_reason.is_some() {
        tail.finish_reason = update.finish_reason;
    }
    if update.usage.is_some() {
        tail.usage = update.usage;
    }
    match update.delta {
        Some(delta) if !delta.is_empty() => {
            *deltas += 1;
            if sink.send(StreamEvent::Delta(delta)).await {
                Flow::Continue
            } else {
                Flow::ConsumerGone
            }
        }
        _ => Flow::Continue,
    }
}

async fn finish(provider: &'static str, sink: &StreamSink, tail: Tail, deltas: usize) {
    debug!(
        provider,
        deltas,
        finish_reason = tail.finish_reason.as_deref().unwrap_or("?"),
        "Stream complete"
    );
    sink.send(StreamEvent::Done {
        finish_reason: tail.finish_reason,
        usage: tail.usage,
    })
    .await;
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn text_decoder(payload: &str) -> Result<ChunkUpdate, serde_json::Error> {
        let v: serde_json::Value = serde_json::from_str(payload)?;
        Ok(ChunkUpdate {
            delta: v.get("t").and_then(|t| t.as_str()).map(String::from),
            finish_reason: v.get("f").and_then(|f| f.as_str()).map(String::from),
            usage: None,
        })
    }

    fn run(chunks: Vec<&'static [u8]>) -> DeltaStream {
        let (sink, stream) = DeltaStream::channel();
        let body = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        tokio::spawn(pump(
            "test",
            body,
            text_decoder,
            CancellationToken::new(),
            Duration::from_secs(5),
            sink,
        ));
        stream
    }

    #[test]
    fn test_line_decoder_split_across_chunks() {
        let mut dec = LineDecoder::default();
        assert!(dec.push(b"data: {\"t\":").is_empty());
        assert_eq!(dec.push(b"\"hi\"}\r\ndata: [DO"), vec!["data: {\"t\":\"hi\"}"]);
        assert_eq!(dec.push(b"NE]\n"), vec!["data: [DONE]"]);
        assert!(dec.finish().is_none());
    }

    #[test]
    fn test_line_decoder_utf8_boundary() {
        let text = "data: {\"t\":\"héllo\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut dec = LineDecoder::default();
        assert!(dec.push(&text[..split]).is_empty());
        assert_eq!(dec.push(&text[split..]), vec!["data: {\"t\":\"héllo\"}"]);
    }

    #[test]
    fn test_line_decoder_finish_returns_remainder() {
        let mut dec = LineDecoder::default();
        dec.push(b"{\"t\":\"tail\"}");
        assert_eq!(dec.finish().as_deref(), Some("{\"t\":\"tail\"}"));
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("data: {\"a\":1}"), Frame::Data("{\"a\":1}"));
        assert_eq!(classify_line("data:{\"a\":1}"), Frame::Data("{\"a\":1}"));
        assert_eq!(classify_line("data: [DONE]"), Frame::Done);
        assert_eq!(classify_line(""), Frame::Skip);
        assert_eq!(classify_line(": keep-alive"), Frame::Skip);
        assert_eq!(classify_line("event: message"), Frame::Skip);
        assert_eq!(classify_line("{\"a\":1}"), Frame::Data("{\"a\":1}"));
        assert_eq!(classify_line("[{\"a\":1},"), Frame::Data("{\"a\":1}"));
        assert_eq!(classify_line("]"), Frame::Skip);
    }

    #[tokio::test]
    async fn test_pump_emits_deltas_then_done() {
        let mut stream = run(vec![
            b"data: {\"t\":\"I\"}\n\ndata: {\"t\":\" under",
            b"stand\"}\n\ndata: {\"t\":\" you\",\"f\":\"stop\"}\n\n",
            b"data: [DONE]\n\n",
        ]);

        let mut seen = String::new();
        let mut prefixes = Vec::new();
        loop {
            match stream.next_event().await.unwrap() {
                StreamEvent::Delta(d) => {
                    seen.push_str(&d);
                    prefixes.push(seen.clone());
                }
                StreamEvent::Done { finish_reason, .. } => {
                    assert_eq!(finish_reason.as_deref(), Some("stop"));
                    break;
                }
                StreamEvent::Error(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(prefixes, vec!["I", "I understand", "I understand you"]);
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_pump_skips_malformed_frames() {
        let stream = run(vec![b"data: {\"t\":\"a\"}\ndata: {not json}\ndata: {\"t\":\"b\"}\n"]);
        assert_eq!(stream.collect_text().await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_pump_ndjson_without_sentinel() {
        let stream = run(vec![b"{\"t\":\"x\"}\n{\"t\":\"y\"}"]);
        assert_eq!(stream.collect_text().await.unwrap(), "xy");
    }

    #[tokio::test]
    async fn test_pump_read_error_is_terminal() {
        let (sink, stream) = DeltaStream::channel();
        let body = stream::iter(vec![
            Ok(b"data: {\"t\":\"a\"}\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ]);
        tokio::spawn(pump(
            "test",
            body,
            text_decoder,
            CancellationToken::new(),
            Duration::from_secs(5),
            sink,
        ));
        let err = stream.collect_text().await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_pump_idle_timeout() {
        let (sink, stream) = DeltaStream::channel();
        let body = stream::pending::<Result<Vec<u8>, std::io::Error>>();
        tokio::spawn(pump(
            "test",
            body,
            text_decoder,
            CancellationToken::new(),
            Duration::from_millis(20),
            sink,
        ));
        let err = stream.collect_text().await.unwrap_err();
        assert!(err.to_string().contains("no data received"));
    }

    #[tokio::test]
    async fn test_pump_cancel() {
        let (sink, mut stream) = DeltaStream::channel();
        let cancel = CancellationToken::new();
        let body = stream::pending::<Result<Vec<u8>, std::io::Error>>();
        tokio::spawn(pump(
            "test",
            body,
            text_decoder,
            cancel.clone(),
            Duration::from_secs(5),
            sink,
        ));
        cancel.cancel();
        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::Error("generation cancelled".into()))
        );
    }

    #[tokio::test]
    async fn test_dropping_stream_marks_sink_closed() {
        let (sink, stream) = DeltaStream::channel();
        drop(stream);
        tokio::time::timeout(Duration::from_secs(1), sink.closed())
            .await
            .unwrap();
        assert!(sink.is_closed());
        assert!(!sink.send(StreamEvent::Delta("x".into())).await);
    }
}
