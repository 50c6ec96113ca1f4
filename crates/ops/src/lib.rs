//! Argonav ops: the one long-lived, cancellable operation, pod log streaming.
//!
//! A stream runs on its own task, owns the backend byte stream, and forwards
//! lines through a bounded channel. Dropping or cancelling the [`CancelHandle`]
//! stops the task at its next await point, which drops the byte stream.

#![forbid(unsafe_code)]

use std::fmt::Display;
use std::sync::Arc;

use argonav_api::ArgoApi;
use futures::StreamExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default bounded-channel capacity for a log subscription.
pub const DEFAULT_LOG_CHANNEL_CAP: usize = 1024;

/// A single unit of log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogChunk {
    Line(String),
    /// The stream could not be opened or broke mid-read. Always the last chunk.
    Failed(String),
}

/// Which container to stream from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    pub app: String,
    pub pod: String,
    pub container: Option<String>,
    pub follow: bool,
}

/// Cancellation handle for an in-flight stream. Cancels on drop.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        (Self { token: token.clone() }, token)
    }

    pub fn cancel(self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Result of starting a streaming operation.
pub struct StreamHandle<T> {
    pub rx: mpsc::Receiver<T>,
    pub cancel: CancelHandle,
    pub task: JoinHandle<()>,
}

/// Start streaming pod logs. The task ends on end-of-stream, error, or cancellation.
pub fn open_log_stream(api: Arc<dyn ArgoApi>, req: LogRequest, cap: usize) -> StreamHandle<LogChunk> {
    let (tx, rx) = mpsc::channel::<LogChunk>(cap.max(1));
    let (cancel, token) = CancelHandle::new();
    let task = tokio::spawn(async move {
        info!(app = %req.app, pod = %req.pod, container = ?req.container, follow = req.follow, "logs stream starting");
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => { info!(pod = %req.pod, "logs stream cancelled before open"); return; }
            r = api.pod_logs(&req.app, &req.pod, req.container.as_deref(), req.follow) => r,
        };
        match opened {
            Ok(stream) => pump_bytes_to_lines(stream, tx, token, Some(&req.pod)).await,
            Err(e) => {
                warn!(pod = %req.pod, error = %e, "log stream failed to open");
                send_or_cancel(&tx, &token, LogChunk::Failed(e.to_string())).await;
            }
        }
    });
    StreamHandle { rx, cancel, task }
}

/// Back-pressure send; gives up if cancelled or the receiver is gone.
async fn send_or_cancel(tx: &mpsc::Sender<LogChunk>, token: &CancellationToken, chunk: LogChunk) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        r = tx.send(chunk) => r.is_ok(),
    }
}

/// Argo wraps each line as `{"result":{"content":"..."}}`; plain text passes through.
pub fn decode_log_line(raw: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        result: Option<Entry>,
    }
    #[derive(Deserialize)]
    struct Entry {
        #[serde(default)]
        content: String,
    }
    let raw = raw.strip_suffix('\r').unwrap_or(raw);
    if raw.starts_with('{') {
        if let Ok(Envelope { result: Some(entry) }) = serde_json::from_str::<Envelope>(raw) {
            return entry.content;
        }
    }
    raw.to_string()
}

/// Consume a stream of bytes, split into lines, send via bounded channel.
/// Lines may span chunks; a trailing partial line is flushed at end of stream.
/// The stream is owned here and dropped on return.
async fn pump_bytes_to_lines<S, E>(stream: S, tx: mpsc::Sender<LogChunk>, cancel: CancellationToken, ctx: Option<&str>)
where
    S: futures::Stream<Item = Result<bytes::Bytes, E>>,
    E: Display,
{
    let stream = stream.fuse();
    futures::pin_mut!(stream);
    let mut buf = bytes::BytesMut::new();
    let ctx = ctx.unwrap_or("-");
    let mut sent: u64 = 0;
    'read: loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => { info!(ctx = %ctx, "log pump cancelled"); break 'read; }
            next = stream.next() => {
                match next {
                    Some(Ok(chunk)) => {
                        buf.extend_from_slice(&chunk);
                        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                            let line = buf.split_to(pos);
                            let _ = buf.split_to(1); // drop '\n'
                            let text = decode_log_line(&String::from_utf8_lossy(&line));
                            if !send_or_cancel(&tx, &cancel, LogChunk::Line(text)).await {
                                break 'read;
                            }
                            sent += 1;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(ctx = %ctx, error = %e, "log stream error");
                        send_or_cancel(&tx, &cancel, LogChunk::Failed(e.to_string())).await;
                        break 'read;
                    }
                    None => {
                        if !buf.is_empty() {
                            let text = decode_log_line(&String::from_utf8_lossy(&buf));
                            buf.clear();
                            if send_or_cancel(&tx, &cancel, LogChunk::Line(text)).await {
                                sent += 1;
                            }
                        }
                        break 'read;
                    }
                }
            }
        }
    }
    counter!("argonav_log_lines_total", sent);
    info!(ctx = %ctx, lines = sent, "log pump ended");
}
