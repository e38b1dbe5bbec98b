//! Streaming speech upload.
//!
//! During speech capture the engine's upload-sink stage hands encoded audio
//! buffers to a [`ChunkSink`] from its worker thread. [`SpeechUploader`]
//! implements that sink on top of an [`UploadTransport`]: the session opens
//! lazily on the first chunk, each buffer is written as one transport chunk,
//! and end-of-capture finishes the session and reports the outcome as a
//! [`Event::TransportCompleted`] on the orchestrator queue.
//!
//! [`HttpUploadTransport`] is the production transport: an HTTP POST with
//! chunked transfer encoding whose body is fed from a channel, so capture
//! streams to the server in real time instead of buffering the recording.

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::UploadConfig;
use crate::events::{Event, EventSender};

/// Sentinel returned by [`ChunkSink::on_chunk`] when the write failed and the
/// engine should stop feeding the sink.
pub const WRITE_FAILED: isize = -1;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors surfaced by an upload transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session could not be established.
    #[error("upload connect failed: {0}")]
    Connect(String),

    /// A chunk write failed mid-session.
    #[error("upload write failed: {0}")]
    Write(String),

    /// The server response could not be read, or was empty.
    #[error("upload response read failed: {0}")]
    Read(String),

    /// The session ended before `finish` could complete.
    #[error("upload session closed prematurely")]
    Closed,
}

// ---------------------------------------------------------------------------
// UploadSession / UploadTransport
// ---------------------------------------------------------------------------

/// One open upload session. Chunks in, one response body out.
pub trait UploadSession: Send {
    /// Write one chunk. Returns the number of bytes accepted.
    fn write_chunk(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Close the request side and return the server's response body.
    fn finish(self: Box<Self>) -> Result<String, TransportError>;
}

/// Factory for upload sessions.
pub trait UploadTransport: Send + Sync {
    /// Open a session announcing `headers` before any chunk is sent.
    fn open(&self, headers: &[(String, String)]) -> Result<Box<dyn UploadSession>, TransportError>;
}

// ---------------------------------------------------------------------------
// ChunkSink
// ---------------------------------------------------------------------------

/// Callback interface the engine's upload-sink stage drives.
///
/// Both methods are invoked from the engine's worker thread and may block on
/// network I/O; the stage's ring buffer absorbs the jitter.
pub trait ChunkSink: Send + Sync {
    /// One encoded buffer leaving the capture pipeline. Returns the number of
    /// bytes written, or [`WRITE_FAILED`].
    fn on_chunk(&self, data: &[u8]) -> isize;

    /// Capture ended; no further chunks will arrive.
    fn on_end(&self);
}

// ---------------------------------------------------------------------------
// SpeechUploader
// ---------------------------------------------------------------------------

enum SessionState {
    /// No session open; the next chunk opens one.
    Idle,
    Open(Box<dyn UploadSession>),
    /// The session failed and its outcome has already been reported; chunks
    /// are swallowed until `on_end` rearms.
    Failed,
}

/// [`ChunkSink`] that streams capture buffers to the speech endpoint.
///
/// Reusable across captures: `on_end` always returns the uploader to the
/// idle state, and every session outcome is reported exactly once through
/// [`Event::TransportCompleted`].
pub struct SpeechUploader {
    transport: Arc<dyn UploadTransport>,
    /// Fixed PCM format announcement, sent as headers on every session.
    headers: Vec<(String, String)>,
    events: EventSender,
    state: Mutex<SessionState>,
}

impl SpeechUploader {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        config: &UploadConfig,
        events: EventSender,
    ) -> Self {
        let headers = vec![
            (
                "x-audio-sample-rates".to_string(),
                config.sample_rate.to_string(),
            ),
            ("x-audio-bits".to_string(), config.bit_depth.to_string()),
            ("x-audio-channel".to_string(), config.channels.to_string()),
        ];
        Self {
            transport,
            headers,
            events,
            state: Mutex::new(SessionState::Idle),
        }
    }

    fn report(&self, ok: bool) {
        self.events.send(Event::TransportCompleted { ok });
    }
}

impl ChunkSink for SpeechUploader {
    fn on_chunk(&self, data: &[u8]) -> isize {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if matches!(*state, SessionState::Failed) {
            return WRITE_FAILED;
        }

        if matches!(*state, SessionState::Idle) {
            match self.transport.open(&self.headers) {
                Ok(session) => {
                    log::info!("upload: session opened ({} bytes first chunk)", data.len());
                    *state = SessionState::Open(session);
                }
                Err(e) => {
                    log::warn!("upload: open failed: {e}");
                    *state = SessionState::Failed;
                    self.report(false);
                    return WRITE_FAILED;
                }
            }
        }

        let SessionState::Open(session) = &mut *state else {
            return WRITE_FAILED;
        };
        match session.write_chunk(data) {
            Ok(n) => n as isize,
            Err(e) => {
                log::warn!("upload: write failed: {e}");
                *state = SessionState::Failed;
                self.report(false);
                WRITE_FAILED
            }
        }
    }

    fn on_end(&self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match std::mem::replace(&mut *state, SessionState::Idle) {
            SessionState::Open(session) => match session.finish() {
                Ok(body) => {
                    log::info!("upload: server response: {body}");
                    self.report(true);
                }
                Err(e) => {
                    log::warn!("upload: finish failed: {e}");
                    self.report(false);
                }
            },
            SessionState::Failed => {
                // Outcome already reported when the write failed.
                log::debug!("upload: capture ended after session failure");
            }
            SessionState::Idle => {
                log::warn!("upload: capture ended with no data");
                self.report(false);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HttpUploadTransport
// ---------------------------------------------------------------------------

/// Chunked HTTP POST transport.
///
/// `open` spawns the request on the runtime with a channel-fed streaming
/// body; `write_chunk` pushes one body chunk from the engine's worker thread;
/// `finish` closes the body and blocks for the response.
pub struct HttpUploadTransport {
    client: reqwest::Client,
    url: String,
    response_cap: usize,
    runtime: Handle,
}

impl HttpUploadTransport {
    pub fn new(config: &UploadConfig, runtime: Handle) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            response_cap: config.response_cap_bytes,
            runtime,
        })
    }
}

impl UploadTransport for HttpUploadTransport {
    fn open(&self, headers: &[(String, String)]) -> Result<Box<dyn UploadSession>, TransportError> {
        let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(8);
        let body = reqwest::Body::wrap_stream(ReceiverStream::new(rx));

        let mut request = self.client.post(&self.url).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let cap = self.response_cap;
        let join = self.runtime.spawn(async move {
            let mut response = request
                .send()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            if !response.status().is_success() {
                return Err(TransportError::Read(format!(
                    "server returned {}",
                    response.status()
                )));
            }

            let mut body = Vec::new();
            while body.len() < cap {
                match response
                    .chunk()
                    .await
                    .map_err(|e| TransportError::Read(e.to_string()))?
                {
                    Some(chunk) => {
                        let room = cap - body.len();
                        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    }
                    None => break,
                }
            }
            if body.is_empty() {
                return Err(TransportError::Read("empty response body".into()));
            }
            Ok(String::from_utf8_lossy(&body).into_owned())
        });

        Ok(Box::new(HttpUploadSession {
            tx: Some(tx),
            join: Some(join),
            runtime: self.runtime.clone(),
        }))
    }
}

struct HttpUploadSession {
    tx: Option<mpsc::Sender<Result<Bytes, io::Error>>>,
    join: Option<JoinHandle<Result<String, TransportError>>>,
    runtime: Handle,
}

impl UploadSession for HttpUploadSession {
    fn write_chunk(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.blocking_send(Ok(Bytes::copy_from_slice(data)))
            .map_err(|_| TransportError::Write("request body closed".into()))?;
        Ok(data.len())
    }

    fn finish(mut self: Box<Self>) -> Result<String, TransportError> {
        // Dropping the sender terminates the chunked body.
        drop(self.tx.take());
        let join = self.join.take().ok_or(TransportError::Closed)?;
        self.runtime
            .block_on(join)
            .map_err(|_| TransportError::Closed)?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDispatcher;

    #[derive(Default)]
    struct MockTransportState {
        opened_headers: Vec<Vec<(String, String)>>,
        written: Vec<u8>,
        finished: usize,
        fail_open: bool,
        fail_write_after: Option<usize>,
    }

    #[derive(Default)]
    struct MockTransport {
        state: Arc<Mutex<MockTransportState>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    impl UploadTransport for MockTransport {
        fn open(
            &self,
            headers: &[(String, String)],
        ) -> Result<Box<dyn UploadSession>, TransportError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_open {
                return Err(TransportError::Connect("scripted".into()));
            }
            state.opened_headers.push(headers.to_vec());
            Ok(Box::new(MockSession {
                state: Arc::clone(&self.state),
                writes: 0,
            }))
        }
    }

    struct MockSession {
        state: Arc<Mutex<MockTransportState>>,
        writes: usize,
    }

    impl UploadSession for MockSession {
        fn write_chunk(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            let mut state = self.state.lock().unwrap();
            if let Some(limit) = state.fail_write_after {
                if self.writes >= limit {
                    return Err(TransportError::Write("scripted".into()));
                }
            }
            self.writes += 1;
            state.written.extend_from_slice(data);
            Ok(data.len())
        }

        fn finish(self: Box<Self>) -> Result<String, TransportError> {
            let mut state = self.state.lock().unwrap();
            state.finished += 1;
            Ok("ok".into())
        }
    }

    fn make_uploader(
        transport: Arc<MockTransport>,
    ) -> (SpeechUploader, EventDispatcher) {
        let (tx, rx) = EventDispatcher::channel();
        let uploader = SpeechUploader::new(
            transport as Arc<dyn UploadTransport>,
            &UploadConfig::default(),
            tx,
        );
        (uploader, rx)
    }

    #[tokio::test]
    async fn session_opens_lazily_with_format_headers() {
        let transport = MockTransport::new();
        let (uploader, _rx) = make_uploader(Arc::clone(&transport));

        assert_eq!(
            transport.state.lock().unwrap().opened_headers.len(),
            0,
            "no session before the first chunk"
        );
        assert_eq!(uploader.on_chunk(&[1, 2, 3]), 3);

        let state = transport.state.lock().unwrap();
        assert_eq!(state.opened_headers.len(), 1);
        let headers = &state.opened_headers[0];
        assert!(headers.contains(&("x-audio-sample-rates".into(), "16000".into())));
        assert!(headers.contains(&("x-audio-bits".into(), "16".into())));
        assert!(headers.contains(&("x-audio-channel".into(), "1".into())));
    }

    #[tokio::test]
    async fn chunks_stream_through_and_finish_reports_success() {
        let transport = MockTransport::new();
        let (uploader, mut rx) = make_uploader(Arc::clone(&transport));

        assert_eq!(uploader.on_chunk(&[1, 2]), 2);
        assert_eq!(uploader.on_chunk(&[3, 4, 5]), 3);
        uploader.on_end();

        let state = transport.state.lock().unwrap();
        assert_eq!(state.written, vec![1, 2, 3, 4, 5]);
        assert_eq!(state.finished, 1);
        drop(state);

        assert_eq!(rx.next().await, Some(Event::TransportCompleted { ok: true }));
    }

    #[tokio::test]
    async fn open_failure_reports_once_and_swallows_the_capture() {
        let transport = MockTransport::new();
        transport.state.lock().unwrap().fail_open = true;
        let (uploader, mut rx) = make_uploader(Arc::clone(&transport));

        assert_eq!(uploader.on_chunk(&[1]), WRITE_FAILED);
        assert_eq!(uploader.on_chunk(&[2]), WRITE_FAILED);
        uploader.on_end();

        assert_eq!(
            rx.next().await,
            Some(Event::TransportCompleted { ok: false })
        );
        // Exactly one report despite two chunks and the end-of-capture.
        assert_eq!(
            rx.poll(std::time::Duration::from_millis(5)).await,
            None,
            "failure must be reported exactly once"
        );
    }

    #[tokio::test]
    async fn write_failure_reports_once() {
        let transport = MockTransport::new();
        transport.state.lock().unwrap().fail_write_after = Some(1);
        let (uploader, mut rx) = make_uploader(Arc::clone(&transport));

        assert_eq!(uploader.on_chunk(&[1, 1]), 2);
        assert_eq!(uploader.on_chunk(&[2, 2]), WRITE_FAILED);
        uploader.on_end();

        assert_eq!(
            rx.next().await,
            Some(Event::TransportCompleted { ok: false })
        );
        assert_eq!(rx.poll(std::time::Duration::from_millis(5)).await, None);
    }

    #[tokio::test]
    async fn empty_capture_still_reports_an_outcome() {
        let transport = MockTransport::new();
        let (uploader, mut rx) = make_uploader(transport);

        uploader.on_end();
        assert_eq!(
            rx.next().await,
            Some(Event::TransportCompleted { ok: false })
        );
    }

    #[tokio::test]
    async fn uploader_is_reusable_across_captures() {
        let transport = MockTransport::new();
        let (uploader, mut rx) = make_uploader(Arc::clone(&transport));

        uploader.on_chunk(&[1]);
        uploader.on_end();
        uploader.on_chunk(&[2]);
        uploader.on_end();

        let state = transport.state.lock().unwrap();
        assert_eq!(state.opened_headers.len(), 2, "each capture opens a session");
        assert_eq!(state.finished, 2);
        drop(state);

        assert_eq!(rx.next().await, Some(Event::TransportCompleted { ok: true }));
        assert_eq!(rx.next().await, Some(Event::TransportCompleted { ok: true }));
    }
}
