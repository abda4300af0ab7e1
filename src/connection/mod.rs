//! Connection lifecycle engine.
//!
//! A [`Connection`] drives the pure [`Lifecycle`] state machine over any
//! byte stream. Reads and writes run as tokio tasks that own the relevant
//! stream half while in flight; each posts a [`ConnectionEvent`] on the
//! owner's channel when done. The owner feeds the event back through
//! [`Connection::complete`] on its own (single) event loop and acts on the
//! returned [`ConnectionOutput`].
//!
//! ```text
//! owner loop ──read()/write()──► Connection ──spawn──► I/O task
//!     ▲                                                  │
//!     └──────── mpsc<ConnectionEvent> ◄──────────────────┘
//! ```
//!
//! `close()` never calls back into the owner: when nothing is pending the
//! disconnect is queued on the same channel, so the notification always
//! arrives through `complete`, exactly once.

mod lifecycle;
mod reader;
mod writer;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::arena::SessionKey;
use crate::error::Error;
use crate::protocol::MAX_PAYLOAD_SIZE;
use crate::transport::{split_stream, BoxWriter};

pub use lifecycle::{CloseStep, ConnectionState, Lifecycle, Rejected, Step};
pub use reader::FrameReader;
pub use writer::{write_frame, OutboundFrame};

/// Default size of the per-connection socket read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Largest payload accepted or sent (at most 65535).
    pub max_payload_size: usize,
    /// Socket read buffer size.
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Sender half of an owner's completion channel.
pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;

/// Receiver half of an owner's completion channel.
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Create a completion channel for an owner loop.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Completion notice routed back to the owning loop.
pub struct ConnectionEvent {
    key: SessionKey,
    kind: Completion,
}

impl ConnectionEvent {
    /// Session the event belongs to.
    pub fn key(&self) -> SessionKey {
        self.key
    }
}

impl std::fmt::Debug for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            Completion::Read { .. } => "read",
            Completion::Write { .. } => "write",
            Completion::Closed => "closed",
        };
        f.debug_struct("ConnectionEvent")
            .field("key", &self.key)
            .field("kind", &kind)
            .finish()
    }
}

enum Completion {
    Read { reader: FrameReader, result: ReadResult },
    Write { writer: BoxWriter, result: WriteResult },
    Closed,
}

enum ReadResult {
    Frame(Bytes),
    EndOfStream,
    Cancelled,
    Failed(Error),
}

enum WriteResult {
    Done,
    Cancelled,
    Failed(Error),
}

/// Why a connection ended.
#[derive(Debug)]
pub enum DisconnectReason {
    /// `close()` was called locally.
    Local,
    /// The peer ended the stream.
    EndOfStream,
    /// A terminal error ended the connection.
    Error(Error),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Local => write!(f, "closed locally"),
            DisconnectReason::EndOfStream => write!(f, "closed by peer"),
            DisconnectReason::Error(e) => write!(f, "{}", e),
        }
    }
}

/// What the owner must act on after feeding a completion back.
#[derive(Debug)]
pub enum ConnectionOutput {
    /// Nothing for the owner (the connection is winding down).
    Nothing,
    /// A complete frame payload arrived.
    Message(Bytes),
    /// The pending write finished.
    Written,
    /// A transport error; the owner decides whether to close.
    Failed(Error),
    /// Terminal notification, issued exactly once. Drop the connection.
    Disconnected(DisconnectReason),
}

/// One framed, lifecycle-managed connection.
pub struct Connection {
    key: SessionKey,
    peer: String,
    lifecycle: Lifecycle,
    reader: Option<FrameReader>,
    writer: Option<BoxWriter>,
    shutdown: CancellationToken,
    events: EventSender,
    max_payload_size: usize,
    reason: Option<DisconnectReason>,
}

impl Connection {
    /// Take ownership of `stream`. Completions are posted to `events`
    /// tagged with `key`.
    pub fn new<S>(
        key: SessionKey,
        peer: impl Into<String>,
        stream: S,
        config: &ConnectionConfig,
        events: EventSender,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let max_payload_size = config.max_payload_size.min(MAX_PAYLOAD_SIZE);
        let (reader, writer) = split_stream(stream);
        Self {
            key,
            peer: peer.into(),
            lifecycle: Lifecycle::new(),
            reader: Some(FrameReader::new(
                reader,
                max_payload_size,
                config.read_buffer_size,
            )),
            writer: Some(writer),
            shutdown: CancellationToken::new(),
            events,
            max_payload_size,
            reason: None,
        }
    }

    /// Session key this connection reports under.
    #[inline]
    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Peer label used in logs.
    #[inline]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Whether a read is in flight.
    #[inline]
    pub fn is_read_pending(&self) -> bool {
        self.lifecycle.is_read_pending()
    }

    /// Whether a write is in flight.
    #[inline]
    pub fn is_write_pending(&self) -> bool {
        self.lifecycle.is_write_pending()
    }

    /// Whether close has begun.
    #[inline]
    pub fn is_closing(&self) -> bool {
        self.lifecycle.is_closing()
    }

    /// Start reading the next frame.
    ///
    /// Rejected (and logged) if a read is pending or the connection is closing.
    pub fn read(&mut self) -> Result<(), Rejected> {
        if let Err(rejected) = self.lifecycle.begin_read() {
            tracing::warn!(peer = %self.peer, "read rejected: {}", rejected);
            return Err(rejected);
        }
        let Some(mut reader) = self.reader.take() else {
            // Halves are only released on close, which begin_read refuses.
            self.lifecycle.finish_read(true);
            return Err(Rejected::Closing);
        };

        let key = self.key;
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown.cancelled() => ReadResult::Cancelled,
                frame = reader.next_frame() => match frame {
                    Ok(Some(payload)) => ReadResult::Frame(payload),
                    Ok(None) => ReadResult::EndOfStream,
                    Err(e) => ReadResult::Failed(e),
                },
            };
            let _ = events.send(ConnectionEvent {
                key,
                kind: Completion::Read { reader, result },
            });
        });
        Ok(())
    }

    /// Start writing `payload` as one frame.
    ///
    /// Rejected (and logged) if a write is pending, the connection is
    /// closing, or the payload is empty or too large.
    pub fn write(&mut self, payload: Bytes) -> Result<(), Rejected> {
        let len = payload.len();
        let checked = if len == 0 {
            Err(Rejected::EmptyPayload)
        } else if len > self.max_payload_size {
            Err(Rejected::Oversized(len))
        } else {
            OutboundFrame::new(payload).map_err(|_| Rejected::Oversized(len))
        };
        let frame = match checked.and_then(|frame| {
            self.lifecycle.begin_write()?;
            Ok(frame)
        }) {
            Ok(frame) => frame,
            Err(rejected) => {
                tracing::warn!(peer = %self.peer, "write rejected: {}", rejected);
                return Err(rejected);
            }
        };
        let Some(mut writer) = self.writer.take() else {
            self.lifecycle.finish_write(true);
            return Err(Rejected::Closing);
        };

        let key = self.key;
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown.cancelled() => WriteResult::Cancelled,
                written = write_frame(&mut writer, &frame) => match written {
                    Ok(()) => WriteResult::Done,
                    Err(e) => WriteResult::Failed(e),
                },
            };
            let _ = events.send(ConnectionEvent {
                key,
                kind: Completion::Write { writer, result },
            });
        });
        Ok(())
    }

    /// Close the connection. Idempotent.
    ///
    /// The disconnect notification arrives through [`Connection::complete`],
    /// immediately queued if nothing is pending, otherwise after the last
    /// in-flight operation finishes.
    pub fn close(&mut self) {
        let step = self.lifecycle.close();
        if step == CloseStep::Ignored {
            return;
        }
        tracing::debug!(peer = %self.peer, ?step, "closing connection");
        self.reason.get_or_insert(DisconnectReason::Local);
        self.release_transport();
        if step == CloseStep::Disconnect {
            let _ = self.events.send(ConnectionEvent {
                key: self.key,
                kind: Completion::Closed,
            });
        }
    }

    /// Feed a completion event back. `event.key()` must be this connection's key.
    pub fn complete(&mut self, event: ConnectionEvent) -> ConnectionOutput {
        debug_assert_eq!(event.key, self.key);
        match event.kind {
            Completion::Closed => ConnectionOutput::Disconnected(self.take_reason()),
            Completion::Read { reader, result } => self.complete_read(reader, result),
            Completion::Write { writer, result } => self.complete_write(writer, result),
        }
    }

    fn complete_read(&mut self, reader: FrameReader, result: ReadResult) -> ConnectionOutput {
        let (terminal, output) = match result {
            ReadResult::Frame(payload) => (false, ConnectionOutput::Message(payload)),
            ReadResult::Cancelled => (true, ConnectionOutput::Nothing),
            ReadResult::EndOfStream => {
                self.reason.get_or_insert(DisconnectReason::EndOfStream);
                (true, ConnectionOutput::Nothing)
            }
            ReadResult::Failed(e) if e.is_connection_fatal() => {
                tracing::error!(peer = %self.peer, "terminating connection: {}", e);
                self.reason.get_or_insert(DisconnectReason::Error(e));
                (true, ConnectionOutput::Nothing)
            }
            ReadResult::Failed(e) if is_peer_gone(&e) => {
                self.reason.get_or_insert(DisconnectReason::EndOfStream);
                (true, ConnectionOutput::Nothing)
            }
            ReadResult::Failed(e) => (false, ConnectionOutput::Failed(e)),
        };

        if terminal || self.lifecycle.is_closing() {
            drop(reader);
            self.release_transport();
        } else {
            self.reader = Some(reader);
        }
        let step = self.lifecycle.finish_read(terminal);
        self.after(step, output)
    }

    fn complete_write(&mut self, writer: BoxWriter, result: WriteResult) -> ConnectionOutput {
        let (terminal, output) = match result {
            WriteResult::Done => (false, ConnectionOutput::Written),
            WriteResult::Cancelled => (true, ConnectionOutput::Nothing),
            WriteResult::Failed(e) if is_peer_gone(&e) => {
                self.reason.get_or_insert(DisconnectReason::EndOfStream);
                (true, ConnectionOutput::Nothing)
            }
            WriteResult::Failed(e) => (false, ConnectionOutput::Failed(e)),
        };

        if terminal || self.lifecycle.is_closing() {
            drop(writer);
            self.release_transport();
        } else {
            self.writer = Some(writer);
        }
        let step = self.lifecycle.finish_write(terminal);
        self.after(step, output)
    }

    fn after(&mut self, step: Step, output: ConnectionOutput) -> ConnectionOutput {
        match step {
            Step::Proceed => output,
            Step::Wait => {
                if let ConnectionOutput::Failed(e) = output {
                    tracing::debug!(peer = %self.peer, "error while closing: {}", e);
                }
                ConnectionOutput::Nothing
            }
            Step::Disconnect => ConnectionOutput::Disconnected(self.take_reason()),
        }
    }

    /// Abort in-flight I/O and drop whatever stream halves are at rest.
    fn release_transport(&mut self) {
        self.shutdown.cancel();
        self.reader = None;
        self.writer = None;
    }

    fn take_reason(&mut self) -> DisconnectReason {
        self.reason.take().unwrap_or(DisconnectReason::Local)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Transport errors that mean the peer is gone rather than a local fault.
fn is_peer_gone(error: &Error) -> bool {
    use std::io::ErrorKind;
    match error {
        Error::Io(e) => matches!(
            e.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}
