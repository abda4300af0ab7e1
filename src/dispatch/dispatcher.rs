//! Client-side job dispatcher.
//!
//! Owns the work queue, the canvas and every session, and drives them from a
//! single loop fed by connection completions and connect results:
//!
//! 1. Each new session takes the front item, sends its request and reads.
//! 2. Response chunks accumulate until `last`; the tile is then stitched,
//!    the item merged and the next item (if any) assigned.
//! 3. A lost session's item goes back to the queue and is offered to any
//!    idle session.
//! 4. When every item is merged all sessions are closed; the run ends once
//!    the last disconnect has been processed.

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinSet};

use super::canvas::Canvas;
use super::work_queue::WorkQueue;
use crate::arena::{Arena, SessionKey};
use crate::connection::{
    event_channel, Connection, ConnectionConfig, ConnectionEvent, ConnectionOutput,
    DisconnectReason, EventReceiver, EventSender,
};
use crate::error::{Error, Result};
use crate::job::{Job, WorkItem};
use crate::protocol::ResponseChunk;
use crate::transport::{self, Endpoint};

/// Items completed by one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Peer the session was connected to.
    pub peer: String,
    /// Items it merged.
    pub completed: usize,
}

/// Summary of a finished render.
#[derive(Debug, Clone)]
pub struct RenderStats {
    /// Number of work items in the job.
    pub items: usize,
    /// Per-session completions, in disconnect order.
    pub sessions: Vec<SessionStats>,
    /// Items returned to the queue after a session was lost.
    pub requeued: usize,
    /// Wall time spent in [`Dispatcher::run`].
    pub elapsed: Duration,
}

/// Finished canvas plus run statistics.
#[derive(Debug)]
pub struct RenderOutcome {
    /// The fully stitched image.
    pub canvas: Canvas,
    /// How the work was spread.
    pub stats: RenderStats,
}

struct Session {
    conn: Connection,
    item: Option<WorkItem>,
    pixels: Vec<u8>,
    /// Request held back because a write was still pending.
    held: Option<Bytes>,
    completed: usize,
}

impl Session {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            item: None,
            pixels: Vec::new(),
            held: None,
            completed: 0,
        }
    }
}

type ConnectResult = (Endpoint, Result<TcpStream>);

/// Distributes one [`Job`] over any number of server sessions.
pub struct Dispatcher {
    job: Job,
    config: ConnectionConfig,
    queue: WorkQueue,
    canvas: Canvas,
    sessions: Arena<Session>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    connects: JoinSet<ConnectResult>,
    finishing: bool,
    finished: Vec<SessionStats>,
    requeued: usize,
}

impl Dispatcher {
    /// Dispatcher with the default connection settings.
    pub fn new(job: Job) -> Self {
        Self::with_config(job, ConnectionConfig::default())
    }

    /// Dispatcher with explicit connection settings.
    pub fn with_config(job: Job, config: ConnectionConfig) -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            queue: WorkQueue::new(job.work_items()),
            canvas: Canvas::new(job.width() as usize, job.height() as usize),
            job,
            config,
            sessions: Arena::new(),
            events_tx,
            events_rx,
            connects: JoinSet::new(),
            finishing: false,
            finished: Vec::new(),
            requeued: 0,
        }
    }

    /// The job being rendered.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Open a TCP connection to `endpoint` in the background.
    ///
    /// A failed connect is logged and otherwise ignored; the run only fails
    /// if no session is left to do the work.
    pub fn connect(&mut self, endpoint: Endpoint) {
        tracing::info!(server = %endpoint, "connecting");
        self.connects.spawn(async move {
            let result = transport::connect(&endpoint).await;
            (endpoint, result)
        });
    }

    /// Start a session over an already connected stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<S>(&mut self, peer: impl Into<String>, stream: S) -> SessionKey
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let config = self.config.clone();
        let events = self.events_tx.clone();
        let key = self.sessions.insert_with(|key| {
            tracing::info!(session = %key, peer = %peer, "session connected");
            Session::new(Connection::new(key, peer, stream, &config, events))
        });

        if self.finishing {
            self.close_session(key);
        } else {
            self.assign(key);
        }
        key
    }

    /// Drive every session until the job is rendered or cannot be.
    ///
    /// # Errors
    ///
    /// `Error::WorkRecoveryExhausted` when every session is gone (and no
    /// connect is outstanding) while items are still unmerged.
    pub async fn run(mut self) -> Result<RenderOutcome> {
        let started = Instant::now();
        tracing::info!(
            items = self.queue.len(),
            width = self.job.width(),
            height = self.job.height(),
            "starting render"
        );

        loop {
            if self.sessions.is_empty() && self.connects.is_empty() {
                if !self.queue.is_drained() {
                    let remaining = self.queue.remaining();
                    tracing::error!(remaining, "all sessions disconnected with work left");
                    return Err(Error::WorkRecoveryExhausted { remaining });
                }
                break;
            }

            tokio::select! {
                Some(event) = self.events_rx.recv() => self.on_event(event),
                Some(joined) = self.connects.join_next(), if !self.connects.is_empty() => {
                    self.on_connect_finished(joined)
                }
            }
        }

        if !self.canvas.is_complete() {
            return Err(Error::Stitch(format!(
                "canvas incomplete: {} of {} pixels written",
                self.canvas.covered(),
                self.job.pixel_count()
            )));
        }

        let stats = RenderStats {
            items: self.queue.len(),
            sessions: self.finished,
            requeued: self.requeued,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            elapsed_ms = stats.elapsed.as_millis() as u64,
            requeued = stats.requeued,
            "render complete"
        );
        Ok(RenderOutcome {
            canvas: self.canvas,
            stats,
        })
    }

    fn on_connect_finished(&mut self, joined: std::result::Result<ConnectResult, JoinError>) {
        match joined {
            Ok((endpoint, Ok(stream))) => {
                if self.finishing {
                    tracing::debug!(server = %endpoint, "connected after completion, dropping");
                    return;
                }
                self.attach(endpoint.to_string(), stream);
            }
            Ok((endpoint, Err(e))) => {
                tracing::warn!(server = %endpoint, "connect failed: {}", e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!("connect task failed: {}", e),
        }
    }

    fn on_event(&mut self, event: ConnectionEvent) {
        let key = event.key();
        let Some(session) = self.sessions.get_mut(key) else {
            tracing::debug!(session = %key, "event for a removed session");
            return;
        };
        match session.conn.complete(event) {
            ConnectionOutput::Nothing => {}
            ConnectionOutput::Message(payload) => self.on_message(key, payload),
            ConnectionOutput::Written => self.on_written(key),
            ConnectionOutput::Failed(e) => {
                tracing::warn!(session = %key, "transport error: {}", e);
                self.close_session(key);
            }
            ConnectionOutput::Disconnected(reason) => self.on_disconnected(key, reason),
        }
    }

    fn on_message(&mut self, key: SessionKey, payload: Bytes) {
        match self.accept_chunk(key, &payload) {
            Ok(Some(item)) => self.complete_item(key, item),
            Ok(None) => {
                let Some(session) = self.sessions.get_mut(key) else {
                    return;
                };
                if session.conn.read().is_err() {
                    self.close_session(key);
                }
            }
            Err(e) => {
                tracing::error!(session = %key, "bad response: {}", e);
                self.close_session(key);
            }
        }
    }

    /// Append a chunk to the session's tile. Returns the item once its last
    /// chunk has arrived.
    fn accept_chunk(&mut self, key: SessionKey, payload: &Bytes) -> Result<Option<WorkItem>> {
        let chunk = ResponseChunk::decode(payload)?;
        let Some(session) = self.sessions.get_mut(key) else {
            return Ok(None);
        };
        let Some(item) = session.item else {
            return Err(Error::Decode(
                "response received with no request outstanding".to_string(),
            ));
        };

        let expected = item.pixel_count();
        let received = session.pixels.len() + chunk.pixels().len();
        if received > expected {
            return Err(Error::Decode(format!(
                "item {} overran: {} pixels for a {} pixel tile",
                item.index, received, expected
            )));
        }
        session.pixels.extend_from_slice(chunk.pixels());
        tracing::debug!(
            session = %key,
            item = item.index,
            received,
            expected,
            last = chunk.is_last(),
            "response chunk"
        );

        if !chunk.is_last() {
            return Ok(None);
        }
        if received != expected {
            return Err(Error::Decode(format!(
                "item {} ended short: {} of {} pixels",
                item.index, received, expected
            )));
        }
        Ok(Some(item))
    }

    fn complete_item(&mut self, key: SessionKey, item: WorkItem) {
        let Some(session) = self.sessions.get(key) else {
            return;
        };
        let stitched = match self.job.tile_origin(&item) {
            Ok((x, y)) => self.canvas.stitch(
                x,
                y,
                item.width as usize,
                item.height as usize,
                &session.pixels,
            ),
            Err(e) => Err(e),
        };
        if let Err(e) = stitched {
            tracing::error!(session = %key, item = item.index, "{}", e);
            self.close_session(key);
            return;
        }

        self.queue.merge(item.index, key);
        if let Some(session) = self.sessions.get_mut(key) {
            session.item = None;
            session.pixels.clear();
            session.completed += 1;
            tracing::info!(
                session = %key,
                item = item.index,
                remaining = self.queue.remaining(),
                "item merged"
            );
        }

        if self.queue.is_drained() {
            self.finish();
        } else {
            self.assign(key);
        }
    }

    fn on_written(&mut self, key: SessionKey) {
        let Some(session) = self.sessions.get_mut(key) else {
            return;
        };
        if let Some(request) = session.held.take() {
            if session.conn.write(request).is_err() {
                self.close_session(key);
            }
        }
    }

    fn on_disconnected(&mut self, key: SessionKey, reason: DisconnectReason) {
        let Some(session) = self.sessions.remove(key) else {
            return;
        };
        let peer = session.conn.peer().to_string();
        match (&reason, &session.item) {
            (DisconnectReason::Local, None) => {
                tracing::info!(session = %key, peer = %peer, "session disconnected")
            }
            _ => tracing::warn!(session = %key, peer = %peer, "session lost: {}", reason),
        }

        if let Some(item) = session.item {
            if self.queue.requeue(item.index, key) {
                self.requeued += 1;
                tracing::warn!(item = item.index, "returning item to the queue");
            }
        }
        self.finished.push(SessionStats {
            peer,
            completed: session.completed,
        });

        if !self.finishing {
            for other in self.sessions.keys() {
                self.assign(other);
            }
        }
    }

    /// Give `key` the next queued item if it is idle.
    fn assign(&mut self, key: SessionKey) {
        let Some(session) = self.sessions.get_mut(key) else {
            return;
        };
        if session.item.is_some() || session.conn.is_closing() {
            return;
        }
        let Some(item) = self.queue.pop_for(key) else {
            tracing::debug!(session = %key, "no work queued, session idle");
            return;
        };

        session.item = Some(item);
        session.pixels.clear();
        session.pixels.reserve(item.pixel_count());
        tracing::info!(
            session = %key,
            item = item.index,
            min = %item.min,
            max = %item.max,
            "sending request"
        );

        let request = item.request().encode();
        if session.conn.is_write_pending() {
            session.held = Some(request);
        } else if session.conn.write(request).is_err() {
            self.close_session(key);
            return;
        }
        if !session.conn.is_read_pending() && session.conn.read().is_err() {
            self.close_session(key);
        }
    }

    /// All items merged: close every session.
    fn finish(&mut self) {
        if self.finishing {
            return;
        }
        self.finishing = true;
        tracing::info!(sessions = self.sessions.len(), "all items merged, closing sessions");
        self.connects.abort_all();
        for key in self.sessions.keys() {
            self.close_session(key);
        }
    }

    fn close_session(&mut self, key: SessionKey) {
        if let Some(session) = self.sessions.get_mut(key) {
            session.conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::Complex;
    use crate::connection::FrameReader;
    use crate::protocol::{build_frame, chunk_pixels, TileRequest, MAX_PAYLOAD_SIZE};
    use crate::transport::split_stream;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn job() -> Job {
        Job::new(
            Complex::new(-2.0, -2.0),
            Complex::new(2.0, 2.0),
            4,
            4,
            10,
            2,
        )
        .unwrap()
    }

    /// Serve every request with the item's row-major position as pixel value.
    async fn serve(stream: DuplexStream, job: Job, limit: usize) {
        let (reader, mut writer) = split_stream(stream);
        let mut reader = FrameReader::new(reader, MAX_PAYLOAD_SIZE, 1024);
        let mut served = 0;
        while served < limit {
            let Ok(Some(payload)) = reader.next_frame().await else {
                return;
            };
            let request = TileRequest::decode(&payload).unwrap();
            let step = job.step();
            let col = ((request.min.re - job.min().re) / step.re).round() as u8;
            let row = ((request.min.im - job.min().im) / step.im).round() as u8;
            let value = row * job.divisions() as u8 + col + 1;
            let pixels = vec![value; request.pixel_count() as usize];
            for chunk in chunk_pixels(Bytes::from(pixels)).unwrap() {
                writer.write_all(&build_frame(&chunk.encode()).unwrap()).await.unwrap();
            }
            served += 1;
        }
    }

    #[tokio::test]
    async fn test_single_session_renders_all_items() {
        let job = job();
        let mut dispatcher = Dispatcher::new(job);
        let (near, far) = duplex(64 * 1024);
        tokio::spawn(serve(far, job, usize::MAX));
        dispatcher.attach("fake", near);

        let outcome = dispatcher.run().await.unwrap();
        assert!(outcome.canvas.is_complete());
        assert_eq!(outcome.stats.items, 4);
        assert_eq!(outcome.stats.requeued, 0);
        assert_eq!(
            outcome.stats.sessions,
            vec![SessionStats {
                peer: "fake".to_string(),
                completed: 4
            }]
        );
        assert_eq!(
            outcome.canvas.pixels(),
            &[1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]
        );
    }

    #[tokio::test]
    async fn test_no_sessions_is_exhausted() {
        let dispatcher = Dispatcher::new(job());
        match dispatcher.run().await {
            Err(Error::WorkRecoveryExhausted { remaining }) => assert_eq!(remaining, 4),
            other => panic!("unexpected {:?}", other.map(|o| o.stats)),
        }
    }

    #[tokio::test]
    async fn test_lost_session_item_requeued() {
        let job = job();
        let mut dispatcher = Dispatcher::new(job);

        let (near_a, far_a) = duplex(64 * 1024);
        let (near_b, far_b) = duplex(64 * 1024);
        // A answers one request then hangs up with its second outstanding.
        tokio::spawn(serve(far_a, job, 1));
        tokio::spawn(serve(far_b, job, usize::MAX));
        dispatcher.attach("a", near_a);
        dispatcher.attach("b", near_b);

        let outcome = dispatcher.run().await.unwrap();
        assert!(outcome.canvas.is_complete());
        assert_eq!(outcome.stats.requeued, 1);
        let total: usize = outcome.stats.sessions.iter().map(|s| s.completed).sum();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn test_overrunning_tile_closes_session() {
        let job = job();
        let mut dispatcher = Dispatcher::new(job);
        let (near, mut far) = duplex(64 * 1024);
        // Answer the first 2x2 request with 8 pixels.
        tokio::spawn(async move {
            let chunk = ResponseChunk::new(Bytes::from(vec![9u8; 8]), true).unwrap();
            far.write_all(&build_frame(&chunk.encode()).unwrap())
                .await
                .unwrap();
            // Hold the stream open until the dispatcher hangs up.
            let mut sink = Vec::new();
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut far, &mut sink).await;
        });
        dispatcher.attach("overrun", near);

        match dispatcher.run().await {
            Err(Error::WorkRecoveryExhausted { remaining }) => assert_eq!(remaining, 4),
            other => panic!("unexpected {:?}", other.map(|o| o.stats)),
        }
    }
}
