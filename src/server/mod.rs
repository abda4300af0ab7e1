//! Tile server: accepts connections and answers tile requests.
//!
//! The [`ServerBuilder`] provides a fluent API for configuring the compute
//! implementation and limits. The [`Server`] then runs one loop that:
//! 1. Accepts connections and starts a session for each
//! 2. Feeds connection completions to the sessions
//! 3. Collects offloaded compute results
//!
//! Sessions share nothing; a lost connection just drops its session.
//!
//! # Example
//!
//! ```no_run
//! use fractalwire::compute::ComputeMode;
//! use fractalwire::server::Server;
//! use fractalwire::transport::bind;
//!
//! # async fn run() -> fractalwire::Result<()> {
//! let listener = bind("0.0.0.0", 4000).await?;
//! Server::builder()
//!     .compute_mode(ComputeMode::Offload)
//!     .build()
//!     .serve(listener)
//!     .await
//! # }
//! ```

mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;

use crate::arena::{Arena, SessionKey};
use crate::compute::{ComputeMode, Mandelbrot, TileCompute};
use crate::connection::{
    event_channel, Connection, ConnectionConfig, ConnectionEvent, ConnectionOutput,
    DisconnectReason, EventReceiver, EventSender,
};
use crate::error::{Error, Result};
use crate::protocol::TileRequest;

use session::ServerSession;

/// Default cap on pixels per requested tile (16 Mi).
pub const DEFAULT_MAX_TILE_PIXELS: u64 = 16 * 1024 * 1024;

/// Pause before accepting again after an accept error.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Builder for a [`Server`].
pub struct ServerBuilder {
    compute: Arc<dyn TileCompute>,
    mode: ComputeMode,
    max_tile_pixels: u64,
    connection: ConnectionConfig,
}

impl ServerBuilder {
    /// Mandelbrot kernel, inline compute, default limits.
    pub fn new() -> Self {
        Self {
            compute: Arc::new(Mandelbrot),
            mode: ComputeMode::default(),
            max_tile_pixels: DEFAULT_MAX_TILE_PIXELS,
            connection: ConnectionConfig::default(),
        }
    }

    /// Use a different tile compute implementation.
    pub fn compute(mut self, compute: impl TileCompute) -> Self {
        self.compute = Arc::new(compute);
        self
    }

    /// Choose where compute runs.
    ///
    /// Default: [`ComputeMode::Inline`]
    pub fn compute_mode(mut self, mode: ComputeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Largest tile (in pixels) a request may ask for.
    ///
    /// Default: 16 Mi
    pub fn max_tile_pixels(mut self, max: u64) -> Self {
        self.max_tile_pixels = max;
        self
    }

    /// Per-connection settings.
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        let (events_tx, events_rx) = event_channel();
        Server {
            compute: self.compute,
            mode: self.mode,
            max_tile_pixels: self.max_tile_pixels,
            config: self.connection,
            sessions: Arena::new(),
            events_tx,
            events_rx,
            computing: JoinSet::new(),
            computing_for: HashMap::new(),
            accept_resume: None,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pixels of one tile and how long they took.
type Computed = (Vec<u8>, Duration);

fn timed_compute(compute: &dyn TileCompute, request: &TileRequest) -> Computed {
    let started = std::time::Instant::now();
    let pixels = compute.compute(request);
    (pixels, started.elapsed())
}

/// A tile server.
pub struct Server {
    compute: Arc<dyn TileCompute>,
    mode: ComputeMode,
    max_tile_pixels: u64,
    config: ConnectionConfig,
    sessions: Arena<ServerSession>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    computing: JoinSet<Computed>,
    computing_for: HashMap<task::Id, SessionKey>,
    accept_resume: Option<Instant>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Start serving an already connected stream.
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
            tracing::info!(session = %key, peer = %peer, "client connected");
            ServerSession::new(Connection::new(key, peer, stream, &config, events))
        });
        if let Some(session) = self.sessions.get_mut(key) {
            if let Err(e) = session.await_request() {
                tracing::warn!(session = %key, "could not start reading: {}", e);
                session.conn.close();
            }
        }
        key
    }

    /// Accept and serve connections forever.
    pub async fn serve(mut self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, mode = ?self.mode, "serving");
        }
        loop {
            let resume = self.accept_resume.unwrap_or_else(Instant::now);
            tokio::select! {
                accepted = listener.accept(), if self.accept_resume.is_none() => {
                    self.on_accept(accepted)
                }
                _ = tokio::time::sleep_until(resume), if self.accept_resume.is_some() => {
                    self.accept_resume = None;
                }
                Some(event) = self.events_rx.recv() => self.on_event(event),
                Some(joined) = self.computing.join_next_with_id(), if !self.computing.is_empty() => {
                    self.on_computed(joined)
                }
            }
        }
    }

    /// Serve attached sessions until every one has disconnected.
    pub async fn run_until_idle(&mut self) {
        while !self.sessions.is_empty() || !self.computing.is_empty() {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.on_event(event),
                Some(joined) = self.computing.join_next_with_id(), if !self.computing.is_empty() => {
                    self.on_computed(joined)
                }
            }
        }
    }

    fn on_accept(&mut self, accepted: std::io::Result<(TcpStream, std::net::SocketAddr)>) {
        match accepted {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%addr, "set_nodelay failed: {}", e);
                }
                self.attach(addr.to_string(), stream);
            }
            Err(e) => {
                tracing::warn!("accept failed: {}", e);
                self.accept_resume = Some(Instant::now() + ACCEPT_BACKOFF);
            }
        }
    }

    fn on_event(&mut self, event: ConnectionEvent) {
        let key = event.key();
        let Some(session) = self.sessions.get_mut(key) else {
            tracing::debug!(session = %key, "event for a removed session");
            return;
        };
        let result = match session.conn.complete(event) {
            ConnectionOutput::Nothing => Ok(()),
            ConnectionOutput::Message(payload) => {
                match session.accept_request(&payload, self.max_tile_pixels) {
                    Ok(request) => {
                        tracing::info!(
                            session = %key,
                            min = %request.min,
                            max = %request.max,
                            width = request.width,
                            height = request.height,
                            max_iter = request.max_iter,
                            "request"
                        );
                        match self.mode {
                            ComputeMode::Inline => {
                                let (pixels, elapsed) =
                                    timed_compute(self.compute.as_ref(), &request);
                                log_computed(key, elapsed);
                                session.respond(pixels)
                            }
                            ComputeMode::Offload => {
                                let compute = Arc::clone(&self.compute);
                                let handle = self.computing.spawn_blocking(move || {
                                    timed_compute(compute.as_ref(), &request)
                                });
                                self.computing_for.insert(handle.id(), key);
                                Ok(())
                            }
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            ConnectionOutput::Written => session.on_written(),
            ConnectionOutput::Failed(e) => Err(e),
            ConnectionOutput::Disconnected(reason) => {
                self.on_disconnected(key, reason);
                Ok(())
            }
        };
        if let Err(e) = result {
            self.fail_session(key, e);
        }
    }

    fn on_computed(&mut self, joined: std::result::Result<(task::Id, Computed), JoinError>) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(e) => e.id(),
        };
        let Some(key) = self.computing_for.remove(&id) else {
            tracing::debug!(task = %id, "compute task with no session");
            return;
        };
        let (pixels, elapsed) = match joined {
            Ok((_, computed)) => computed,
            Err(e) => {
                self.fail_session(key, Error::Compute(e.to_string()));
                return;
            }
        };
        let Some(session) = self.sessions.get_mut(key) else {
            tracing::debug!(session = %key, "tile computed for a departed session");
            return;
        };
        log_computed(key, elapsed);
        if let Err(e) = session.respond(pixels) {
            self.fail_session(key, e);
        }
    }

    fn on_disconnected(&mut self, key: SessionKey, reason: DisconnectReason) {
        if let Some(session) = self.sessions.remove(key) {
            tracing::info!(
                session = %key,
                peer = %session.conn.peer(),
                served = session.served(),
                "client disconnected: {}",
                reason
            );
        }
    }

    fn fail_session(&mut self, key: SessionKey, error: Error) {
        let Some(session) = self.sessions.get_mut(key) else {
            return;
        };
        match error {
            Error::ConnectionClosed => {
                tracing::debug!(session = %key, "session already closing");
            }
            e if e.is_connection_fatal() => {
                tracing::error!(session = %key, "closing session: {}", e);
            }
            e => tracing::warn!(session = %key, "closing session: {}", e),
        }
        session.conn.close();
    }
}

fn log_computed(key: SessionKey, elapsed: Duration) {
    tracing::info!(session = %key, elapsed_ms = elapsed.as_millis() as u64, "tile computed");
}
