//! Per-connection tile serving cycle.
//!
//! ```text
//! AwaitingRequest ──request──► Computing ──pixels──► Sending ──last chunk written──┐
//!        ▲                                                                         │
//!        └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one request is outstanding per connection: the next read starts
//! after the final chunk of the previous response has been written.

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::{PixelChunker, TileRequest};

enum Phase {
    AwaitingRequest,
    Computing(TileRequest),
    Sending(PixelChunker),
}

/// One accepted connection and where it is in the serve cycle.
pub(super) struct ServerSession {
    pub(super) conn: Connection,
    phase: Phase,
    served: usize,
}

impl ServerSession {
    pub(super) fn new(conn: Connection) -> Self {
        Self {
            conn,
            phase: Phase::AwaitingRequest,
            served: 0,
        }
    }

    /// Tiles fully written to this peer.
    pub(super) fn served(&self) -> usize {
        self.served
    }

    /// Read the next request.
    pub(super) fn await_request(&mut self) -> Result<()> {
        self.phase = Phase::AwaitingRequest;
        self.conn.read()?;
        Ok(())
    }

    /// Decode and validate a request payload; the session moves to computing.
    ///
    /// # Errors
    ///
    /// `Error::Framing` for a truncated request, `Error::Decode` for a
    /// request out of phase or asking for zero or too many pixels.
    pub(super) fn accept_request(
        &mut self,
        payload: &[u8],
        max_tile_pixels: u64,
    ) -> Result<TileRequest> {
        if !matches!(self.phase, Phase::AwaitingRequest) {
            return Err(Error::Decode(
                "request received while a response is in progress".to_string(),
            ));
        }
        let request = TileRequest::decode(payload)?;
        let pixels = request.pixel_count();
        if pixels == 0 || pixels > max_tile_pixels {
            return Err(Error::Decode(format!(
                "{}x{} tile is outside 1..={} pixels",
                request.width, request.height, max_tile_pixels
            )));
        }
        self.phase = Phase::Computing(request);
        Ok(request)
    }

    /// Start streaming the computed pixels back.
    pub(super) fn respond(&mut self, pixels: Vec<u8>) -> Result<()> {
        let Phase::Computing(request) = &self.phase else {
            return Err(Error::Decode("pixels computed with no request".to_string()));
        };
        if pixels.len() as u64 != request.pixel_count() {
            return Err(Error::Decode(format!(
                "compute produced {} pixels for a {}x{} tile",
                pixels.len(),
                request.width,
                request.height
            )));
        }
        self.phase = Phase::Sending(PixelChunker::new(Bytes::from(pixels))?);
        self.send_next()
    }

    /// A write completed: send the next chunk or go back to reading.
    pub(super) fn on_written(&mut self) -> Result<()> {
        self.send_next()
    }

    fn send_next(&mut self) -> Result<()> {
        if let Phase::Sending(chunker) = &mut self.phase {
            if let Some(chunk) = chunker.next() {
                tracing::debug!(
                    peer = %self.conn.peer(),
                    pixels = chunk.pixels().len(),
                    last = chunk.is_last(),
                    "sending chunk"
                );
                self.conn.write(chunk.encode())?;
                return Ok(());
            }
            self.served += 1;
            tracing::debug!(peer = %self.conn.peer(), served = self.served, "tile sent");
        }
        self.await_request()
    }
}
