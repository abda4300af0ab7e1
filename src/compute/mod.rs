//! Tile compute boundary.
//!
//! The server hands each decoded [`TileRequest`] to a [`TileCompute`]
//! implementation and streams back the returned pixels. Implementations are
//! pure: the same request always yields the same `width × height` bytes,
//! row-major.

mod mandelbrot;

use crate::protocol::TileRequest;

pub use mandelbrot::Mandelbrot;

/// Produces the pixels for one tile.
pub trait TileCompute: Send + Sync + 'static {
    /// Compute `request.width * request.height` pixel bytes, row-major.
    fn compute(&self, request: &TileRequest) -> Vec<u8>;
}

impl<F> TileCompute for F
where
    F: Fn(&TileRequest) -> Vec<u8> + Send + Sync + 'static,
{
    fn compute(&self, request: &TileRequest) -> Vec<u8> {
        self(request)
    }
}

/// Where the server runs tile compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeMode {
    /// On the event loop, inside the read completion. Stalls the loop while
    /// a tile is computed.
    #[default]
    Inline,
    /// On tokio's blocking pool; pixels come back to the loop as an event.
    Offload,
}
