//! Splitting a tile's pixel buffer into response chunks.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use fractalwire::protocol::{PixelChunker, MAX_PIXEL_CHUNK};
//!
//! let pixels = Bytes::from(vec![0u8; MAX_PIXEL_CHUNK + 1]);
//! let chunks: Vec<_> = PixelChunker::new(pixels).unwrap().collect();
//!
//! assert_eq!(chunks.len(), 2);
//! assert!(!chunks[0].is_last());
//! assert!(chunks[1].is_last());
//! ```

use bytes::Bytes;

use super::message::ResponseChunk;
use super::wire_format::MAX_PIXEL_CHUNK;
use crate::error::{Error, Result};

/// Number of chunks a pixel buffer of `len` bytes produces.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(MAX_PIXEL_CHUNK)
}

/// Iterator over the response chunks of one tile.
///
/// Full chunks are split off the front of the buffer without copying.
#[derive(Debug)]
pub struct PixelChunker {
    remaining: Bytes,
    finished: bool,
}

impl PixelChunker {
    /// Start chunking `pixels`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` for an empty buffer; a zero-length response
    /// cannot be represented on the wire.
    pub fn new(pixels: Bytes) -> Result<Self> {
        if pixels.is_empty() {
            return Err(Error::Decode("cannot chunk an empty pixel buffer".to_string()));
        }
        Ok(Self {
            remaining: pixels,
            finished: false,
        })
    }

    /// Pixel bytes not yet handed out.
    pub fn remaining_pixels(&self) -> usize {
        self.remaining.len()
    }

    /// Whether the final chunk has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Iterator for PixelChunker {
    type Item = ResponseChunk;

    fn next(&mut self) -> Option<ResponseChunk> {
        if self.finished {
            return None;
        }
        let (pixels, last) = if self.remaining.len() > MAX_PIXEL_CHUNK {
            (self.remaining.split_to(MAX_PIXEL_CHUNK), false)
        } else {
            self.finished = true;
            (std::mem::take(&mut self.remaining), true)
        };
        // Both branches yield 1..=MAX_PIXEL_CHUNK bytes.
        ResponseChunk::new(pixels, last).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.finished {
            0
        } else {
            chunk_count(self.remaining.len())
        };
        (n, Some(n))
    }
}

/// Chunk a whole pixel buffer at once.
pub fn chunk_pixels(pixels: Bytes) -> Result<Vec<ResponseChunk>> {
    Ok(PixelChunker::new(pixels)?.collect())
}
