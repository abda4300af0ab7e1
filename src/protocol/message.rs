//! Request and response chunk messages.
//!
//! ```text
//! TileRequest (44 bytes)
//! ┌────────┬────────┬────────┬────────┬───────┬────────┬──────────┐
//! │ min.re │ min.im │ max.re │ max.im │ width │ height │ max_iter │
//! │ f64 LE │ f64 LE │ f64 LE │ f64 LE │u32 LE │ u32 LE │  u32 LE  │
//! └────────┴────────┴────────┴────────┴───────┴────────┴──────────┘
//!
//! ResponseChunk (3..=32771 bytes)
//! ┌────────────┬──────────────┬──────┐
//! │ count      │ pixels       │ last │
//! │ u16 LE     │ count bytes  │ u8   │
//! └────────────┴──────────────┴──────┘
//! ```
//!
//! Missing or overlong fields are framing errors; a well-framed payload with
//! impossible values (zero pixels, a flag other than 0/1, trailing bytes) is
//! a decode error.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::wire_format::MAX_PIXEL_CHUNK;
use crate::complex::Complex;
use crate::error::{Error, Result};

/// Encoded size of a [`TileRequest`].
pub const REQUEST_SIZE: usize = 4 * 8 + 3 * 4;

/// Request for one tile of pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRequest {
    /// Lower corner of the tile in the complex plane.
    pub min: Complex,
    /// Upper corner of the tile in the complex plane.
    pub max: Complex,
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
    /// Iteration bound per pixel.
    pub max_iter: u32,
}

impl TileRequest {
    /// Number of pixels this request asks for.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Encode to payload bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_SIZE);
        buf.put_f64_le(self.min.re);
        buf.put_f64_le(self.min.im);
        buf.put_f64_le(self.max.re);
        buf.put_f64_le(self.max.im);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.max_iter);
        buf.freeze()
    }

    /// Decode from payload bytes.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let request = Self {
            min: get_complex(&mut data, "min")?,
            max: get_complex(&mut data, "max")?,
            width: get_u32(&mut data, "width")?,
            height: get_u32(&mut data, "height")?,
            max_iter: get_u32(&mut data, "max_iter")?,
        };
        if data.has_remaining() {
            return Err(Error::Decode(format!(
                "request has {} trailing bytes",
                data.remaining()
            )));
        }
        Ok(request)
    }
}

/// One fragment of a tile's pixel stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseChunk {
    pixels: Bytes,
    last: bool,
}

impl ResponseChunk {
    /// Create a chunk, validating the pixel count (1..=32768).
    pub fn new(pixels: Bytes, last: bool) -> Result<Self> {
        if pixels.is_empty() {
            return Err(Error::Decode("response chunk has no pixels".to_string()));
        }
        if pixels.len() > MAX_PIXEL_CHUNK {
            return Err(Error::Framing(format!(
                "response chunk of {} pixels exceeds maximum {}",
                pixels.len(),
                MAX_PIXEL_CHUNK
            )));
        }
        Ok(Self { pixels, last })
    }

    /// Pixel bytes carried by this chunk.
    #[inline]
    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    /// Whether this is the final chunk of the tile.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Encoded payload size.
    pub fn encoded_len(&self) -> usize {
        2 + self.pixels.len() + 1
    }

    /// Encode to payload bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        // Bounded by MAX_PIXEL_CHUNK in `new`.
        buf.put_u16_le(self.pixels.len() as u16);
        buf.put_slice(&self.pixels);
        buf.put_u8(u8::from(self.last));
        buf.freeze()
    }

    /// Decode from payload bytes.
    ///
    /// The pixel bytes are sliced out of `data` without copying.
    pub fn decode(data: &Bytes) -> Result<Self> {
        let mut cursor = &data[..];
        let count = get_u16(&mut cursor, "pixel count")? as usize;
        if count > MAX_PIXEL_CHUNK {
            return Err(Error::Framing(format!(
                "declared pixel count {} exceeds maximum {}",
                count, MAX_PIXEL_CHUNK
            )));
        }
        if cursor.remaining() < count {
            return Err(Error::Framing(format!(
                "declared pixel count {} runs past the {} available bytes",
                count,
                cursor.remaining()
            )));
        }
        let start = 2;
        let pixels = data.slice(start..start + count);
        cursor.advance(count);

        let last = match get_u8(&mut cursor, "last flag")? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::Decode(format!("invalid last flag {}", other)));
            }
        };
        if cursor.has_remaining() {
            return Err(Error::Decode(format!(
                "response has {} trailing bytes",
                cursor.remaining()
            )));
        }
        Self::new(pixels, last)
    }
}

fn truncated(field: &str, need: usize, have: usize) -> Error {
    Error::Framing(format!(
        "truncated {}: need {} bytes, have {}",
        field, need, have
    ))
}

fn get_u8(buf: &mut &[u8], field: &str) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(truncated(field, 1, buf.remaining()));
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8], field: &str) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(truncated(field, 2, buf.remaining()));
    }
    Ok(buf.get_u16_le())
}

fn get_u32(buf: &mut &[u8], field: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(truncated(field, 4, buf.remaining()));
    }
    Ok(buf.get_u32_le())
}

fn get_complex(buf: &mut &[u8], field: &str) -> Result<Complex> {
    if buf.remaining() < 16 {
        return Err(truncated(field, 16, buf.remaining()));
    }
    let re = buf.get_f64_le();
    let im = buf.get_f64_le();
    Ok(Complex::new(re, im))
}
