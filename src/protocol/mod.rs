//! Protocol module - wire format, framing, messages and chunking.
//!
//! This module implements the binary protocol spoken between the client
//! dispatcher and the tile servers:
//! - 2-byte length prefix encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - `TileRequest` / `ResponseChunk` payload codecs
//! - Splitting tile pixels into bounded response chunks

mod chunking;
mod frame_buffer;
mod message;
mod wire_format;

pub use chunking::{chunk_count, chunk_pixels, PixelChunker};
pub use frame_buffer::FrameBuffer;
pub use message::{ResponseChunk, TileRequest, REQUEST_SIZE};
pub use wire_format::{
    build_frame, decode_length, encode_length, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE,
    MAX_PAYLOAD_SIZE, MAX_PIXEL_CHUNK,
};
