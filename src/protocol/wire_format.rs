//! Wire format encoding and decoding.
//!
//! Every message travels in a frame with a 2-byte length prefix:
//! ```text
//! ┌───────────┬──────────────────────┐
//! │ Length L  │ Payload              │
//! │ 2 bytes   │ L bytes (1..=65535)  │
//! │ uint16 LE │                      │
//! └───────────┴──────────────────────┘
//! ```
//!
//! All multi-byte integers and floats on the wire are Little Endian.

use crate::error::{Error, Result};

/// Length prefix size in bytes (fixed, exactly 2).
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest payload a length prefix can declare.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Largest complete frame on the wire (prefix + payload).
pub const MAX_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + MAX_PAYLOAD_SIZE;

/// Largest pixel run carried by a single response chunk (2^15).
pub const MAX_PIXEL_CHUNK: usize = 1 << 15;

/// Encode the length prefix for a payload of `len` bytes.
///
/// # Errors
///
/// Returns `Error::Framing` for an empty payload or one that does not fit
/// in 16 bits.
pub fn encode_length(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    if len == 0 {
        return Err(Error::Framing("payload length 0 is invalid".to_string()));
    }
    let len = u16::try_from(len).map_err(|_| {
        Error::Framing(format!(
            "payload length {} exceeds maximum {}",
            len, MAX_PAYLOAD_SIZE
        ))
    })?;
    Ok(len.to_le_bytes())
}

/// Decode and validate a length prefix.
///
/// `max_payload_size` lets a connection accept less than the full 16-bit range.
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE], max_payload_size: usize) -> Result<usize> {
    let len = u16::from_le_bytes(prefix) as usize;
    if len == 0 {
        return Err(Error::Framing("payload length 0 is invalid".to_string()));
    }
    if len > max_payload_size {
        return Err(Error::Framing(format!(
            "payload length {} exceeds maximum {}",
            len, max_payload_size
        )));
    }
    Ok(len)
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use fractalwire::protocol::build_frame;
///
/// let bytes = build_frame(b"hello").unwrap();
/// assert_eq!(bytes, [5, 0, b'h', b'e', b'l', b'l', b'o']);
/// ```
pub fn build_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let prefix = encode_length(payload.len())?;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_is_little_endian() {
        let prefix = encode_length(0x0102).unwrap();
        assert_eq!(prefix, [0x02, 0x01]);
        assert_eq!(decode_length(prefix, MAX_PAYLOAD_SIZE).unwrap(), 0x0102);
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(matches!(encode_length(0), Err(Error::Framing(_))));
        assert!(matches!(
            decode_length([0, 0], MAX_PAYLOAD_SIZE),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn test_max_length_boundary() {
        let prefix = encode_length(MAX_PAYLOAD_SIZE).unwrap();
        assert_eq!(prefix, [0xFF, 0xFF]);
        assert_eq!(
            decode_length(prefix, MAX_PAYLOAD_SIZE).unwrap(),
            MAX_PAYLOAD_SIZE
        );

        let result = encode_length(MAX_PAYLOAD_SIZE + 1);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_decode_respects_configured_maximum() {
        let prefix = encode_length(1000).unwrap();
        let result = decode_length(prefix, 100);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_build_frame_max_size() {
        let payload = vec![7u8; MAX_PAYLOAD_SIZE];
        let frame = build_frame(&payload).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_SIZE);
        assert_eq!(frame.len(), 65537);
    }
}
