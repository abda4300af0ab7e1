//! Write primitive: one framed payload per call.
//!
//! The length prefix and payload go out as two `IoSlice`s in a single
//! `write_vectored` call when the kernel accepts everything at once; partial
//! writes fall back to rebuilding the slices for the unwritten tail.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::{encode_length, LENGTH_PREFIX_SIZE};

/// A frame ready to be written.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded length prefix.
    pub prefix: [u8; LENGTH_PREFIX_SIZE],
    /// Payload bytes (never empty).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Frame `payload`, validating its length.
    pub fn new(payload: Bytes) -> Result<Self> {
        Ok(Self {
            prefix: encode_length(payload.len())?,
            payload,
        })
    }

    /// Total size of this frame (prefix + payload).
    #[inline]
    pub fn size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.payload.len()
    }
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total_size = frame.size();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(frame, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for the part of `frame` after `skip_bytes`.
fn remaining_slices(frame: &OutboundFrame, skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(2);
    if skip_bytes < LENGTH_PREFIX_SIZE {
        slices.push(IoSlice::new(&frame.prefix[skip_bytes..]));
    }
    let start_in_payload = skip_bytes.saturating_sub(LENGTH_PREFIX_SIZE);
    if start_in_payload < frame.payload.len() {
        slices.push(IoSlice::new(&frame.payload[start_in_payload..]));
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(payload: &'static [u8]) -> OutboundFrame {
        OutboundFrame::new(Bytes::from_static(payload)).unwrap()
    }

    #[test]
    fn test_outbound_frame_creation() {
        let frame = frame(b"hello");
        assert_eq!(frame.prefix, [5, 0]);
        assert_eq!(frame.size(), LENGTH_PREFIX_SIZE + 5);
    }

    #[test]
    fn test_outbound_frame_rejects_empty() {
        assert!(OutboundFrame::new(Bytes::new()).is_err());
    }

    #[test]
    fn test_remaining_slices_no_skip() {
        let frame = frame(b"hello");
        let slices = remaining_slices(&frame, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_remaining_slices_partial_prefix() {
        let frame = frame(b"hello");
        let slices = remaining_slices(&frame, 1);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 1);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_remaining_slices_inside_payload() {
        let frame = frame(b"hello");
        let slices = remaining_slices(&frame, LENGTH_PREFIX_SIZE + 3);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"lo");
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut buf = Cursor::new(Vec::new());
        write_frame(&mut buf, &frame(b"hello")).await.unwrap();
        assert_eq!(buf.into_inner(), [5, 0, b'h', b'e', b'l', b'l', b'o']);
    }

    #[tokio::test]
    async fn test_write_frame_through_small_pipe() {
        // A 4-byte duplex forces several partial writes.
        let (mut near, mut far) = tokio::io::duplex(4);
        let payload = Bytes::from(vec![42u8; 100]);
        let frame = OutboundFrame::new(payload).unwrap();

        let write = tokio::spawn(async move { write_frame(&mut near, &frame).await });

        let mut received = Vec::new();
        let mut buf = [0u8; 16];
        while received.len() < 102 {
            let n = tokio::io::AsyncReadExt::read(&mut far, &mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        write.await.unwrap().unwrap();

        assert_eq!(&received[..2], &[100, 0]);
        assert!(received[2..].iter().all(|&b| b == 42));
    }
}
