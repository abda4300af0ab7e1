//! Read primitive: pulls one framed payload at a time off a stream.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::error::Result;
use crate::protocol::FrameBuffer;
use crate::transport::BoxReader;

/// Read half plus the framing state that survives between reads.
///
/// Bytes past the end of one frame stay buffered for the next `next_frame`.
pub struct FrameReader {
    reader: BoxReader,
    frames: FrameBuffer,
    ready: VecDeque<Bytes>,
    scratch: Box<[u8]>,
}

impl FrameReader {
    /// Wrap a read half.
    pub fn new(reader: BoxReader, max_payload_size: usize, read_buffer_size: usize) -> Self {
        Self {
            reader,
            frames: FrameBuffer::with_max_payload(max_payload_size),
            ready: VecDeque::new(),
            scratch: vec![0u8; read_buffer_size.max(1)].into_boxed_slice(),
        }
    }

    /// Read the next complete frame payload.
    ///
    /// Returns `Ok(None)` when the peer ends the stream, including in the
    /// middle of a frame.
    ///
    /// # Errors
    ///
    /// `Error::Framing` for an invalid length prefix, `Error::Io` for
    /// transport failures.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.scratch).await?;
            if n == 0 {
                if self.frames.has_partial_frame() {
                    tracing::debug!(
                        buffered = self.frames.len(),
                        "stream ended in the middle of a frame"
                    );
                }
                return Ok(None);
            }

            self.ready.extend(self.frames.push(&self.scratch[..n])?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{build_frame, MAX_PAYLOAD_SIZE};
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn test_reads_frames_in_order() {
        let (mut near, far) = duplex(1024);
        let mut reader = FrameReader::new(Box::new(far), MAX_PAYLOAD_SIZE, 8);

        let mut bytes = build_frame(b"one").unwrap();
        bytes.extend(build_frame(b"two").unwrap());
        near.write_all(&bytes).await.unwrap();
        drop(near);

        assert_eq!(&reader.next_frame().await.unwrap().unwrap()[..], b"one");
        assert_eq!(&reader.next_frame().await.unwrap().unwrap()[..], b"two");
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_end_of_stream() {
        let (mut near, far) = duplex(1024);
        let mut reader = FrameReader::new(Box::new(far), MAX_PAYLOAD_SIZE, 64);

        near.write_all(&[10, 0, 1, 2]).await.unwrap();
        drop(near);

        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_length_prefix_is_framing_error() {
        let (mut near, far) = duplex(1024);
        let mut reader = FrameReader::new(Box::new(far), MAX_PAYLOAD_SIZE, 64);

        near.write_all(&[0, 0]).await.unwrap();

        assert!(matches!(reader.next_frame().await, Err(Error::Framing(_))));
    }
}
