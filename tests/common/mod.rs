//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use fractalwire::compute::{Mandelbrot, TileCompute};
use fractalwire::connection::FrameReader;
use fractalwire::protocol::{build_frame, chunk_pixels, TileRequest, MAX_PAYLOAD_SIZE};
use fractalwire::transport::{split_stream, BoxWriter};
use fractalwire::{Complex, Job, Server};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

/// Job over (-2,-2)..(2,2) with 10 iterations.
pub fn job(width: u32, height: u32, divisions: u32) -> Job {
    Job::new(
        Complex::new(-2.0, -2.0),
        Complex::new(2.0, 2.0),
        width,
        height,
        10,
        divisions,
    )
    .unwrap()
}

/// The whole job rendered as a single tile.
pub fn reference_image(job: &Job) -> Vec<u8> {
    Mandelbrot.compute(&TileRequest {
        min: job.min(),
        max: job.max(),
        width: job.width(),
        height: job.height(),
        max_iter: job.max_iter(),
    })
}

/// Run a real server over `stream` until the peer goes away.
pub fn spawn_server(stream: DuplexStream) -> JoinHandle<()> {
    let mut server = Server::builder().build();
    server.attach("dispatcher", stream);
    tokio::spawn(async move { server.run_until_idle().await })
}

/// Hand-driven server side of a connection.
pub struct FakePeer {
    reader: FrameReader,
    writer: BoxWriter,
}

impl FakePeer {
    pub fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = split_stream(stream);
        Self {
            reader: FrameReader::new(reader, MAX_PAYLOAD_SIZE, 4096),
            writer,
        }
    }

    /// Next request, or None once the dispatcher hangs up.
    pub async fn next_request(&mut self) -> Option<TileRequest> {
        let payload = self.reader.next_frame().await.ok()??;
        Some(TileRequest::decode(&payload).unwrap())
    }

    /// Frame and send an arbitrary payload.
    pub async fn send_raw(&mut self, payload: &[u8]) {
        let frame = build_frame(payload).unwrap();
        let _ = self.writer.write_all(&frame).await;
    }

    /// Answer `request` with correctly computed, chunked pixels.
    pub async fn respond(&mut self, request: &TileRequest) {
        let pixels = Bytes::from(Mandelbrot.compute(request));
        for chunk in chunk_pixels(pixels).unwrap() {
            self.send_raw(&chunk.encode()).await;
        }
    }

    /// Answer every request until the dispatcher hangs up.
    pub async fn serve_all(mut self) {
        while let Some(request) = self.next_request().await {
            self.respond(&request).await;
        }
    }
}
