//! # fractalwire
//!
//! Distributed Mandelbrot rendering over a length-prefixed TCP protocol.
//!
//! A client splits a canvas into an N×N grid of tiles, hands them out to
//! any number of tile servers and stitches the answers back together. A
//! server that drops out mid-tile has its tile reassigned to a survivor.
//!
//! ## Architecture
//!
//! - **Protocol**: 2-byte little-endian length prefix, 44-byte tile
//!   requests, pixel responses chunked to at most 32768 bytes
//! - **Connection**: lifecycle state machine over any `AsyncRead + AsyncWrite`
//!   stream, with completions delivered to one owner loop
//! - **Server**: read request, compute tile, stream chunks, repeat
//! - **Dispatch**: work queue, session assignment, recovery, canvas stitching
//!
//! ## Example
//!
//! ```no_run
//! use fractalwire::{Complex, Dispatcher, Job};
//!
//! # async fn run() -> fractalwire::Result<()> {
//! let job = Job::new(Complex::new(-2.0, -1.5), Complex::new(1.0, 1.5), 1024, 1024, 256, 4)?;
//! let mut dispatcher = Dispatcher::new(job);
//! dispatcher.connect("127.0.0.1:4000".parse()?);
//! dispatcher.connect("127.0.0.1:4001".parse()?);
//!
//! let outcome = dispatcher.run().await?;
//! fractalwire::image::write_pgm("image.pgm", 1024, 1024, outcome.canvas.pixels())?;
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod complex;
pub mod compute;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod job;
pub mod protocol;
pub mod report;
pub mod server;
pub mod transport;

pub use complex::Complex;
pub use dispatch::{Dispatcher, RenderOutcome};
pub use error::{Error, Result};
pub use job::{Job, WorkItem};
pub use server::{Server, ServerBuilder};
