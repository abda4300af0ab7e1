//! Transport module - the byte-stream capability connections run over.
//!
//! A connection only needs an async read half and an async write half;
//! dropping both halves shuts the stream down. Anything implementing
//! `AsyncRead + AsyncWrite` plugs in:
//! - TCP streams (`tokio::net::TcpStream`)
//! - In-memory pipes (`tokio::io::duplex`), used by the tests

mod tcp;

use tokio::io::{AsyncRead, AsyncWrite};

pub use tcp::{bind, connect, Endpoint};

/// Boxed read half of a stream.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Boxed write half of a stream.
pub type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Split any bidirectional stream into boxed halves.
pub fn split_stream<S>(stream: S) -> (BoxReader, BoxWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}
