//! TCP endpoints and listener.
//!
//! # Example
//!
//! ```ignore
//! use fractalwire::transport::{bind, connect, Endpoint};
//!
//! let listener = bind("0.0.0.0", 5000).await?;
//! let stream = connect(&"127.0.0.1:5000".parse::<Endpoint>()?).await?;
//! ```

use std::str::FromStr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};

/// A `address:port` pair naming a tile server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parse `address:port`, splitting on the last colon so that bracketed
    /// IPv6 literals keep their inner colons.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidEndpoint(format!("{:?}, expected address:port", s));

        let sep = s.rfind(':').ok_or_else(invalid)?;
        let (host, port) = (&s[..sep], &s[sep + 1..]);
        if host.is_empty() || port.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Connect to a tile server.
pub async fn connect(endpoint: &Endpoint) -> Result<TcpStream> {
    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Bind a listener on `address:port`. Port 0 picks a free port.
pub async fn bind(address: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((address, port)).await?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let endpoint: Endpoint = "localhost:4000".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("localhost", 4000));
        assert_eq!(endpoint.to_string(), "localhost:4000");
    }

    #[test]
    fn test_parse_ipv6_endpoint() {
        let endpoint: Endpoint = "[::1]:4000".parse().unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.to_string(), "[::1]:4000");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["localhost", ":4000", "localhost:", "host:port", "host:0", "host:70000"] {
            assert!(bad.parse::<Endpoint>().is_err(), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_bind_and_connect_loopback() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        let stream = connect(&Endpoint::new("127.0.0.1", port)).await.unwrap();

        assert!(stream.nodelay().unwrap());
        accept.await.unwrap().unwrap();
    }
}
