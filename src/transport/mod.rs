//! Transports: move opaque frames between client and server
//!
//! A transport knows nothing about envelopes or plans. It sends one frame
//! and receives frames until a deadline. Matching responses to requests is
//! the connection's job.

pub mod framed;
pub mod ws;

use std::time::Instant;

use thiserror::Error;

use crate::config::{ConnectionConfig, Endpoint};
use crate::error::{ClientError, Result};

pub use framed::FramedTransport;
pub use ws::WsTransport;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("deadline elapsed")]
    TimedOut,

    #[error("peer closed the connection")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Protocol(String),
}

/// Frame-level channel to a traversal server
///
/// Implementations must leave themselves closable after any error,
/// including a deadline that elapsed in the middle of a read.
pub trait Transport: Send {
    /// Send one frame
    fn send(&mut self, frame: &[u8], deadline: Instant) -> std::result::Result<(), TransportError>;

    /// Receive the next frame, waiting at most until `deadline`
    fn recv(&mut self, deadline: Instant) -> std::result::Result<Vec<u8>, TransportError>;

    /// Release the underlying channel. Must tolerate repeated calls.
    fn close(&mut self) -> std::result::Result<(), TransportError>;
}

/// Open the transport matching the configured endpoint
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
    let endpoint = Endpoint::parse(&config.endpoint)?;
    let to_conn_err = |e: TransportError| ClientError::Connection {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    };

    let transport: Box<dyn Transport> = match &endpoint {
        Endpoint::WebSocket { url } => Box::new(
            WsTransport::connect(url, config.connect_timeout, config.max_message_size).map_err(to_conn_err)?,
        ),
        Endpoint::Tcp { host, port } => Box::new(
            FramedTransport::connect_tcp(host, *port, config.connect_timeout, config.max_message_size)
                .map_err(to_conn_err)?,
        ),
        #[cfg(unix)]
        Endpoint::Unix { path } => {
            Box::new(FramedTransport::connect_unix(path, config.max_message_size).map_err(to_conn_err)?)
        }
        #[cfg(not(unix))]
        Endpoint::Unix { .. } => {
            return Err(to_conn_err(TransportError::Protocol(
                "unix sockets are not available on this platform".to_string(),
            )))
        }
    };

    Ok(transport)
}
