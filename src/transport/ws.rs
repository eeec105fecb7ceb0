//! WebSocket transport: one binary message per frame
//!
//! The socket is driven by a private current-thread tokio runtime so that
//! callers get a blocking API. Do not use it from inside another tokio
//! runtime; `block_on` would panic there.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportError};

/// Upper bound on waiting for the close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    runtime: Runtime,
    stream: Option<WsStream>,
    max_message_size: usize,
}

fn map_ws_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::Io(io) => TransportError::Io(io),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Protocol(other.to_string()),
    }
}

impl WsTransport {
    /// Incoming messages over `max_message_size` fail the read with a protocol error
    pub fn connect(url: &str, timeout: Duration, max_message_size: usize) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(max_message_size);
        ws_config.max_frame_size = Some(max_message_size);

        let stream = runtime.block_on(async {
            match tokio::time::timeout(timeout, connect_async_with_config(url, Some(ws_config), true)).await {
                Ok(Ok((stream, _response))) => Ok(stream),
                Ok(Err(e)) => Err(map_ws_error(e)),
                Err(_) => Err(TransportError::TimedOut),
            }
        })?;

        tracing::debug!("websocket connected to {}", url);
        Ok(Self { runtime, stream: Some(stream), max_message_size })
    }
}

impl Transport for WsTransport {
    fn send(&mut self, frame: &[u8], deadline: Instant) -> Result<(), TransportError> {
        let Self { runtime, stream, max_message_size } = self;
        let stream = stream.as_mut().ok_or(TransportError::Closed)?;
        if frame.len() > *max_message_size {
            return Err(TransportError::Protocol(format!("Message too large: {} bytes", frame.len())));
        }
        let deadline = tokio::time::Instant::from_std(deadline);

        runtime.block_on(async {
            match tokio::time::timeout_at(deadline, stream.send(Message::Binary(frame.to_vec()))).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(map_ws_error(e)),
                Err(_) => Err(TransportError::TimedOut),
            }
        })
    }

    fn recv(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        let Self { runtime, stream, .. } = self;
        let stream = stream.as_mut().ok_or(TransportError::Closed)?;
        let deadline = tokio::time::Instant::from_std(deadline);

        runtime.block_on(async {
            loop {
                let next = match tokio::time::timeout_at(deadline, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => return Err(TransportError::TimedOut),
                };
                match next {
                    Some(Ok(Message::Binary(data))) => return Ok(data),
                    Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                    // Text, ping/pong (answered by tungstenite), raw frames
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(map_ws_error(e)),
                }
            }
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        let result = self
            .runtime
            .block_on(async { tokio::time::timeout(CLOSE_TIMEOUT, stream.close(None)).await });

        match result {
            Ok(Ok(())) => {}
            Ok(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {}
            Ok(Err(e)) => tracing::warn!("websocket close frame failed: {}", e),
            Err(_) => tracing::warn!("websocket close handshake timed out"),
        }
        Ok(())
    }
}
