//! Connection configuration and endpoint parsing
//!
//! `ConnectionConfig` can be built in code (`ConnectionConfig::new(uri)`
//! plus `with_*` methods) or deserialized from a host application's config
//! file. Durations are expressed in milliseconds in serialized form:
//!
//! ```json
//! { "endpoint": "ws://localhost:8182/gremlin", "traversalSource": "g", "requestTimeoutMs": 5000 }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Default traversal source bound on the server
pub const DEFAULT_TRAVERSAL_SOURCE: &str = "g";

/// Default deadline for one request/response exchange
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for establishing the transport and handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames larger than this are rejected (100 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// `ws://host:port/path`, `tcp://host:port` or `unix:///path`
    pub endpoint: String,
    #[serde(default = "default_traversal_source")]
    pub traversal_source: String,
    #[serde(default = "default_request_timeout", rename = "requestTimeoutMs", with = "duration_ms")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", rename = "connectTimeoutMs", with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Sent in the handshake so the server can attribute the session
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_traversal_source() -> String {
    DEFAULT_TRAVERSAL_SOURCE.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            traversal_source: default_traversal_source(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            client_id: None,
        }
    }

    pub fn with_traversal_source(mut self, source: impl Into<String>) -> Self {
        self.traversal_source = source.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Parse a JSON config document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ClientError::Connection {
            endpoint: "<config>".to_string(),
            message: format!("invalid configuration: {}", e),
        })
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Parsed transport endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Binary WebSocket frames
    WebSocket { url: String },
    /// Length-prefixed frames over TCP
    Tcp { host: String, port: u16 },
    /// Length-prefixed frames over a Unix domain socket
    Unix { path: PathBuf },
}

impl Endpoint {
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |message: &str| ClientError::Connection {
            endpoint: uri.to_string(),
            message: message.to_string(),
        };

        let (scheme, rest) = uri.split_once("://").ok_or_else(|| invalid("missing scheme"))?;

        match scheme {
            "ws" => {
                let authority = rest.split('/').next().unwrap_or("");
                if authority.is_empty() {
                    return Err(invalid("missing host"));
                }
                Ok(Endpoint::WebSocket { url: uri.to_string() })
            }
            "wss" => Err(invalid("TLS endpoints (wss://) are not supported")),
            "tcp" => {
                let authority = rest.trim_end_matches('/');
                let (host, port) = authority
                    .rsplit_once(':')
                    .ok_or_else(|| invalid("expected tcp://host:port"))?;
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                Ok(Endpoint::Tcp { host: host.to_string(), port })
            }
            "unix" => {
                if !rest.starts_with('/') {
                    return Err(invalid("expected unix:///absolute/path"));
                }
                Ok(Endpoint::Unix { path: PathBuf::from(rest) })
            }
            other => Err(invalid(&format!("unsupported scheme '{}'", other))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::WebSocket { url } => f.write_str(url),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Endpoint::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("ws://localhost:8182/gremlin");
        assert_eq!(config.traversal_source, "g");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_message_size, 100 * 1024 * 1024);
        assert!(config.client_id.is_none());
    }

    #[test]
    fn test_config_from_json() {
        let config = ConnectionConfig::from_json(
            r#"{"endpoint": "tcp://127.0.0.1:9000", "requestTimeoutMs": 250, "clientId": "tutorial"}"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "tcp://127.0.0.1:9000");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.traversal_source, "g");
        assert_eq!(config.client_id.as_deref(), Some("tutorial"));
    }

    #[test]
    fn test_config_from_json_missing_endpoint() {
        let err = ConnectionConfig::from_json(r#"{"traversalSource": "g"}"#).unwrap_err();
        assert_eq!(err.code(), "CONNECTION");
    }

    #[test]
    fn test_parse_endpoints() {
        assert_eq!(
            Endpoint::parse("ws://localhost:8182/gremlin").unwrap(),
            Endpoint::WebSocket { url: "ws://localhost:8182/gremlin".into() }
        );
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:9000").unwrap(),
            Endpoint::Tcp { host: "127.0.0.1".into(), port: 9000 }
        );
        assert_eq!(
            Endpoint::parse("unix:///tmp/graph.sock").unwrap(),
            Endpoint::Unix { path: PathBuf::from("/tmp/graph.sock") }
        );
    }

    #[test]
    fn test_parse_rejects_bad_endpoints() {
        for uri in [
            "localhost:8182",
            "wss://localhost:8182/gremlin",
            "ws:///gremlin",
            "tcp://localhost",
            "tcp://:9000",
            "tcp://localhost:notaport",
            "unix://relative/path",
            "http://localhost:8182",
        ] {
            let err = Endpoint::parse(uri).unwrap_err();
            assert!(matches!(err, ClientError::Connection { .. }), "{} should be rejected", uri);
        }
    }
}
