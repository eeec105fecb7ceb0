//! ServerSession - per-connection state of the in-memory server
//!
//! A session starts unbound. The `hello` handshake binds it to a traversal
//! source; traversals are refused until then.

/// Session state for one client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSession {
    /// Connection number assigned by whoever accepts the connection
    pub id: usize,
    /// Client-supplied name from `hello`, if any
    pub client_id: Option<String>,
    /// Traversal source bound by `hello`
    pub traversal_source: Option<String>,
    /// Protocol version negotiated with the client (0 until `hello`)
    pub protocol_version: u32,
}

impl ServerSession {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            client_id: None,
            traversal_source: None,
            protocol_version: 0,
        }
    }

    /// Record a successful handshake
    pub fn bind(&mut self, traversal_source: String, protocol_version: u32, client_id: Option<String>) {
        self.traversal_source = Some(traversal_source);
        self.protocol_version = protocol_version;
        self.client_id = client_id;
    }

    pub fn is_bound(&self) -> bool {
        self.traversal_source.is_some()
    }

    /// Display name for logs
    pub fn name(&self) -> String {
        match &self.client_id {
            Some(client) => format!("{}#{}", client, self.id),
            None => format!("client#{}", self.id),
        }
    }
}
