//! In-memory traversal server
//!
//! A small, complete server side for the client: it stores a graph in
//! memory, speaks the same hello / ping / traverse protocol as a remote
//! server and evaluates plans with [`Evaluator`]. Used by the tests and the
//! tutorial demo, either in-process through [`MemoryTransport`] or behind a
//! real socket through [`MemoryGraph::handle_frame`].

pub mod eval;
pub mod session;

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub use eval::{test_predicate, EvalError, Evaluator};
pub use session::ServerSession;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::process::TraversalPlan;
use crate::protocol::{
    decode_request, encode_response, Request, RequestEnvelope, Response, ResponseEnvelope, PROTOCOL_VERSION,
};
use crate::structure::{Edge, ElementId, GraphValue, Vertex};
use crate::transport::{Transport, TransportError};

/// Traversals slower than this are logged at warn level
const SLOW_QUERY_THRESHOLD_MS: u128 = 100;

pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capabilities advertised in the hello response
pub const FEATURES: &[&str] = &["traverse", "valueMap", "repeat", "groupCount"];

// ============================================================================
// Graph
// ============================================================================

pub struct MemoryGraph {
    traversal_source: String,
    vertices: BTreeMap<ElementId, Vertex>,
    edges: BTreeMap<ElementId, Edge>,
    next_session_id: AtomicUsize,
}

impl std::fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGraph")
            .field("traversal_source", &self.traversal_source)
            .field("vertices", &self.vertices.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

impl MemoryGraph {
    /// Empty graph served under `traversal_source`
    pub fn new(traversal_source: impl Into<String>) -> Self {
        Self {
            traversal_source: traversal_source.into(),
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            next_session_id: AtomicUsize::new(1),
        }
    }

    /// Insert or replace a vertex
    pub fn add_vertex(&mut self, vertex: Vertex) {
        self.vertices.insert(vertex.id.clone(), vertex);
    }

    /// Insert or replace an edge. Both endpoints must already exist.
    pub fn add_edge(&mut self, edge: Edge) -> std::result::Result<(), EvalError> {
        for end in [&edge.out_v, &edge.in_v] {
            if !self.vertices.contains_key(end) {
                return Err(EvalError::UnknownVertex(end.clone()));
            }
        }
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    /// TinkerPop's "modern" toy graph: four people, two pieces of software
    pub fn modern() -> Self {
        let mut graph = Self::new(crate::config::DEFAULT_TRAVERSAL_SOURCE);

        let person = |id: i64, name: &str, age: i64| {
            Vertex::new(id, "person").with_property("name", name).with_property("age", age)
        };
        let software = |id: i64, name: &str| {
            Vertex::new(id, "software").with_property("name", name).with_property("lang", "java")
        };

        graph.add_vertex(person(1, "marko", 29));
        graph.add_vertex(person(2, "vadas", 27));
        graph.add_vertex(software(3, "lop"));
        graph.add_vertex(person(4, "josh", 32));
        graph.add_vertex(software(5, "ripple"));
        graph.add_vertex(person(6, "peter", 35));

        let edges = [
            (7, "knows", 1, 2, 0.5),
            (8, "knows", 1, 4, 1.0),
            (9, "created", 1, 3, 0.4),
            (10, "created", 4, 5, 1.0),
            (11, "created", 4, 3, 0.4),
            (12, "created", 6, 3, 0.2),
        ];
        for (id, label, out_v, in_v, weight) in edges {
            let edge = Edge::new(id as i64, label, out_v as i64, in_v as i64).with_property("weight", weight);
            // endpoints were added above
            graph.edges.insert(edge.id.clone(), edge);
        }

        graph
    }

    pub fn traversal_source(&self) -> &str {
        &self.traversal_source
    }

    pub fn vertex(&self, id: &ElementId) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    /// Vertices in id order
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    /// Edges in id order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn evaluate(&self, plan: &TraversalPlan) -> std::result::Result<Vec<GraphValue>, EvalError> {
        Evaluator::new(self).run(plan.steps())
    }

    /// Fresh session for a newly accepted connection
    pub fn open_session(&self) -> ServerSession {
        ServerSession::new(self.next_session_id.fetch_add(1, Ordering::SeqCst))
    }

    // ========================================================================
    // Request handling
    // ========================================================================

    pub fn handle_request(&self, session: &mut ServerSession, request: Request) -> Response {
        match request {
            Request::Hello { protocol_version, client_id, traversal_source } => {
                if traversal_source != self.traversal_source {
                    return Response::ErrorWithCode {
                        error: format!("Unknown traversal source '{}'", traversal_source),
                        code: "UNKNOWN_TRAVERSAL_SOURCE".to_string(),
                    };
                }
                let negotiated = protocol_version.min(PROTOCOL_VERSION);
                if negotiated == 0 {
                    return Response::ErrorWithCode {
                        error: format!("Unsupported protocol version {}", protocol_version),
                        code: "UNSUPPORTED_PROTOCOL".to_string(),
                    };
                }
                session.bind(traversal_source, negotiated, client_id);
                tracing::debug!("[memory] {} bound to '{}'", session.name(), self.traversal_source);

                Response::HelloOk {
                    ok: true,
                    protocol_version: negotiated,
                    server_version: SERVER_VERSION.to_string(),
                    features: FEATURES.iter().map(|f| f.to_string()).collect(),
                }
            }

            Request::Ping => Response::Pong { pong: true, version: SERVER_VERSION.to_string() },

            Request::Traverse { plan } => {
                if !session.is_bound() {
                    return Response::ErrorWithCode {
                        error: "hello must precede traverse".to_string(),
                        code: "NO_SESSION".to_string(),
                    };
                }

                let start = Instant::now();
                let outcome = self.evaluate(&plan);
                let elapsed_ms = start.elapsed().as_millis();
                if elapsed_ms >= SLOW_QUERY_THRESHOLD_MS {
                    tracing::warn!("[memory SLOW] traverse with {} steps: {}ms", plan.len(), elapsed_ms);
                }

                match outcome {
                    Ok(results) => Response::Results { results },
                    Err(e) => Response::ErrorWithCode { error: e.to_string(), code: e.code().to_string() },
                }
            }
        }
    }

    fn handle_envelope(&self, session: &mut ServerSession, envelope: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope { request_id, request } = envelope;
        ResponseEnvelope { request_id, response: self.handle_request(session, request) }
    }

    /// Decode one request frame, handle it and encode the response frame.
    /// Undecodable requests are answered without a request id.
    pub fn handle_frame(&self, session: &mut ServerSession, frame: &[u8]) -> Result<Vec<u8>> {
        let envelope = match decode_request(frame) {
            Ok(envelope) => self.handle_envelope(session, envelope),
            Err(e) => {
                tracing::warn!("[memory] {} sent an invalid request: {}", session.name(), e);
                ResponseEnvelope { request_id: None, response: Response::Error { error: e.to_string() } }
            }
        };
        encode_response(&envelope)
    }

    /// In-process connection to this graph
    pub fn connect(self: &Arc<Self>) -> Result<Connection> {
        self.connect_with(ConnectionConfig::new(format!("memory://{}", self.traversal_source)))
    }

    pub fn connect_with(self: &Arc<Self>, config: ConnectionConfig) -> Result<Connection> {
        Connection::with_transport(Box::new(MemoryTransport::new(Arc::clone(self))), config)
    }
}

// ============================================================================
// In-process transport
// ============================================================================

/// Transport that hands frames straight to a [`MemoryGraph`]. Responses are
/// produced during `send` and queued for `recv`.
pub struct MemoryTransport {
    graph: Arc<MemoryGraph>,
    session: ServerSession,
    responses: VecDeque<Vec<u8>>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new(graph: Arc<MemoryGraph>) -> Self {
        let session = graph.open_session();
        Self { graph, session, responses: VecDeque::new(), closed: false }
    }

    pub fn session(&self) -> &ServerSession {
        &self.session
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: &[u8], _deadline: Instant) -> std::result::Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let response = self
            .graph
            .handle_frame(&mut self.session, frame)
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.responses.push_back(response);
        Ok(())
    }

    fn recv(&mut self, _deadline: Instant) -> std::result::Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        // Nothing queued means nothing will ever arrive
        self.responses.pop_front().ok_or(TransportError::TimedOut)
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.closed = true;
        self.responses.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_response, encode_request};

    fn hello(source: &str) -> Request {
        Request::Hello { protocol_version: PROTOCOL_VERSION, client_id: None, traversal_source: source.into() }
    }

    fn traverse_all() -> Request {
        Request::Traverse { plan: crate::process::GraphTraversalSource.v(()).count().build().unwrap() }
    }

    #[test]
    fn test_modern_graph_shape() {
        let graph = MemoryGraph::modern();
        assert_eq!(graph.vertex_count(), 6);
        assert_eq!(graph.edge_count(), 6);
        assert_eq!(graph.traversal_source(), "g");
        assert_eq!(graph.vertex(&ElementId::Int(4)).unwrap().property("name"), Some(&GraphValue::from("josh")));
    }

    #[test]
    fn test_add_edge_requires_endpoints() {
        let mut graph = MemoryGraph::new("g");
        graph.add_vertex(Vertex::new(1, "person"));
        let err = graph.add_edge(Edge::new(7, "knows", 1, 2)).unwrap_err();
        assert_eq!(err, EvalError::UnknownVertex(ElementId::Int(2)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_hello_binds_session() {
        let graph = MemoryGraph::modern();
        let mut session = graph.open_session();

        match graph.handle_request(&mut session, hello("g")) {
            Response::HelloOk { ok, protocol_version, features, .. } => {
                assert!(ok);
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert!(features.contains(&"traverse".to_string()));
            }
            other => panic!("Expected HelloOk, got {:?}", other),
        }
        assert!(session.is_bound());
    }

    #[test]
    fn test_hello_unknown_source() {
        let graph = MemoryGraph::modern();
        let mut session = graph.open_session();
        match graph.handle_request(&mut session, hello("h")) {
            Response::ErrorWithCode { code, .. } => assert_eq!(code, "UNKNOWN_TRAVERSAL_SOURCE"),
            other => panic!("Expected error, got {:?}", other),
        }
        assert!(!session.is_bound());
    }

    #[test]
    fn test_traverse_requires_hello() {
        let graph = MemoryGraph::modern();
        let mut session = graph.open_session();
        match graph.handle_request(&mut session, traverse_all()) {
            Response::ErrorWithCode { code, .. } => assert_eq!(code, "NO_SESSION"),
            other => panic!("Expected error, got {:?}", other),
        }

        graph.handle_request(&mut session, hello("g"));
        assert_eq!(
            graph.handle_request(&mut session, traverse_all()),
            Response::Results { results: vec![GraphValue::Int(6)] }
        );
    }

    #[test]
    fn test_handle_frame_echoes_request_id() {
        let graph = MemoryGraph::modern();
        let mut session = graph.open_session();
        let frame = encode_request(&RequestEnvelope { request_id: Some("17".into()), request: Request::Ping }).unwrap();

        let response = decode_response(&graph.handle_frame(&mut session, &frame).unwrap()).unwrap();
        assert_eq!(response.request_id.as_deref(), Some("17"));
        assert!(matches!(response.response, Response::Pong { pong: true, .. }));
    }

    #[test]
    fn test_handle_frame_invalid_request() {
        let graph = MemoryGraph::modern();
        let mut session = graph.open_session();
        let response = decode_response(&graph.handle_frame(&mut session, &[0xc1]).unwrap()).unwrap();
        assert_eq!(response.request_id, None);
        assert!(matches!(response.response, Response::Error { .. }));
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let graph = MemoryGraph::modern();
        assert_ne!(graph.open_session().id, graph.open_session().id);
    }

    #[test]
    fn test_memory_transport_after_close() {
        let mut transport = MemoryTransport::new(Arc::new(MemoryGraph::modern()));
        let deadline = Instant::now();
        assert!(matches!(transport.recv(deadline), Err(TransportError::TimedOut)));

        transport.close().unwrap();
        transport.close().unwrap();
        assert!(matches!(transport.send(b"x", deadline), Err(TransportError::Closed)));
    }
}
