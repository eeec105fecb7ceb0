//! Connection - one logical session with a traversal server
//!
//! Lifecycle: `open` (transport + hello handshake) → any number of `submit`
//! / `ping` calls → `close`. `close` is idempotent and also runs on drop.
//!
//! `submit` takes `&mut self`, so a connection has at most one request in
//! flight. Use one connection per thread for concurrent traversals.
//!
//! No request is ever retried: a plan may mutate the graph, and replaying
//! it could apply the change twice. Retry policy belongs to the caller.

use std::time::{Duration, Instant};

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::process::TraversalPlan;
use crate::protocol::{
    decode_response, encode_request, next_request_id, Request, RequestEnvelope, Response, PROTOCOL_VERSION,
};
use crate::structure::GraphValue;
use crate::transport::{self, Transport, TransportError};

/// Submissions slower than this are logged at warn level
pub const SLOW_SUBMIT_THRESHOLD_MS: u64 = 100;

/// Stand-in deadline for timeouts too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant (e.g. for `Duration::MAX`)
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

// ============================================================================
// Submission state
// ============================================================================

/// Per-plan state machine: `Built -> Submitted -> Completed | Failed | TimedOut`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Built,
    Submitted,
    Completed,
    Failed,
    TimedOut,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Completed | SubmissionState::Failed | SubmissionState::TimedOut)
    }
}

/// Record of one submitted plan
#[derive(Debug, Clone)]
pub struct Submission {
    /// Assigned once the request is on the wire
    pub request_id: Option<u64>,
    pub state: SubmissionState,
    pub steps: usize,
    pub elapsed: Option<Duration>,
    started: Instant,
}

impl Submission {
    fn new(steps: usize) -> Self {
        Self {
            request_id: None,
            state: SubmissionState::Built,
            steps,
            elapsed: None,
            started: Instant::now(),
        }
    }

    fn submitted(&mut self, request_id: u64) {
        self.request_id = Some(request_id);
        self.state = SubmissionState::Submitted;
    }

    fn finish<T>(&mut self, outcome: &Result<T>) {
        self.state = match outcome {
            Ok(_) => SubmissionState::Completed,
            Err(ClientError::Timeout { .. }) => SubmissionState::TimedOut,
            Err(_) => SubmissionState::Failed,
        };
        self.elapsed = Some(self.started.elapsed());
    }
}

/// Results of one plan, still undecoded
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub request_id: u64,
    pub results: Vec<GraphValue>,
}

/// What the server told us in the handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub protocol_version: u32,
    pub server_version: String,
    pub features: Vec<String>,
}

// ============================================================================
// Connection
// ============================================================================

pub struct Connection {
    config: ConnectionConfig,
    /// `None` once closed
    transport: Option<Box<dyn Transport>>,
    server: ServerInfo,
    last_submission: Option<Submission>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.config.endpoint)
            .field("traversal_source", &self.config.traversal_source)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Connect to `uri` and bind the server-side traversal source
    pub fn open(uri: &str, traversal_source: &str) -> Result<Self> {
        Self::open_with(ConnectionConfig::new(uri).with_traversal_source(traversal_source))
    }

    pub fn open_with(config: ConnectionConfig) -> Result<Self> {
        let transport = transport::connect(&config)?;
        Self::with_transport(transport, config)
    }

    /// Run the handshake over an already established transport
    pub fn with_transport(transport: Box<dyn Transport>, config: ConnectionConfig) -> Result<Self> {
        let mut conn = Self {
            config,
            transport: Some(transport),
            server: ServerInfo::default(),
            last_submission: None,
        };

        if let Err(e) = conn.handshake() {
            conn.close();
            return Err(match e {
                err @ ClientError::Connection { .. } => err,
                other => ClientError::Connection {
                    endpoint: conn.config.endpoint.clone(),
                    message: format!("handshake failed: {}", other),
                },
            });
        }

        tracing::debug!(
            "connected to {} (source '{}', server {}, protocol v{})",
            conn.config.endpoint,
            conn.config.traversal_source,
            conn.server.server_version,
            conn.server.protocol_version
        );
        Ok(conn)
    }

    fn handshake(&mut self) -> Result<()> {
        let request = Request::Hello {
            protocol_version: PROTOCOL_VERSION,
            client_id: self.config.client_id.clone(),
            traversal_source: self.config.traversal_source.clone(),
        };
        let timeout = self.config.connect_timeout;
        let (id, deadline) = self.send_request(request, timeout)?;

        match self.await_response(id, deadline, timeout)?.into_result()? {
            Response::HelloOk { ok: true, protocol_version, server_version, features } => {
                if protocol_version == 0 || protocol_version > PROTOCOL_VERSION {
                    return Err(ClientError::Protocol(format!(
                        "server negotiated unsupported protocol version {}",
                        protocol_version
                    )));
                }
                self.server = ServerInfo { protocol_version, server_version, features };
                Ok(())
            }
            Response::HelloOk { ok: false, .. } => Err(ClientError::Protocol("server refused hello".to_string())),
            other => Err(ClientError::Protocol(format!("unexpected {} response to hello", other.kind()))),
        }
    }

    // === REQUESTS ===

    /// Send `plan` and block until its results arrive, the server reports
    /// an error, or `request_timeout` elapses.
    pub fn submit(&mut self, plan: &TraversalPlan) -> Result<RawResponse> {
        let mut submission = Submission::new(plan.len());
        let outcome = self.submit_tracked(plan, &mut submission);
        submission.finish(&outcome);

        let elapsed_ms = submission.elapsed.map(|d| d.as_millis() as u64).unwrap_or(0);
        if elapsed_ms >= SLOW_SUBMIT_THRESHOLD_MS {
            tracing::warn!("[SLOW] traverse with {} steps: {}ms ({:?})", plan.len(), elapsed_ms, submission.state);
        }
        if let Err(e) = &outcome {
            tracing::debug!("traverse failed: {}", e);
        }

        self.last_submission = Some(submission);
        outcome
    }

    fn submit_tracked(&mut self, plan: &TraversalPlan, submission: &mut Submission) -> Result<RawResponse> {
        let timeout = self.config.request_timeout;
        let (id, deadline) = self.send_request(Request::Traverse { plan: plan.clone() }, timeout)?;
        submission.submitted(id);

        match self.await_response(id, deadline, timeout)?.into_result()? {
            Response::Results { results } => Ok(RawResponse { request_id: id, results }),
            other => Err(ClientError::Protocol(format!("unexpected {} response to traverse", other.kind()))),
        }
    }

    /// Keep-alive round-trip
    pub fn ping(&mut self) -> Result<()> {
        let timeout = self.config.request_timeout;
        let (id, deadline) = self.send_request(Request::Ping, timeout)?;
        match self.await_response(id, deadline, timeout)?.into_result()? {
            Response::Pong { pong: true, .. } => Ok(()),
            other => Err(ClientError::Protocol(format!("unexpected {} response to ping", other.kind()))),
        }
    }

    fn send_request(&mut self, request: Request, timeout: Duration) -> Result<(u64, Instant)> {
        let transport = self.transport.as_mut().ok_or(ClientError::ConnectionClosed)?;
        let id = next_request_id();
        let deadline = deadline_after(timeout);

        tracing::debug!("sending {} request {}", request.name(), id);
        let frame = encode_request(&RequestEnvelope { request_id: Some(id.to_string()), request })?;
        transport
            .send(&frame, deadline)
            .map_err(|e| map_transport_error(e, id, timeout))?;
        Ok((id, deadline))
    }

    /// Read frames until the response for `id` shows up. Responses to
    /// earlier, abandoned requests are dropped.
    fn await_response(&mut self, id: u64, deadline: Instant, timeout: Duration) -> Result<Response> {
        let transport = self.transport.as_mut().ok_or(ClientError::ConnectionClosed)?;
        loop {
            let bytes = transport.recv(deadline).map_err(|e| map_transport_error(e, id, timeout))?;
            let envelope = decode_response(&bytes)?;
            if envelope.answers(id) {
                return Ok(envelope.response);
            }
            tracing::warn!(
                "skipping stale response {:?} while waiting for request {}",
                envelope.request_id,
                id
            );
        }
    }

    // === LIFECYCLE ===

    /// Release the transport. Safe to call any number of times; later
    /// requests fail with `ConnectionClosed`.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            match transport.close() {
                Ok(()) => tracing::debug!("closed connection to {}", self.config.endpoint),
                Err(e) => tracing::warn!("error while closing {}: {}", self.config.endpoint, e),
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    // === ACCESSORS ===

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn traversal_source(&self) -> &str {
        &self.config.traversal_source
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    pub fn server_version(&self) -> &str {
        &self.server.server_version
    }

    pub fn features(&self) -> &[String] {
        &self.server.features
    }

    /// State of the most recently submitted plan
    pub fn last_submission(&self) -> Option<&Submission> {
        self.last_submission.as_ref()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn map_transport_error(e: TransportError, request_id: u64, timeout: Duration) -> ClientError {
    match e {
        TransportError::TimedOut => ClientError::Timeout { request_id, timeout },
        TransportError::Closed => ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed the connection",
        )),
        TransportError::Io(io) => ClientError::Io(io),
        TransportError::Protocol(message) => ClientError::Protocol(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::process::GraphTraversalSource;
    use crate::protocol::{decode_request, encode_response, ResponseEnvelope};
    use crate::structure::Vertex;

    /// What the scripted server does in reply to one request
    enum Reply {
        Answer(Response),
        /// Response carrying some other request's id
        Foreign(Response),
        Garbage,
    }

    #[derive(Default)]
    struct Log {
        requests: Vec<Request>,
        closes: usize,
    }

    struct Scripted {
        script: VecDeque<Vec<Reply>>,
        pending: VecDeque<Vec<u8>>,
        log: Arc<Mutex<Log>>,
    }

    impl Transport for Scripted {
        fn send(&mut self, frame: &[u8], _deadline: Instant) -> std::result::Result<(), TransportError> {
            let envelope = decode_request(frame).unwrap();
            self.log.lock().unwrap().requests.push(envelope.request.clone());

            for reply in self.script.pop_front().unwrap_or_default() {
                let bytes = match reply {
                    Reply::Answer(response) => encode_response(&ResponseEnvelope {
                        request_id: envelope.request_id.clone(),
                        response,
                    })
                    .unwrap(),
                    Reply::Foreign(response) => encode_response(&ResponseEnvelope {
                        request_id: Some("0".into()),
                        response,
                    })
                    .unwrap(),
                    Reply::Garbage => vec![0xc1],
                };
                self.pending.push_back(bytes);
            }
            Ok(())
        }

        fn recv(&mut self, _deadline: Instant) -> std::result::Result<Vec<u8>, TransportError> {
            self.pending.pop_front().ok_or(TransportError::TimedOut)
        }

        fn close(&mut self) -> std::result::Result<(), TransportError> {
            self.log.lock().unwrap().closes += 1;
            Ok(())
        }
    }

    fn hello_ok() -> Reply {
        Reply::Answer(Response::HelloOk {
            ok: true,
            protocol_version: 1,
            server_version: "test-1.0".into(),
            features: vec!["traverse".into()],
        })
    }

    fn connect(script: Vec<Vec<Reply>>) -> (Result<Connection>, Arc<Mutex<Log>>) {
        let config = ConnectionConfig::new("ws://stub:8182/gremlin")
            .with_request_timeout(Duration::from_millis(20));
        connect_with(script, config)
    }

    fn connect_with(script: Vec<Vec<Reply>>, config: ConnectionConfig) -> (Result<Connection>, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let transport = Scripted {
            script: script.into(),
            pending: VecDeque::new(),
            log: Arc::clone(&log),
        };
        (Connection::with_transport(Box::new(transport), config), log)
    }

    fn plan() -> TraversalPlan {
        GraphTraversalSource.v(()).build().unwrap()
    }

    #[test]
    fn test_handshake_binds_traversal_source() {
        let (conn, log) = connect(vec![vec![hello_ok()]]);
        let conn = conn.unwrap();

        assert_eq!(conn.server_version(), "test-1.0");
        assert_eq!(conn.features(), &["traverse".to_string()]);
        assert_eq!(conn.server_info().protocol_version, 1);
        match &log.lock().unwrap().requests[0] {
            Request::Hello { traversal_source, protocol_version, .. } => {
                assert_eq!(traversal_source, "g");
                assert_eq!(*protocol_version, PROTOCOL_VERSION);
            }
            other => panic!("expected hello, got {:?}", other),
        };
    }

    #[test]
    fn test_handshake_refused_is_connection_error() {
        let refusal = Reply::Answer(Response::ErrorWithCode {
            error: "unknown traversal source 'h'".into(),
            code: "UNKNOWN_TRAVERSAL_SOURCE".into(),
        });
        let (conn, log) = connect(vec![vec![refusal]]);
        let err = conn.unwrap_err();
        assert_eq!(err.code(), "CONNECTION");
        assert!(err.to_string().contains("unknown traversal source"));
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_handshake_without_answer_is_connection_error() {
        let (conn, _log) = connect(vec![vec![]]);
        assert_eq!(conn.unwrap_err().code(), "CONNECTION");
    }

    #[test]
    fn test_handshake_rejects_newer_protocol() {
        let reply = Reply::Answer(Response::HelloOk {
            ok: true,
            protocol_version: PROTOCOL_VERSION + 1,
            server_version: "future".into(),
            features: vec![],
        });
        let (conn, _log) = connect(vec![vec![reply]]);
        assert_eq!(conn.unwrap_err().code(), "CONNECTION");
    }

    #[test]
    fn test_submit_returns_results() {
        let results = vec![GraphValue::Vertex(Vertex::new(1, "person"))];
        let (conn, log) = connect(vec![
            vec![hello_ok()],
            vec![Reply::Answer(Response::Results { results: results.clone() })],
        ]);
        let mut conn = conn.unwrap();

        let raw = conn.submit(&plan()).unwrap();
        assert_eq!(raw.results, results);

        let submission = conn.last_submission().unwrap();
        assert_eq!(submission.state, SubmissionState::Completed);
        assert_eq!(submission.request_id, Some(raw.request_id));
        assert!(matches!(log.lock().unwrap().requests[1], Request::Traverse { .. }));
    }

    #[test]
    fn test_unbounded_timeout_waits_instead_of_overflowing() {
        let config = ConnectionConfig::new("ws://stub:8182/gremlin")
            .with_connect_timeout(Duration::MAX)
            .with_request_timeout(Duration::MAX);
        let (conn, _log) = connect_with(
            vec![
                vec![hello_ok()],
                vec![Reply::Answer(Response::Results { results: vec![GraphValue::Int(6)] })],
                vec![Reply::Answer(Response::Pong { pong: true, version: "test-1.0".into() })],
            ],
            config,
        );
        let mut conn = conn.unwrap();

        assert_eq!(conn.submit(&plan()).unwrap().results, vec![GraphValue::Int(6)]);
        conn.ping().unwrap();
    }

    #[test]
    fn test_deadline_saturates() {
        let before = Instant::now();
        assert!(deadline_after(Duration::MAX) >= before + FAR_FUTURE);
        let short = deadline_after(Duration::from_millis(10));
        assert!(short >= before + Duration::from_millis(10));
        assert!(short < before + Duration::from_secs(10));
    }

    #[test]
    fn test_stale_responses_are_skipped() {
        let (conn, _log) = connect(vec![
            vec![hello_ok()],
            vec![
                Reply::Foreign(Response::Results { results: vec![GraphValue::Int(99)] }),
                Reply::Answer(Response::Results { results: vec![GraphValue::Int(6)] }),
            ],
        ]);
        let mut conn = conn.unwrap();
        assert_eq!(conn.submit(&plan()).unwrap().results, vec![GraphValue::Int(6)]);
    }

    #[test]
    fn test_remote_error_is_reported() {
        let (conn, _log) = connect(vec![
            vec![hello_ok()],
            vec![Reply::Answer(Response::ErrorWithCode {
                error: "The property does not exist: v[3]:age".into(),
                code: "EVALUATION_FAILED".into(),
            })],
        ]);
        let mut conn = conn.unwrap();

        match conn.submit(&plan()).unwrap_err() {
            ClientError::RemoteExecution { message, code } => {
                assert!(message.contains("v[3]"));
                assert_eq!(code, "EVALUATION_FAILED");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(conn.last_submission().unwrap().state, SubmissionState::Failed);
    }

    #[test]
    fn test_undecodable_response_is_protocol_error() {
        let (conn, _log) = connect(vec![vec![hello_ok()], vec![Reply::Garbage]]);
        let mut conn = conn.unwrap();
        assert_eq!(conn.submit(&plan()).unwrap_err().code(), "PROTOCOL");
    }

    #[test]
    fn test_timeout_then_close() {
        let (conn, log) = connect(vec![vec![hello_ok()], vec![]]);
        let mut conn = conn.unwrap();

        let err = conn.submit(&plan()).unwrap_err();
        assert!(matches!(err, ClientError::Timeout { timeout, .. } if timeout == Duration::from_millis(20)));
        assert_eq!(conn.last_submission().unwrap().state, SubmissionState::TimedOut);

        conn.close();
        assert!(conn.is_closed());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_submit() {
        let (conn, log) = connect(vec![vec![hello_ok()]]);
        let mut conn = conn.unwrap();

        conn.close();
        conn.close();
        assert!(matches!(conn.submit(&plan()), Err(ClientError::ConnectionClosed)));
        assert!(matches!(conn.ping(), Err(ClientError::ConnectionClosed)));
        assert_eq!(conn.last_submission().unwrap().state, SubmissionState::Failed);
        assert_eq!(conn.last_submission().unwrap().request_id, None);

        drop(conn);
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_ping() {
        let (conn, _log) = connect(vec![
            vec![hello_ok()],
            vec![Reply::Answer(Response::Pong { pong: true, version: "test-1.0".into() })],
        ]);
        let mut conn = conn.unwrap();
        conn.ping().unwrap();
    }

    #[test]
    fn test_unexpected_response_kind() {
        let (conn, _log) = connect(vec![
            vec![hello_ok()],
            vec![Reply::Answer(Response::Pong { pong: true, version: "x".into() })],
        ]);
        let mut conn = conn.unwrap();
        let err = conn.submit(&plan()).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ref m) if m.contains("pong")));
    }
}
