//! Wire protocol
//!
//! Every message is a MessagePack map (`rmp_serde::to_vec_named`).
//!
//! Request:  `{ requestId, cmd, ...command fields }`
//! Response: `{ requestId, ...response fields }`
//!
//! The session starts with `hello`, which negotiates the protocol version
//! and binds the traversal source. After that the client sends `traverse`
//! (one plan per request) and `ping` (keep-alive).
//!
//! Responses are untagged; the field set identifies the variant. Servers
//! that cannot parse a request answer with `requestId` absent.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::process::TraversalPlan;
use crate::structure::GraphValue;

/// Protocol version spoken by this client
pub const PROTOCOL_VERSION: u32 = 1;

// Process-wide request id counter
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

// ============================================================================
// Wire Protocol Types
// ============================================================================

/// Request from client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Request {
    /// Negotiate protocol version and bind the traversal source
    Hello {
        #[serde(rename = "protocolVersion")]
        protocol_version: u32,
        #[serde(rename = "clientId")]
        client_id: Option<String>,
        #[serde(rename = "traversalSource")]
        traversal_source: String,
    },

    /// Keep-alive
    Ping,

    /// Evaluate one plan
    Traverse { plan: TraversalPlan },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::Ping => "ping",
            Request::Traverse { .. } => "traverse",
        }
    }
}

/// Response to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    HelloOk {
        ok: bool,
        #[serde(rename = "protocolVersion")]
        protocol_version: u32,
        #[serde(rename = "serverVersion")]
        server_version: String,
        features: Vec<String>,
    },

    Pong { pong: bool, version: String },

    Results { results: Vec<GraphValue> },

    /// Structured error with code (for programmatic handling)
    ErrorWithCode { error: String, code: String },

    Error { error: String },
}

impl Response {
    /// Turn server-reported failures into `RemoteExecution` errors
    pub fn into_result(self) -> Result<Response> {
        match self {
            Response::ErrorWithCode { error, code } => Err(ClientError::RemoteExecution { message: error, code }),
            Response::Error { error } => Err(ClientError::RemoteExecution {
                message: error,
                code: "INTERNAL_ERROR".to_string(),
            }),
            other => Ok(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Response::HelloOk { .. } => "helloOk",
            Response::Pong { .. } => "pong",
            Response::Results { .. } => "results",
            Response::ErrorWithCode { .. } | Response::Error { .. } => "error",
        }
    }
}

/// Request envelope: carries the requestId alongside the tagged Request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub request: Request,
}

/// Response envelope: wraps Response with the echoed requestId
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    /// Whether this response answers request `id`. Responses without an id
    /// are the server's reply to a request it could not parse, which can
    /// only be the one in flight.
    pub fn answers(&self, id: u64) -> bool {
        match &self.request_id {
            Some(rid) => rid.parse::<u64>().map(|r| r == id).unwrap_or(false),
            None => true,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

pub fn encode_request(envelope: &RequestEnvelope) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(envelope)?)
}

pub fn decode_request(bytes: &[u8]) -> Result<RequestEnvelope> {
    rmp_serde::from_slice(bytes).map_err(|e| ClientError::Protocol(format!("invalid request: {}", e)))
}

pub fn encode_response(envelope: &ResponseEnvelope) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(envelope)?)
}

pub fn decode_response(bytes: &[u8]) -> Result<ResponseEnvelope> {
    rmp_serde::from_slice(bytes).map_err(|e| ClientError::Protocol(format!("undecodable response: {}", e)))
}
