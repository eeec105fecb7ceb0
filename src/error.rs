//! Error types for the traversal client

use std::time::Duration;

use thiserror::Error;

use crate::process::ResultShape;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Malformed step sequence, rejected before any I/O
    #[error("Invalid traversal at step {step_index} ({step}): {message}")]
    PlanConstruction {
        step_index: usize,
        step: &'static str,
        message: String,
    },

    #[error("Cannot connect to {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Request {request_id} timed out after {timeout:?}")]
    Timeout { request_id: u64, timeout: Duration },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server failed to evaluate traversal [{code}]: {message}")]
    RemoteExecution { message: String, code: String },

    #[error("Result {index} does not match the requested shape: expected {expected} as {target}, got {actual}")]
    Decode {
        expected: ResultShape,
        /// Rust type the caller asked for
        target: &'static str,
        actual: String,
        index: usize,
    },

    #[error("Traversal returned no results")]
    EmptyResult,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

impl ClientError {
    /// Stable error code, usable for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::PlanConstruction { .. } => "PLAN_CONSTRUCTION",
            ClientError::Connection { .. } => "CONNECTION",
            ClientError::Timeout { .. } => "TIMEOUT",
            ClientError::Protocol(_) => "PROTOCOL",
            ClientError::RemoteExecution { .. } => "REMOTE_EXECUTION",
            ClientError::Decode { .. } => "DECODE",
            ClientError::EmptyResult => "EMPTY_RESULT",
            ClientError::ConnectionClosed => "CONNECTION_CLOSED",
            ClientError::Io(_) => "IO",
            ClientError::Encode(_) => "ENCODE",
        }
    }

    /// True for failures that happened before anything was sent
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::PlanConstruction { .. } | ClientError::ConnectionClosed | ClientError::Encode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_category() {
        let plan = ClientError::PlanConstruction {
            step_index: 2,
            step: "by",
            message: "no preceding order()".into(),
        };
        let remote = ClientError::RemoteExecution {
            message: "no such property".into(),
            code: "EVALUATION_FAILED".into(),
        };
        let timeout = ClientError::Timeout { request_id: 7, timeout: Duration::from_millis(50) };

        assert_eq!(plan.code(), "PLAN_CONSTRUCTION");
        assert_eq!(remote.code(), "REMOTE_EXECUTION");
        assert_eq!(timeout.code(), "TIMEOUT");
        assert!(plan.is_local());
        assert!(!remote.is_local());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = ClientError::Decode {
            expected: ResultShape::Count,
            target: "u64",
            actual: "vertex".into(),
            index: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("count"));
        assert!(msg.contains("u64"));
        assert!(msg.contains("vertex"));
        assert!(msg.contains('3'));

        let err = ClientError::PlanConstruction {
            step_index: 1,
            step: "times",
            message: "times() must follow repeat()".into(),
        };
        assert!(err.to_string().contains("step 1 (times)"));
    }
}
