//! Error types for the MCP runtime.
//!
//! [`Error`] is the crate-wide error enum; [`TransportError`] covers wire
//! failures and [`TaskError`] the task-engine lifecycle. Every variant maps
//! onto a JSON-RPC error code via [`Error::error_code`] so protocol paths
//! can turn any failure into a well-formed error response.

use serde_json::Value;
use thiserror::Error;

use crate::types::jsonrpc::JsonRpcError;
use crate::types::tasks::TaskStatus;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// JSON-RPC error codes used on the wire.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Request received before the session finished initialization.
    pub const NOT_INITIALIZED: i32 = -32002;
}

/// Errors produced by concrete transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection is closed; in-flight operations must fail.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame could not be parsed or serialized.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// An outbound request could not be delivered.
    #[error("request failed: {0}")]
    Request(String),

    /// A message could not be handed to the peer loop.
    #[error("send failed: {0}")]
    Send(String),
}

/// Errors produced by the task engine.
///
/// "not found" and "expired" are deliberately distinct so a client can tell
/// whether retention lapsed or the task never existed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No task with the given id exists (and none ever did).
    #[error("task not found: {task_id}")]
    NotFound {
        /// The unknown task id.
        task_id: String,
    },

    /// The task existed but its retention window has lapsed.
    #[error("task has expired: {task_id}")]
    Expired {
        /// The reclaimed task id.
        task_id: String,
    },

    /// A state-machine transition was rejected.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        /// The task being transitioned.
        task_id: String,
        /// Its current status.
        from: TaskStatus,
        /// The rejected target status.
        to: TaskStatus,
    },

    /// The concurrency cap is reached; no new task may be created.
    #[error("too many running tasks (limit {limit})")]
    ResourceExhausted {
        /// The configured cap.
        limit: usize,
    },
}

impl TaskError {
    /// JSON-RPC code for this task failure.
    pub fn error_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::Expired { .. } | Self::InvalidTransition { .. } => {
                codes::INVALID_PARAMS
            },
            Self::ResourceExhausted { .. } => codes::INTERNAL_ERROR,
        }
    }
}

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed JSON on the wire.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structurally invalid request (lifecycle violations included).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameters did not validate.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// A request was issued before the session was initialized.
    #[error("not initialized")]
    NotInitialized,

    /// The operation was cancelled.
    #[error("task cancelled")]
    Cancelled,

    /// The request did not complete within its deadline.
    #[error("request timed out")]
    Timeout,

    /// HTTP 401 from the peer; callers may run a token-acquisition flow
    /// against their [`AuthProvider`](crate::shared::AuthProvider) and retry.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Detail from the `WWW-Authenticate` header or response body.
        message: String,
    },

    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Task-engine failure.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// An error response received from the peer, surfaced as-is.
    #[error("peer error {code}: {message}")]
    Peer {
        /// JSON-RPC error code from the peer.
        code: i32,
        /// Message from the peer.
        message: String,
        /// Optional structured detail.
        data: Option<Value>,
    },
}

impl Error {
    /// Build an internal error from anything displayable.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Build an invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Build an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Build a method-not-found error.
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::MethodNotFound(message.into())
    }

    /// Build a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// The JSON-RPC code this error maps to on the wire.
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::NotInitialized => codes::NOT_INITIALIZED,
            Self::Task(task) => task.error_code(),
            Self::Peer { code, .. } => *code,
            Self::Internal(_)
            | Self::Cancelled
            | Self::Timeout
            | Self::Unauthorized { .. }
            | Self::Transport(_) => codes::INTERNAL_ERROR,
        }
    }

    /// True if this error represents cancellation of the surrounding work.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert into the wire error object, dropping non-serializable detail.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        let data = match self {
            Self::Peer { data, .. } => data.clone(),
            _ => None,
        };
        JsonRpcError {
            code: self.error_code(),
            message: self.to_string(),
            data,
        }
    }
}

impl From<JsonRpcError> for Error {
    fn from(err: JsonRpcError) -> Self {
        Self::Peer {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
