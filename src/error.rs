//! Engine error taxonomy and its JSON-RPC mapping.
//!
//! Kinds are distinguished by how they propagate: request-shaped
//! errors (`InvalidRequest`, `NotFound`, `InvalidState`) surface with
//! no side effects; `Model` and `Persistence` failures drive the task
//! to `failed`; `Tool` errors go back to the model as tool results;
//! `Canceled` is an outcome, not a fault.

use crate::types::JsonRpcError;

// ---------------------------------------------------------------------------
// Standard JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// A2A-specific error codes
// ---------------------------------------------------------------------------

/// The requested task was not found.
pub const TASK_NOT_FOUND: i64 = -32001;

/// The task is in a state that forbids the requested transition.
pub const TASK_INVALID_STATE: i64 = -32002;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Unified error type for all engine operations. Protocol-facing
/// variants carry a message and an optional structured `data` payload
/// that rides into the JSON-RPC error object.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Invalid JSON payload (code -32700).
    #[error("Parse error: {message}")]
    ParseError {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Client payload rejected pre-dispatch (code -32600).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Method not found (code -32601).
    #[error("Method not found: {message}")]
    MethodNotFound {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Task id unknown (code -32001).
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Illegal state transition, e.g. canceling a terminal task
    /// (code -32002).
    #[error("Invalid state: {message}")]
    InvalidState {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The model provider returned an error or closed the stream
    /// abnormally. Drives the task to `failed`.
    #[error("Model error: {message}")]
    Model {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A tool invocation raised. Handed back to the model as the
    /// tool's result; never fatal by itself.
    #[error("Tool error: {message}")]
    Tool {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A store read or write failed. Drives the task to `failed`.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The abort signal fired. The task lands in `canceled`; callers
    /// of `send` receive a canceled outcome rather than a fault.
    #[error("Canceled: {message}")]
    Canceled { message: String },

    /// Catch-all internal error (code -32603).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        data: Option<serde_json::Value>,
    },
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

macro_rules! ctor {
    ($(#[$doc:meta])* $fn_name:ident => $variant:ident) => {
        $(#[$doc])*
        pub fn $fn_name(message: impl Into<String>) -> Self {
            Self::$variant { message: message.into(), data: None }
        }
    };
}

impl EngineError {
    // Message-only constructors (no structured data).
    ctor!(/// A `ParseError` without data.
        parse_error => ParseError);
    ctor!(/// An `InvalidRequest` without data.
        invalid_request => InvalidRequest);
    ctor!(/// A `MethodNotFound` without data.
        method_not_found => MethodNotFound);
    ctor!(/// A `NotFound` without data.
        not_found => NotFound);
    ctor!(/// An `InvalidState` without data.
        invalid_state => InvalidState);
    ctor!(/// A `Model` error without data.
        model => Model);
    ctor!(/// A `Tool` error without data.
        tool => Tool);
    ctor!(/// A `Persistence` error without data.
        persistence => Persistence);
    ctor!(/// An `Internal` error without data.
        internal => Internal);

    /// A `Canceled` outcome.
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::Canceled {
            message: message.into(),
        }
    }

    /// The JSON-RPC code this error maps to.
    pub fn code(&self) -> i64 {
        match self {
            EngineError::ParseError { .. } => PARSE_ERROR,
            EngineError::InvalidRequest { .. } => INVALID_REQUEST,
            EngineError::MethodNotFound { .. } => METHOD_NOT_FOUND,
            EngineError::NotFound { .. } => TASK_NOT_FOUND,
            EngineError::InvalidState { .. } => TASK_INVALID_STATE,
            EngineError::Model { .. }
            | EngineError::Tool { .. }
            | EngineError::Persistence { .. }
            | EngineError::Canceled { .. }
            | EngineError::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Short user-facing description.
    pub fn user_message(&self) -> &str {
        match self {
            EngineError::ParseError { .. } => "Invalid JSON payload",
            EngineError::InvalidRequest { .. } => "Request payload validation error",
            EngineError::MethodNotFound { .. } => "Method not found",
            EngineError::NotFound { .. } => "Task not found",
            EngineError::InvalidState { .. } => "Task is in a state that forbids this operation",
            EngineError::Model { .. } => "The model provider failed",
            EngineError::Tool { .. } => "A tool invocation failed",
            EngineError::Persistence { .. } => "Saving or loading data failed",
            EngineError::Canceled { .. } => "The task was canceled",
            EngineError::Internal { .. } => "Internal error",
        }
    }

    /// A hint for how the caller might recover, when one exists.
    pub fn recovery_action(&self) -> Option<&str> {
        match self {
            EngineError::ParseError { .. } | EngineError::InvalidRequest { .. } => {
                Some("Check the request payload and retry")
            }
            EngineError::NotFound { .. } => Some("Verify the task id"),
            EngineError::Model { .. } => Some("Retry the request"),
            EngineError::Persistence { .. } => Some("Check the database path and permissions"),
            _ => None,
        }
    }

    fn data(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::ParseError { data, .. }
            | EngineError::InvalidRequest { data, .. }
            | EngineError::MethodNotFound { data, .. }
            | EngineError::NotFound { data, .. }
            | EngineError::InvalidState { data, .. }
            | EngineError::Model { data, .. }
            | EngineError::Tool { data, .. }
            | EngineError::Persistence { data, .. }
            | EngineError::Internal { data, .. } => data.clone(),
            EngineError::Canceled { .. } => None,
        }
    }
}

impl From<EngineError> for JsonRpcError {
    fn from(err: EngineError) -> Self {
        JsonRpcError {
            code: err.code(),
            message: err.to_string(),
            data: err.data(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::parse_error(err.to_string())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::persistence(err.to_string())
    }
}
