//! Error types for dispatch-agent.

use thiserror::Error;

/// Main error type for all agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A handler with the same name is already declared locally.
    #[error("handler {0} already registered")]
    DuplicateHandler(String),

    /// No connection to the dispatch server could be established.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The server rejected a registration or re-registration call.
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// Non-benign failure while receiving from the dispatch stream.
    #[error("dispatch stream error: {0}")]
    StreamError(String),

    /// An invocation referenced a handler identifier that is not registered.
    #[error("handler not found for id: {0}")]
    HandlerNotFound(String),

    /// The server returned an error for a unary call.
    #[error("remote error: {0}")]
    Remote(String),

    /// The ambient cancellation signal ended the run loop.
    #[error("agent cancelled")]
    Cancelled,

    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Protocol violation (bad frame kind, oversized payload, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using AgentError.
pub type Result<T> = std::result::Result<T, AgentError>;
