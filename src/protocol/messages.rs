//! RPC message types exchanged with the dispatch server.
//!
//! All types here cross the wire as MsgPack maps (see
//! [`PayloadCodec`](crate::codec::PayloadCodec)). The agent core treats
//! trigger options as opaque: the server decides when an interval fires or a
//! webhook matches, the client only transports the descriptors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A trigger descriptor attached to a handler registration.
///
/// Interpreted server-side; the values are duration strings, cron
/// expressions, or webhook ids as the variant requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOption {
    /// Run once, immediately after registration.
    RunNow,
    /// Run on a fixed interval (duration string, e.g. "1s").
    Interval(String),
    /// Run on a cron schedule.
    Cron(String),
    /// Run when the given webhook id receives a delivery.
    Webhook(String),
    /// Run only when explicitly invoked.
    OnDemand,
}

/// Register a handler with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterHandlerRequest {
    /// Session identity correlating this client across reconnects.
    pub session_id: String,
    /// Caller-supplied stable handler name.
    pub name: String,
    /// Per-invocation timeout in milliseconds; zero inherits the ambient
    /// cancellation only.
    pub timeout_ms: u64,
    /// Trigger descriptors, in declaration order.
    pub options: Vec<TriggerOption>,
}

/// Response to [`RegisterHandlerRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterHandlerResponse {
    /// Server-assigned handler identifier.
    pub id: String,
}

/// Unregister a handler by its server-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterHandlerRequest {
    /// Server-assigned handler identifier.
    pub id: String,
}

/// Empty acknowledgment body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {}

/// Initiating message for the dispatch session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenDispatchRequest {
    /// Session identity for this client instance.
    pub session_id: String,
    /// Client version tag.
    pub version: String,
}

/// One server-initiated request to execute a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Server-assigned handler identifier.
    pub handler_id: String,
    /// Human-readable handler name, for diagnostics only.
    pub handler_name: String,
    /// Why the server dispatched this invocation (trigger description).
    pub reason: String,
    /// Optional timeout in milliseconds; absent or zero inherits the ambient
    /// cancellation only.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Free-form string arguments (e.g. webhook body and content type).
    #[serde(default)]
    pub args: HashMap<String, String>,
}

/// A message pushed by the server over the dispatch stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMessage {
    /// Execute a handler.
    Invoke(Invocation),
    /// No more work for this session; the client should shut down.
    WorkCompleted,
}

/// One captured log record emitted during a handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Level name in capitals ("DEBUG", "INFO", "WARN", "ERROR").
    pub level: String,
    /// Log message.
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// The outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The handler returned a value (stringified).
    Value(String),
    /// The handler failed, timed out, or crashed.
    Error {
        /// Machine-readable code ("unexpected" or "timeout").
        code: String,
        /// Human-readable detail; empty for timeouts.
        message: String,
    },
    /// The handler completed without producing a value.
    Nothing,
}

impl Outcome {
    /// Whether this outcome is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }

    /// Error code, if this outcome is an error.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Outcome::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Report the outcome of one invocation back to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationReport {
    /// Echo of the invocation this report answers.
    pub invocation: Invocation,
    /// Wall-clock start, milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    /// Wall-clock duration from invocation start to completion or timeout.
    pub duration_ms: u64,
    /// What the handler produced.
    pub outcome: Outcome,
    /// Log records captured during execution, in emission order.
    pub logs: Vec<LogRecord>,
}

/// Pass-through API call, executed server-side on the client's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Request body.
    pub body: String,
    /// Body content type.
    pub content_type: String,
}

/// Response to [`CallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadCodec;

    #[test]
    fn test_dispatch_message_roundtrip() {
        let invoke = DispatchMessage::Invoke(Invocation {
            handler_id: "h-1".to_string(),
            handler_name: "func1".to_string(),
            reason: "interval".to_string(),
            timeout_ms: Some(250),
            args: HashMap::from([("key".to_string(), "value".to_string())]),
        });

        let bytes = PayloadCodec::encode(&invoke).unwrap();
        let back: DispatchMessage = PayloadCodec::decode(&bytes).unwrap();
        assert_eq!(back, invoke);

        let done = DispatchMessage::WorkCompleted;
        let bytes = PayloadCodec::encode(&done).unwrap();
        let back: DispatchMessage = PayloadCodec::decode(&bytes).unwrap();
        assert_eq!(back, done);
    }

    #[test]
    fn test_invocation_optional_fields_default() {
        // A minimal invocation without timeout or args must still decode.
        let minimal = Invocation {
            handler_id: "h-2".to_string(),
            handler_name: "func2".to_string(),
            reason: "on_demand".to_string(),
            timeout_ms: None,
            args: HashMap::new(),
        };
        let bytes = PayloadCodec::encode(&minimal).unwrap();
        let back: Invocation = PayloadCodec::decode(&bytes).unwrap();
        assert_eq!(back.timeout_ms, None);
        assert!(back.args.is_empty());
    }

    #[test]
    fn test_outcome_accessors() {
        let timeout = Outcome::Error {
            code: "timeout".to_string(),
            message: String::new(),
        };
        assert!(timeout.is_error());
        assert_eq!(timeout.error_code(), Some("timeout"));

        assert!(!Outcome::Nothing.is_error());
        assert_eq!(Outcome::Value("hello".to_string()).error_code(), None);
    }

    #[test]
    fn test_trigger_option_roundtrip() {
        let options = vec![
            TriggerOption::RunNow,
            TriggerOption::Interval("1s".to_string()),
            TriggerOption::Cron("0 * * * *".to_string()),
            TriggerOption::Webhook("wh-7".to_string()),
            TriggerOption::OnDemand,
        ];
        let bytes = PayloadCodec::encode(&options).unwrap();
        let back: Vec<TriggerOption> = PayloadCodec::decode(&bytes).unwrap();
        assert_eq!(back, options);
    }
}
