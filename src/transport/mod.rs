//! Session transport - the connection to the dispatch server.
//!
//! [`SessionTransport`] is the seam between the agent core and the wire. The
//! core only consumes this contract; [`TcpTransport`] is the default
//! implementation, and tests substitute an in-memory fake.
//!
//! Connection acquisition is fallible and idempotent: every call may
//! (re)establish the underlying connection, and a dead connection is
//! discarded so the next call retries from scratch.

mod tcp;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};
use crate::protocol::{CallRequest, CallResponse, Invocation, InvocationReport,
    RegisterHandlerRequest};

pub use tcp::TcpTransport;

/// One event received from the dispatch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// The server requests execution of a handler.
    Invoke(Invocation),
    /// The server has no more work for this session.
    WorkCompleted,
    /// Idle heartbeat; nothing to do right now.
    Idle,
}

/// Receiving half of an open dispatch stream.
///
/// `recv` returning `Ok(None)` is the benign end of the stream (server went
/// away or closed the connection); an `Err` is a real stream failure.
pub struct DispatchStream {
    rx: mpsc::Receiver<Result<DispatchEvent>>,
}

impl DispatchStream {
    /// Capacity of the channel backing a dispatch stream.
    pub const CHANNEL_CAPACITY: usize = 64;

    /// Build a stream and the sending half used by transport implementations.
    pub fn channel() -> (mpsc::Sender<Result<DispatchEvent>>, Self) {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        (tx, Self { rx })
    }

    /// Receive the next dispatch event.
    ///
    /// # Errors
    ///
    /// Propagates a non-benign stream failure reported by the transport.
    pub async fn recv(&mut self) -> Result<Option<DispatchEvent>> {
        match self.rx.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

/// Remote call surface of the dispatch server.
///
/// Mirrors the server's RPC groups: the registration/report set, the
/// streaming dispatch RPC, and the pass-through API call used by handler
/// code.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Establish (or verify) the connection. Safe to call repeatedly.
    async fn ensure_connected(&self) -> Result<()>;

    /// Register a handler; returns the server-assigned identifier.
    async fn register_handler(&self, request: RegisterHandlerRequest) -> Result<String>;

    /// Unregister a handler by server-assigned identifier.
    async fn unregister_handler(&self, id: &str) -> Result<()>;

    /// Report the outcome of one invocation.
    async fn report_invocation(&self, report: InvocationReport) -> Result<()>;

    /// Open the dispatch stream, sending the initiating session message.
    async fn open_dispatch(&self, session_id: &str, version: &str) -> Result<DispatchStream>;

    /// Pass-through API call executed on the client's behalf.
    async fn call(&self, request: CallRequest) -> Result<CallResponse>;
}

/// Map a transport error into the registration taxonomy: connection problems
/// stay `TransportUnavailable`, anything else the server said becomes
/// `RegistrationFailed`.
pub(crate) fn registration_error(err: AgentError) -> AgentError {
    match err {
        AgentError::TransportUnavailable(_) | AgentError::Io(_) => err,
        AgentError::Remote(message) => AgentError::RegistrationFailed(message),
        other => AgentError::RegistrationFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_recv_event_then_benign_end() {
        let (tx, mut stream) = DispatchStream::channel();

        tx.send(Ok(DispatchEvent::Idle)).await.unwrap();
        drop(tx);

        assert_eq!(stream.recv().await.unwrap(), Some(DispatchEvent::Idle));
        assert_eq!(stream.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stream_recv_propagates_error() {
        let (tx, mut stream) = DispatchStream::channel();

        tx.send(Err(AgentError::StreamError("broken".to_string())))
            .await
            .unwrap();

        let err = stream.recv().await.unwrap_err();
        assert!(matches!(err, AgentError::StreamError(_)));
    }

    #[test]
    fn test_registration_error_mapping() {
        let unavailable =
            registration_error(AgentError::TransportUnavailable("refused".to_string()));
        assert!(matches!(unavailable, AgentError::TransportUnavailable(_)));

        let rejected = registration_error(AgentError::Remote("bad name".to_string()));
        match rejected {
            AgentError::RegistrationFailed(message) => assert_eq!(message, "bad name"),
            other => panic!("unexpected: {other}"),
        }
    }
}
