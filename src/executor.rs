//! Invocation executor - runs one handler invocation to an outcome report.
//!
//! Each invocation is executed on its own spawned task so a panicking
//! handler unwinds into a `JoinError` instead of taking down the dispatch
//! loop or sibling invocations. Timeouts are fire-and-forget: when the
//! deadline fires the executor reports a timeout immediately and detaches
//! the still-running future, whose eventual outcome is discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::context::{unix_millis, ApiCaller, HandlerContext, InvocationLogger};
use crate::error::AgentError;
use crate::protocol::{Invocation, InvocationReport, Outcome};
use crate::registry::{HandlerRegistry, HandlerResult};
use crate::transport::SessionTransport;

/// Error code for timeouts and ambient cancellation.
const CODE_TIMEOUT: &str = "timeout";
/// Error code for handler errors, panics, and unresolvable invocations.
const CODE_UNEXPECTED: &str = "unexpected";

/// Executes invocations against the registry and reports their outcomes.
///
/// Cheap to clone; one executor is shared by all invocation tasks of a run.
#[derive(Clone)]
pub(crate) struct InvocationExecutor {
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn SessionTransport>,
    cancel: CancellationToken,
}

impl InvocationExecutor {
    pub(crate) fn new(
        registry: Arc<HandlerRegistry>,
        transport: Arc<dyn SessionTransport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            transport,
            cancel,
        }
    }

    /// Execute one invocation and report its outcome.
    ///
    /// Never returns an error: handler errors, panics, and timeouts are
    /// folded into the report, an unknown handler id drops the invocation,
    /// and a failed report send is logged so one flaky connection cannot
    /// poison the dispatch loop.
    pub(crate) async fn execute(&self, invocation: Invocation) {
        debug!(
            handler = %invocation.handler_name,
            id = %invocation.handler_id,
            reason = %invocation.reason,
            "executing invocation"
        );

        // A report cannot be attributed to an unknown handler; drop the
        // invocation.
        let Some(info) = self.registry.resolve(&invocation.handler_id) else {
            let err = AgentError::HandlerNotFound(invocation.handler_id.clone());
            warn!(handler = %invocation.handler_name, error = %err, "dropping invocation");
            return;
        };

        let started_at_ms = unix_millis();
        let started = Instant::now();
        let logger = InvocationLogger::new(&invocation.handler_name);

        let ctx = HandlerContext::new(
            invocation.args.clone(),
            logger.clone(),
            ApiCaller::new(self.transport.clone()),
        );
        let timeout = effective_timeout(&invocation, info.timeout());
        let task = tokio::spawn(info.handler().call(ctx));
        let outcome = self.race(task, timeout).await;

        match &outcome {
            Outcome::Error { code, message } => {
                error!(
                    handler = %invocation.handler_name,
                    code = %code,
                    message = %message,
                    "invocation failed"
                );
            }
            _ => debug!(handler = %invocation.handler_name, "invocation completed"),
        }

        let report = InvocationReport {
            invocation,
            started_at_ms,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
            logs: logger.snapshot(),
        };

        if let Err(err) = self.transport.report_invocation(report).await {
            error!(error = %err, "failed to report invocation outcome");
        }
    }

    /// Race the handler task against its deadline and the ambient
    /// cancellation. Losing the race detaches the task.
    async fn race(
        &self,
        mut task: JoinHandle<HandlerResult>,
        timeout: Option<Duration>,
    ) -> Outcome {
        // Biased so a handler that already finished wins over a deadline
        // firing in the same tick.
        let timed_out = match timeout {
            Some(limit) => tokio::select! {
                biased;
                joined = &mut task => return join_outcome(joined),
                _ = tokio::time::sleep(limit) => true,
                _ = self.cancel.cancelled() => true,
            },
            None => tokio::select! {
                biased;
                joined = &mut task => return join_outcome(joined),
                _ = self.cancel.cancelled() => true,
            },
        };
        debug_assert!(timed_out);

        Outcome::Error {
            code: CODE_TIMEOUT.to_string(),
            message: String::new(),
        }
    }
}

/// Effective deadline: the invocation's own timeout wins over the
/// registration default; zero or absent means no deadline.
fn effective_timeout(invocation: &Invocation, registered: Duration) -> Option<Duration> {
    let millis = invocation
        .timeout_ms
        .filter(|&ms| ms > 0)
        .unwrap_or(registered.as_millis() as u64);
    (millis > 0).then(|| Duration::from_millis(millis))
}

/// Fold a joined handler task into an outcome, recovering panics.
fn join_outcome(joined: std::result::Result<HandlerResult, tokio::task::JoinError>) -> Outcome {
    match joined {
        Ok(Ok(Some(value))) => Outcome::Value(value),
        Ok(Ok(None)) => Outcome::Nothing,
        Ok(Err(err)) => Outcome::Error {
            code: CODE_UNEXPECTED.to_string(),
            message: err.to_string(),
        },
        Err(join_err) => Outcome::Error {
            code: CODE_UNEXPECTED.to_string(),
            message: panic_message(join_err),
        },
    }
}

/// Best-effort extraction of the panic payload.
fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
