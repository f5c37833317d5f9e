//! Execution context passed to handlers.
//!
//! Each invocation gets its own [`HandlerContext`] carrying the invocation
//! arguments, a request-scoped [`ApiCaller`], and an [`InvocationLogger`]
//! whose records are captured into the invocation report. The context is an
//! explicit value with named fields; nothing is smuggled through task-local
//! state.
//!
//! # Example
//!
//! ```ignore
//! async fn my_handler(ctx: HandlerContext) -> HandlerResult {
//!     ctx.logger().info("starting sync");
//!     let body = ctx.arg("body").unwrap_or_default().to_string();
//!     ctx.api().call_json("PUT", "/api/v1/catalog/custom-data", &body).await?;
//!     Ok(Some("synced".to_string()))
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::protocol::{CallRequest, CallResponse, LogRecord};
use crate::transport::SessionTransport;

/// Milliseconds since the Unix epoch, clamped to zero on clock trouble.
pub(crate) fn unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Request-scoped logger for handler code.
///
/// Every record is appended to the invocation report and forwarded to the
/// process-wide `tracing` subscriber tagged with the handler name.
#[derive(Clone)]
pub struct InvocationLogger {
    handler_name: Arc<str>,
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl InvocationLogger {
    /// Create a logger capturing into a fresh record buffer.
    pub(crate) fn new(handler_name: &str) -> Self {
        Self {
            handler_name: Arc::from(handler_name),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Log at debug level.
    pub fn debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(handler = %self.handler_name, "{message}");
        self.capture("DEBUG", message);
    }

    /// Log at info level.
    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(handler = %self.handler_name, "{message}");
        self.capture("INFO", message);
    }

    /// Log at warn level.
    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!(handler = %self.handler_name, "{message}");
        self.capture("WARN", message);
    }

    /// Log at error level.
    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(handler = %self.handler_name, "{message}");
        self.capture("ERROR", message);
    }

    fn capture(&self, level: &str, message: &str) {
        self.records
            .lock()
            .expect("log records lock poisoned")
            .push(LogRecord {
                level: level.to_string(),
                message: message.to_string(),
                timestamp_ms: unix_millis(),
            });
    }

    /// Snapshot the captured records. The handler may still be running past
    /// its timeout; records emitted after the snapshot are discarded with
    /// the rest of its late outcome.
    pub(crate) fn snapshot(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .expect("log records lock poisoned")
            .clone()
    }
}

/// Request-scoped pass-through API caller.
#[derive(Clone)]
pub struct ApiCaller {
    transport: Arc<dyn SessionTransport>,
}

impl ApiCaller {
    pub(crate) fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self { transport }
    }

    /// Issue a pass-through API call.
    pub async fn call(
        &self,
        method: &str,
        path: &str,
        body: &str,
        content_type: &str,
    ) -> Result<CallResponse> {
        self.transport
            .call(CallRequest {
                method: method.to_string(),
                path: path.to_string(),
                body: body.to_string(),
                content_type: content_type.to_string(),
            })
            .await
    }

    /// Issue a pass-through API call with a JSON body.
    pub async fn call_json(&self, method: &str, path: &str, body: &str) -> Result<CallResponse> {
        self.call(method, path, body, "application/json").await
    }
}

/// Context passed to a handler for one invocation.
#[derive(Clone)]
pub struct HandlerContext {
    args: HashMap<String, String>,
    logger: InvocationLogger,
    api: ApiCaller,
}

impl HandlerContext {
    pub(crate) fn new(
        args: HashMap<String, String>,
        logger: InvocationLogger,
        api: ApiCaller,
    ) -> Self {
        Self { args, logger, api }
    }

    /// All invocation arguments.
    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    /// One invocation argument by key.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(|s| s.as_str())
    }

    /// The request-scoped logger; records end up in the invocation report.
    pub fn logger(&self) -> &InvocationLogger {
        &self.logger
    }

    /// The request-scoped API caller.
    pub fn api(&self) -> &ApiCaller {
        &self.api
    }
}
