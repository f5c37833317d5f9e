//! Handler registry - local handler declarations and their server-assigned
//! identifiers.
//!
//! The registry owns two views of the same handlers:
//! - the declaration list, in registration order, which survives reconnects
//!   and drives re-registration;
//! - the registered map, server-assigned id to handler, which invocation
//!   executors read to resolve incoming identifiers.
//!
//! The map is mutated only by the supervisory loop; executor tasks take the
//! read side of the lock concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::context::HandlerContext;
use crate::error::{AgentError, Result};
use crate::protocol::{RegisterHandlerRequest, TriggerOption};
use crate::transport::{registration_error, SessionTransport};

/// Boxed future returned by handler callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type handler callbacks may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one handler execution: an optional stringified value, or an
/// explicit error.
pub type HandlerResult = std::result::Result<Option<String>, HandlerError>;

/// A registered callback.
///
/// Implemented for any `Fn(HandlerContext) -> Future<Output = HandlerResult>`
/// closure, so plain async functions register directly.
pub trait Handler: Send + Sync + 'static {
    /// Execute the callback for one invocation.
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx))
    }
}

/// Options for one handler registration.
#[derive(Default, Clone)]
pub struct RegisterOptions {
    timeout: Duration,
    triggers: Vec<TriggerOption>,
}

impl RegisterOptions {
    /// Empty options: no timeout (ambient cancellation only), no triggers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-invocation timeout. Zero (the default) inherits the ambient
    /// cancellation only.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run once, immediately after registration.
    pub fn run_now(mut self) -> Self {
        self.triggers.push(TriggerOption::RunNow);
        self
    }

    /// Run on a fixed interval, e.g. `"1s"`.
    pub fn interval(mut self, duration: impl Into<String>) -> Self {
        self.triggers.push(TriggerOption::Interval(duration.into()));
        self
    }

    /// Run on a cron schedule.
    pub fn cron(mut self, expression: impl Into<String>) -> Self {
        self.triggers.push(TriggerOption::Cron(expression.into()));
        self
    }

    /// Run on deliveries to the given webhook id.
    pub fn webhook(mut self, id: impl Into<String>) -> Self {
        self.triggers.push(TriggerOption::Webhook(id.into()));
        self
    }

    /// Run only when explicitly invoked.
    pub fn on_demand(mut self) -> Self {
        self.triggers.push(TriggerOption::OnDemand);
        self
    }
}

/// Local record of one declared handler.
pub struct HandlerInfo {
    name: String,
    timeout: Duration,
    triggers: Vec<TriggerOption>,
    handler: Arc<dyn Handler>,
}

impl HandlerInfo {
    /// Caller-supplied stable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-invocation timeout; zero means ambient cancellation only.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The callback.
    pub(crate) fn handler(&self) -> Arc<dyn Handler> {
        self.handler.clone()
    }
}

/// Registry of declared handlers and their server-assigned identifiers.
pub struct HandlerRegistry {
    session_id: String,
    transport: Arc<dyn SessionTransport>,
    declared: RwLock<Vec<Arc<HandlerInfo>>>,
    registered: RwLock<HashMap<String, Arc<HandlerInfo>>>,
}

impl HandlerRegistry {
    /// Create an empty registry bound to a session and transport.
    pub fn new(session_id: String, transport: Arc<dyn SessionTransport>) -> Self {
        Self {
            session_id,
            transport,
            declared: RwLock::new(Vec::new()),
            registered: RwLock::new(HashMap::new()),
        }
    }

    /// Declare and register a handler. Returns the server-assigned id.
    ///
    /// # Errors
    ///
    /// `DuplicateHandler` if a handler of the same name is already declared;
    /// `TransportUnavailable` if no connection can be established;
    /// `RegistrationFailed` if the server rejects the registration. The
    /// declaration is kept on remote failure and retried by the next
    /// re-registration pass.
    pub async fn register<H: Handler>(
        &self,
        name: &str,
        options: RegisterOptions,
        handler: H,
    ) -> Result<String> {
        let info = {
            let mut declared = self.declared.write().expect("declared lock poisoned");
            if declared.iter().any(|h| h.name() == name) {
                return Err(AgentError::DuplicateHandler(name.to_string()));
            }
            let info = Arc::new(HandlerInfo {
                name: name.to_string(),
                timeout: options.timeout,
                triggers: options.triggers,
                handler: Arc::new(handler),
            });
            declared.push(info.clone());
            info
        };

        self.register_remote(&info).await
    }

    /// Send one registration request and record the assigned id.
    async fn register_remote(&self, info: &Arc<HandlerInfo>) -> Result<String> {
        let request = RegisterHandlerRequest {
            session_id: self.session_id.clone(),
            name: info.name.clone(),
            timeout_ms: info.timeout.as_millis() as u64,
            options: info.triggers.clone(),
        };

        let id = self
            .transport
            .register_handler(request)
            .await
            .map_err(registration_error)?;

        self.registered
            .write()
            .expect("registered lock poisoned")
            .insert(id.clone(), info.clone());
        Ok(id)
    }

    /// Unregister a handler by server-assigned id.
    ///
    /// The remote call is best-effort: the id is removed from the registered
    /// map whether or not the server acknowledged, so local state never
    /// leaks stale handlers. The remote error, if any, is returned for
    /// logging.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let result = self.transport.unregister_handler(id).await;
        if let Err(err) = &result {
            tracing::warn!(id, error = %err, "failed to unregister handler");
        }
        self.registered
            .write()
            .expect("registered lock poisoned")
            .remove(id);
        result
    }

    /// Re-register every declared handler after a suspected server restart.
    ///
    /// Any live ids sharing a handler's name are unregistered first, so old
    /// server-assigned identifiers are superseded. Aborts on the first
    /// registration failure.
    pub async fn reregister_all(&self) -> Result<()> {
        tracing::warn!("reregistering handlers");

        let declared: Vec<Arc<HandlerInfo>> = self
            .declared
            .read()
            .expect("declared lock poisoned")
            .clone();

        for info in declared {
            let stale: Vec<String> = {
                let registered = self.registered.read().expect("registered lock poisoned");
                registered
                    .iter()
                    .filter(|(_, h)| h.name() == info.name())
                    .map(|(id, _)| id.clone())
                    .collect()
            };
            for id in stale {
                let _ = self.unregister(&id).await;
            }

            if let Err(err) = self.register_remote(&info).await {
                tracing::error!(handler = info.name(), error = %err, "failed to reregister handler");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Resolve a server-assigned id to its handler. Read concurrently by
    /// executor tasks.
    pub fn resolve(&self, id: &str) -> Option<Arc<HandlerInfo>> {
        self.registered
            .read()
            .expect("registered lock poisoned")
            .get(id)
            .cloned()
    }

    /// Number of currently registered identifiers.
    pub fn registered_count(&self) -> usize {
        self.registered
            .read()
            .expect("registered lock poisoned")
            .len()
    }
}
