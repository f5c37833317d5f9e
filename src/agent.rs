//! Agent - public surface and the dispatch supervisor loop.
//!
//! An [`Agent`] owns one session: a stable session id, a transport, and the
//! handler registry. Callers register handlers, then drive [`Agent::run`],
//! which opens the dispatch stream and executes pushed invocations until the
//! server declares the work complete or the caller cancels.
//!
//! # Example
//!
//! ```ignore
//! let agent = Agent::new(AgentConfig::default());
//! agent.register("sync", RegisterOptions::new().interval("30s"), my_handler).await?;
//!
//! let cancel = CancellationToken::new();
//! agent.run(cancel).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::context::ApiCaller;
use crate::error::{AgentError, Result};
use crate::executor::InvocationExecutor;
use crate::registry::{Handler, HandlerRegistry, RegisterOptions};
use crate::transport::{DispatchEvent, SessionTransport, TcpTransport};

/// Pause after an idle heartbeat before polling the stream again.
const IDLE_PAUSE: Duration = Duration::from_millis(100);

/// How one dispatch session ended without error.
enum SessionEnd {
    /// The server sent its work-completed marker.
    WorkCompleted,
    /// [`Agent::shutdown`] was called.
    Shutdown,
    /// The stream ended benignly, as on a server restart. Reconnect and
    /// re-register immediately, no failure surfaced.
    StreamEnded,
}

/// A long-lived client of the dispatch server.
pub struct Agent {
    config: AgentConfig,
    session_id: String,
    transport: Arc<dyn SessionTransport>,
    registry: Arc<HandlerRegistry>,
    done: CancellationToken,
}

impl Agent {
    /// Create an agent speaking TCP to the configured server address.
    pub fn new(config: AgentConfig) -> Self {
        let transport = Arc::new(TcpTransport::new(&config.host, config.port));
        Self::with_transport(config, transport)
    }

    /// Create an agent over a caller-supplied transport.
    pub fn with_transport(config: AgentConfig, transport: Arc<dyn SessionTransport>) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let registry = Arc::new(HandlerRegistry::new(session_id.clone(), transport.clone()));
        Self {
            config,
            session_id,
            transport,
            registry,
            done: CancellationToken::new(),
        }
    }

    /// This agent's session identity, stable across reconnects.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The active configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Register a handler. Returns the server-assigned id.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register`].
    pub async fn register<H: Handler>(
        &self,
        name: &str,
        options: RegisterOptions,
        handler: H,
    ) -> Result<String> {
        self.registry.register(name, options, handler).await
    }

    /// Unregister a handler by server-assigned id.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        self.registry.unregister(id).await
    }

    /// Pass-through API caller bound to this agent's transport.
    pub fn api(&self) -> ApiCaller {
        ApiCaller::new(self.transport.clone())
    }

    /// Request a graceful stop of [`Agent::run`] from another task. In-flight
    /// invocations run to completion before `run` returns `Ok`.
    pub fn shutdown(&self) {
        self.done.cancel();
    }

    /// Drive the dispatch session until the server completes the work, the
    /// caller cancels, or an error is fatal under the configured policy.
    ///
    /// A benign end of stream (the server hung up or restarted) reconnects
    /// immediately, re-registering all declared handlers before the new
    /// stream opens. Real stream and connection failures are retried the
    /// same way after `sleep_on_error`; a zero `sleep_on_error` makes them
    /// fatal instead.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the caller's token fires; the first session error
    /// when retries are disabled.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(session_id = %self.session_id, version = %self.config.version, "agent starting");

        let ambient = CancellationToken::new();
        let executor = InvocationExecutor::new(
            self.registry.clone(),
            self.transport.clone(),
            ambient.clone(),
        );
        let mut tasks = JoinSet::new();
        let mut reregister = false;

        let result = loop {
            match self
                .session(reregister, &executor, &mut tasks, &cancel)
                .await
            {
                Ok(SessionEnd::WorkCompleted) => {
                    info!("server completed the work, shutting down");
                    break Ok(());
                }
                Ok(SessionEnd::Shutdown) => {
                    info!("shutdown requested");
                    break Ok(());
                }
                Ok(SessionEnd::StreamEnded) => {
                    info!("dispatch stream ended, reconnecting");
                    reregister = true;
                }
                Err(AgentError::Cancelled) => break Err(AgentError::Cancelled),
                Err(err) => {
                    if self.config.sleep_on_error.is_zero() {
                        error!(error = %err, "session failed, retries disabled");
                        break Err(err);
                    }
                    warn!(
                        error = %err,
                        retry_in = ?self.config.sleep_on_error,
                        "session failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.sleep_on_error) => {}
                        _ = cancel.cancelled() => break Err(AgentError::Cancelled),
                        _ = self.done.cancelled() => break Ok(()),
                    }
                    reregister = true;
                }
            }
        };

        // In-flight invocations run to completion and report their real
        // outcomes; only caller cancellation releases them early.
        if matches!(result, Err(AgentError::Cancelled)) {
            ambient.cancel();
        }
        while tasks.join_next().await.is_some() {}

        info!(session_id = %self.session_id, "agent stopped");
        result
    }

    /// One connect-and-consume pass over the dispatch stream.
    async fn session(
        &self,
        reregister: bool,
        executor: &InvocationExecutor,
        tasks: &mut JoinSet<()>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        self.transport.ensure_connected().await?;
        if reregister {
            self.registry.reregister_all().await?;
        }

        let mut stream = self
            .transport
            .open_dispatch(&self.session_id, &self.config.version)
            .await?;
        info!("dispatch stream open");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = self.done.cancelled() => return Ok(SessionEnd::Shutdown),
                // Reap finished invocation tasks as we go.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                event = stream.recv() => match event? {
                    Some(DispatchEvent::Invoke(invocation)) => {
                        let executor = executor.clone();
                        tasks.spawn(async move { executor.execute(invocation).await });
                    }
                    Some(DispatchEvent::WorkCompleted) => return Ok(SessionEnd::WorkCompleted),
                    Some(DispatchEvent::Idle) => tokio::select! {
                        _ = tokio::time::sleep(IDLE_PAUSE) => {}
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        _ = self.done.cancelled() => return Ok(SessionEnd::Shutdown),
                    },
                    None => return Ok(SessionEnd::StreamEnded),
                },
            }
        }
    }
}
