//! # dispatch-agent
//!
//! Client library for long-lived agents of a dispatch server. An agent
//! registers named callback handlers together with their trigger
//! descriptors, then consumes a push stream of invocations: each one is
//! executed on its own task with timeout and panic isolation, and its
//! outcome (value, error, or nothing, plus captured logs) is reported back.
//!
//! ## Features
//!
//! - Named handler registration with interval, cron, webhook, run-now, and
//!   on-demand triggers
//! - Concurrent invocation execution with per-invocation timeouts
//! - Panic isolation: a crashing handler is reported, never fatal
//! - Automatic reconnect with handler re-registration
//! - Request-scoped logging captured into invocation reports
//! - Pass-through API calls from handler code
//!
//! ## Quick start
//!
//! ```ignore
//! use dispatch_agent::{Agent, AgentConfig, HandlerContext, HandlerResult, RegisterOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn sync_catalog(ctx: HandlerContext) -> HandlerResult {
//!     ctx.logger().info("syncing");
//!     ctx.api()
//!         .call_json("PUT", "/api/v1/catalog/custom-data", "[]")
//!         .await?;
//!     Ok(None)
//! }
//!
//! #[tokio::main]
//! async fn main() -> dispatch_agent::Result<()> {
//!     let agent = Agent::new(AgentConfig::default().with_host_port("localhost", 50051));
//!     agent
//!         .register("sync-catalog", RegisterOptions::new().interval("30s"), sync_catalog)
//!         .await?;
//!     agent.run(CancellationToken::new()).await
//! }
//! ```

mod agent;
mod codec;
mod config;
mod context;
mod error;
mod executor;
pub mod protocol;
mod registry;
pub mod transport;

pub use agent::Agent;
pub use codec::PayloadCodec;
pub use config::AgentConfig;
pub use context::{ApiCaller, HandlerContext, InvocationLogger};
pub use error::{AgentError, Result};
pub use protocol::{Invocation, InvocationReport, LogRecord, Outcome, TriggerOption};
pub use registry::{
    BoxFuture, Handler, HandlerError, HandlerInfo, HandlerRegistry, HandlerResult, RegisterOptions,
};
pub use transport::{DispatchEvent, DispatchStream, SessionTransport, TcpTransport};
