//! Interval-triggered handler that keeps a catalog entry fresh.
//!
//! Run against a local dispatch server:
//!
//! ```sh
//! cargo run --example interval
//! ```
//!
//! Ctrl-C stops the agent gracefully.

use dispatch_agent::{Agent, AgentConfig, HandlerContext, HandlerResult, RegisterOptions};
use tokio_util::sync::CancellationToken;

async fn sync_catalog(ctx: HandlerContext) -> HandlerResult {
    ctx.logger().info("syncing custom data");

    let body = r#"[{"id": "node-count", "value": "42"}]"#;
    let response = ctx
        .api()
        .call_json("PUT", "/api/v1/catalog/custom-data", body)
        .await?;

    if response.status >= 400 {
        ctx.logger()
            .error(format!("sync rejected with status {}", response.status));
        return Err(format!("catalog sync failed: {}", response.status).into());
    }

    ctx.logger().info("custom data synced");
    Ok(None)
}

#[tokio::main]
async fn main() -> dispatch_agent::Result<()> {
    let config = AgentConfig::default();
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let agent = Agent::new(config);
    agent
        .register(
            "sync-catalog",
            RegisterOptions::new().run_now().interval("30s"),
            sync_catalog,
        )
        .await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        }
    });

    agent.run(cancel).await
}
