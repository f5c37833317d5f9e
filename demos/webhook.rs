//! Webhook and on-demand handlers.
//!
//! The webhook handler receives the delivery body and content type as
//! invocation arguments; the on-demand handler returns a value that ends up
//! in the invocation report.
//!
//! ```sh
//! cargo run --example webhook
//! ```

use std::time::Duration;

use dispatch_agent::{Agent, AgentConfig, HandlerContext, HandlerResult, RegisterOptions};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

async fn on_delivery(ctx: HandlerContext) -> HandlerResult {
    let body = ctx.arg("body").unwrap_or_default();
    let content_type = ctx.arg("content-type").unwrap_or_default();
    ctx.logger()
        .info(format!("delivery received ({content_type}, {} bytes)", body.len()));

    let parsed: Value = serde_json::from_str(body)?;
    if let Some(event) = parsed.get("event").and_then(Value::as_str) {
        ctx.logger().info(format!("event: {event}"));
    }

    Ok(None)
}

async fn describe(ctx: HandlerContext) -> HandlerResult {
    ctx.logger().debug("describe requested");
    Ok(Some("hello from the webhook demo".to_string()))
}

#[tokio::main]
async fn main() -> dispatch_agent::Result<()> {
    let config = AgentConfig::default().with_sleep_on_error(Duration::from_secs(2));
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let agent = Agent::new(config);
    agent
        .register(
            "on-delivery",
            RegisterOptions::new()
                .webhook("demo-hook")
                .with_timeout(Duration::from_secs(30)),
            on_delivery,
        )
        .await?;
    agent
        .register("describe", RegisterOptions::new().on_demand(), describe)
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
