//! Ready: log the session and publish command definitions, once per process

use anyhow::Result;
use log::info;
use serenity::async_trait;

use super::READY;
use crate::dispatcher::HandlerContext;
use crate::platform::InboundEvent;
use crate::registry::{Handler, HandlerKind};

pub struct ReadyEvent;

#[async_trait]
impl Handler for ReadyEvent {
    fn key(&self) -> &str {
        READY
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Event
    }

    // reconnects deliver ready again; commands only need publishing once
    fn once_only(&self) -> bool {
        true
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let name = event.string_option("user").unwrap_or_else(|| "bot".to_string());
        info!("🎉 {} is connected and ready!", name);
        if let Some(guilds) = event.integer_option("guild_count") {
            info!("📡 Connected to {} guilds", guilds);
        }
        if let Some(session_id) = event.string_option("session_id") {
            info!("🔗 Gateway session ID: {}", session_id);
        }

        let definitions = ctx.registry.command_definitions();
        let count = definitions.len();
        ctx.gateway.publish_commands(definitions).await?;
        info!("✅ Published {} application commands", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::create_command_handlers;
    use crate::registry::HandlerRegistry;
    use crate::testing::{context, FakeGateway};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ready_publishes_all_commands() {
        let mut registry = HandlerRegistry::new();
        for handler in create_command_handlers() {
            registry.register(handler).unwrap();
        }
        let expected = registry.count(HandlerKind::Command);
        let gateway = Arc::new(FakeGateway::default());
        let ctx = context(registry, gateway.clone()).await;

        let event = InboundEvent::new(HandlerKind::Event, READY)
            .with_option("user", json!("Bailiff"))
            .with_option("guild_count", json!(3));
        ReadyEvent.invoke(&ctx, &event).await.unwrap();

        assert_eq!(gateway.published.load(Ordering::SeqCst), expected);
    }
}
