//! Utility commands: /ping, /help

use anyhow::Result;
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;

use crate::dispatcher::HandlerContext;
use crate::platform::{InboundEvent, Reply};
use crate::registry::{Handler, HandlerKind};

pub struct PingCommand;

#[async_trait]
impl Handler for PingCommand {
    fn key(&self) -> &str {
        "ping"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Command
    }

    fn description(&self) -> &str {
        "Test bot responsiveness"
    }

    fn definition(&self) -> Option<CreateApplicationCommand> {
        Some(
            CreateApplicationCommand::default()
                .name(self.key())
                .description(self.description())
                .to_owned(),
        )
    }

    async fn invoke(&self, _ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let latency = event.received_at.elapsed();
        event
            .reply(Reply::public(format!("🏓 Pong! Handled in {}ms", latency.as_millis())))
            .await
    }
}

pub struct HelpCommand;

#[async_trait]
impl Handler for HelpCommand {
    fn key(&self) -> &str {
        "help"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Command
    }

    fn description(&self) -> &str {
        "Show available commands and usage information"
    }

    fn definition(&self) -> Option<CreateApplicationCommand> {
        Some(
            CreateApplicationCommand::default()
                .name(self.key())
                .description(self.description())
                .to_owned(),
        )
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let mut help_text = String::from("**Available Commands:**\n");
        for (name, description) in ctx.registry.commands() {
            help_text.push_str(&format!("`/{}` - {}\n", name, description));
        }
        help_text.push_str("\nRight-click a member → **Apps → Warn User** to warn from the member list.");

        event.reply(Reply::ephemeral(help_text)).await
    }
}
