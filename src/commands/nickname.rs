//! /nickname: set or reset a member's nickname with character filtering

use anyhow::Result;
use log::error;
use regex::Regex;
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::permissions::Permissions;
use std::sync::LazyLock;

use super::{authorize_moderation, deny, required_string};
use crate::dispatcher::HandlerContext;
use crate::formatting::{audit_entry, mention};
use crate::platform::{InboundEvent, Reply};
use crate::registry::{Handler, HandlerKind};

/// Discord caps nicknames at 32 characters
pub const MAX_NICKNAME_LEN: usize = 32;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 _.'\-]").expect("static pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Strip characters outside `[A-Za-z0-9 _.'-]`, collapse whitespace and cap
/// the length. Returns `None` when nothing usable is left.
pub fn sanitize_nickname(raw: &str) -> Option<String> {
    let filtered = DISALLOWED.replace_all(raw, "");
    let collapsed = WHITESPACE.replace_all(filtered.trim(), " ");
    let capped: String = collapsed.chars().take(MAX_NICKNAME_LEN).collect();
    let capped = capped.trim_end();

    if capped.is_empty() {
        None
    } else {
        Some(capped.to_string())
    }
}

pub struct NicknameCommand;

#[async_trait]
impl Handler for NicknameCommand {
    fn key(&self) -> &str {
        "nickname"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Command
    }

    fn description(&self) -> &str {
        "Change or reset a member's nickname"
    }

    fn definition(&self) -> Option<CreateApplicationCommand> {
        Some(
            CreateApplicationCommand::default()
                .name(self.key())
                .description(self.description())
                .default_member_permissions(Permissions::MANAGE_NICKNAMES)
                .create_option(|option| {
                    option
                        .name("user")
                        .description("The member to rename")
                        .kind(CommandOptionType::User)
                        .required(true)
                })
                .create_option(|option| {
                    option
                        .name("nickname")
                        .description("New nickname (leave empty to reset)")
                        .kind(CommandOptionType::String)
                        .required(false)
                })
                .to_owned(),
        )
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let target_id = required_string(event, "user")?;
        let requested = event.string_option("nickname");

        let nickname = match requested.as_deref() {
            Some(raw) => match sanitize_nickname(raw) {
                Some(clean) => Some(clean),
                None => {
                    return deny(
                        event,
                        "That nickname has no usable characters. Use letters, numbers, spaces and `_ . ' -`.",
                    )
                    .await
                }
            },
            None => None,
        };

        event.defer(false).await?;

        let Some((actor, target)) =
            authorize_moderation(ctx, event, &target_id, Permissions::MANAGE_NICKNAMES, true).await?
        else {
            return Ok(());
        };

        let guild_id = event.require_guild()?;
        ctx.gateway
            .set_nickname(guild_id, &target.user_id, nickname.as_deref().unwrap_or(""))
            .await?;

        let (response, details) = match &nickname {
            Some(nick) => (
                format!("✏️ {}'s nickname is now **{}**.", mention(&target.user_id), nick),
                format!("**New nickname:** {}", nick),
            ),
            None => (
                format!("✏️ {}'s nickname has been reset.", mention(&target.user_id)),
                "**Nickname reset**".to_string(),
            ),
        };
        event.reply(Reply::public(response)).await?;

        if let Err(e) = ctx
            .gateway
            .post_audit_log(guild_id, &audit_entry("Nickname", &actor.user_id, &target.user_id, &details))
            .await
        {
            error!("Failed to write nickname audit log: {:#}", e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use crate::testing::{authority, context, FakeGateway, RecordingResponder};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_sanitize_nickname() {
        assert_eq!(sanitize_nickname("Alice").as_deref(), Some("Alice"));
        assert_eq!(sanitize_nickname("  𝓐𝓵𝓲𝓬𝓮 Bob!! ").as_deref(), Some("Bob"));
        assert_eq!(sanitize_nickname("O'Neil   -  the_2nd.").as_deref(), Some("O'Neil - the_2nd."));
        assert_eq!(sanitize_nickname("🔥🔥🔥"), None);
        assert_eq!(sanitize_nickname(""), None);

        let long = sanitize_nickname(&"a".repeat(50)).unwrap();
        assert_eq!(long.len(), MAX_NICKNAME_LEN);
    }

    fn event(actor: &str, target: &str, nickname: Option<&str>, responder: &Arc<RecordingResponder>) -> InboundEvent {
        let mut event = InboundEvent::new(HandlerKind::Command, "nickname")
            .with_actor(actor)
            .with_guild("g1")
            .with_option("user", json!(target))
            .with_responder(responder.clone());
        if let Some(nick) = nickname {
            event = event.with_option("nickname", json!(nick));
        }
        event
    }

    #[tokio::test]
    async fn test_sets_filtered_nickname() {
        let gateway = Arc::new(FakeGateway::default());
        let ctx = context(HandlerRegistry::new(), gateway.clone()).await;
        let responder = Arc::new(RecordingResponder::default());

        NicknameCommand
            .invoke(&ctx, &event("mod", "user", Some("★ Cool Name ★"), &responder))
            .await
            .unwrap();

        assert_eq!(
            gateway.nickname_changes(),
            vec![("user".to_string(), "Cool Name".to_string())]
        );
        assert_eq!(responder.actions(), vec!["defer", "reply"]);
        assert!(responder.contents()[0].contains("**Cool Name**"));
        assert_eq!(gateway.audit_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_nickname() {
        let gateway = Arc::new(FakeGateway::default());
        let ctx = context(HandlerRegistry::new(), gateway.clone()).await;
        let responder = Arc::new(RecordingResponder::default());

        NicknameCommand
            .invoke(&ctx, &event("mod", "user", None, &responder))
            .await
            .unwrap();

        assert_eq!(gateway.nickname_changes(), vec![("user".to_string(), String::new())]);
        assert!(responder.contents()[0].contains("has been reset"));
    }

    #[tokio::test]
    async fn test_unusable_nickname_is_rejected() {
        let gateway = Arc::new(FakeGateway::default());
        let ctx = context(HandlerRegistry::new(), gateway.clone()).await;
        let responder = Arc::new(RecordingResponder::default());

        NicknameCommand
            .invoke(&ctx, &event("mod", "user", Some("💀💀"), &responder))
            .await
            .unwrap();

        assert!(gateway.nickname_changes().is_empty());
        assert!(responder.replies()[0].ephemeral);
        assert_eq!(responder.actions(), vec!["reply"]);
    }

    #[tokio::test]
    async fn test_bot_hierarchy_is_checked() {
        let mut gateway = FakeGateway::default()
            .with_member(authority("admin", 20, Permissions::ADMINISTRATOR))
            .with_member(authority("senior", 15, Permissions::empty()));
        gateway.bot = authority("bot", 10, Permissions::MANAGE_NICKNAMES);
        let gateway = Arc::new(gateway);
        let ctx = context(HandlerRegistry::new(), gateway.clone()).await;
        let responder = Arc::new(RecordingResponder::default());

        NicknameCommand
            .invoke(&ctx, &event("admin", "senior", Some("Renamed"), &responder))
            .await
            .unwrap();

        assert!(gateway.nickname_changes().is_empty());
        assert!(responder.contents()[0].contains("above mine"));
    }
}
