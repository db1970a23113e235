//! # Command System
//!
//! Slash commands, context-menu commands and the interactive components they
//! spawn. Each handler is registered with the
//! [`HandlerRegistry`](crate::registry::HandlerRegistry) through the groups
//! returned by [`sources`].
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 2.0.0: Handlers implement the `Handler` trait and are discovered at startup
//! - 1.0.0: Initial reorganization with modular command structure

pub mod infractions;
pub mod nickname;
pub mod utility;
pub mod warn;

use anyhow::{anyhow, Result};
use log::warn;
use serenity::model::permissions::Permissions;
use std::sync::Arc;

use crate::authorization::{check_moderation, MemberAuthority};
use crate::dispatcher::HandlerContext;
use crate::events;
use crate::platform::{InboundEvent, Reply};
use crate::registry::{Handler, StaticSource};

/// Slash and context-menu commands
pub fn create_command_handlers() -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(utility::PingCommand),
        Arc::new(utility::HelpCommand),
        Arc::new(warn::WarnCommand),
        Arc::new(warn::WarnUserMenu),
        Arc::new(nickname::NicknameCommand),
        Arc::new(infractions::InfractionsCommand),
        Arc::new(infractions::InfractionCommand),
    ]
}

/// Buttons, select menus and modals
pub fn create_component_handlers() -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(warn::WarnModal),
        Arc::new(infractions::InfractionsFilterMenu),
    ]
}

/// Every handler group discovered at startup
pub fn sources() -> Vec<StaticSource> {
    vec![
        StaticSource {
            group: "commands",
            handlers: create_command_handlers,
        },
        StaticSource {
            group: "components",
            handlers: create_component_handlers,
        },
        StaticSource {
            group: "events",
            handlers: events::create_event_handlers,
        },
    ]
}

/// Required string option, or an error naming the missing option
pub fn required_string(event: &InboundEvent, name: &str) -> Result<String> {
    event
        .string_option(name)
        .ok_or_else(|| anyhow!("Missing {} parameter", name))
}

/// Reply with an ephemeral refusal
pub async fn deny(event: &InboundEvent, message: impl std::fmt::Display) -> Result<()> {
    event.reply(Reply::ephemeral(format!("❌ {}", message))).await
}

/// Resolve the authorities of actor and target for a moderation action and
/// run the hierarchy checks. Replies with the refusal and returns `None` when
/// the action may not proceed.
pub async fn authorize_moderation(
    ctx: &HandlerContext,
    event: &InboundEvent,
    target_id: &str,
    required: Permissions,
    involves_bot: bool,
) -> Result<Option<(MemberAuthority, MemberAuthority)>> {
    let guild_id = event.require_guild()?;
    let actor_id = event.require_actor()?;

    let actor = ctx.gateway.member_authority(guild_id, actor_id).await?;
    let target = match ctx.gateway.member_authority(guild_id, target_id).await {
        Ok(target) => target,
        Err(e) => {
            warn!("Could not resolve member {} in guild {}: {:#}", target_id, guild_id, e);
            deny(event, "I couldn't find that member in this server.").await?;
            return Ok(None);
        }
    };

    let bot = if involves_bot {
        Some(ctx.gateway.bot_authority(guild_id).await?)
    } else {
        None
    };

    match check_moderation(&actor, &target, bot.as_ref(), required) {
        Ok(()) => Ok(Some((actor, target))),
        Err(denial) => {
            deny(event, denial).await?;
            Ok(None)
        }
    }
}

/// Check the actor holds `required`, replying with a refusal otherwise
pub async fn require_permission(
    ctx: &HandlerContext,
    event: &InboundEvent,
    required: Permissions,
) -> Result<bool> {
    let guild_id = event.require_guild()?;
    let actor = ctx
        .gateway
        .member_authority(guild_id, event.require_actor()?)
        .await?;

    if actor.has(required) {
        Ok(true)
    } else {
        let name = required
            .get_permission_names()
            .first()
            .map(|name| name.to_string())
            .unwrap_or_default();
        deny(event, format!("You need the {} permission to do that.", name)).await?;
        Ok(false)
    }
}
