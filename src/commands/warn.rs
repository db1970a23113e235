//! Warnings: /warn, the "Warn User" context menu and its reason modal
//!
//! All three entry points end in [`issue_warning`], which re-checks
//! authorization, records the infraction, notifies the member and writes the
//! audit log.

use anyhow::{anyhow, Result};
use log::{error, warn};
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::{CommandOptionType, CommandType};
use serenity::model::permissions::Permissions;

use super::{authorize_moderation, deny, required_string};
use crate::dispatcher::HandlerContext;
use crate::formatting::{audit_entry, mention, warning_dm};
use crate::infractions::InfractionKind;
use crate::platform::{custom_id, InboundEvent, ModalField, ModalPrompt, Reply};
use crate::registry::{Handler, HandlerKind};

pub const MAX_REASON_LEN: usize = 512;
pub const NO_REASON: &str = "No reason provided";

pub const WARN_MODAL_KEY: &str = "warn_modal";
pub const REASON_FIELD: &str = "reason";

/// Trim a reason and cap it at [`MAX_REASON_LEN`] characters
pub fn normalize_reason(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or("");
    if trimmed.is_empty() {
        return NO_REASON.to_string();
    }
    trimmed.chars().take(MAX_REASON_LEN).collect()
}

/// Authorize, record and announce a warning against `target_id`
pub async fn issue_warning(
    ctx: &HandlerContext,
    event: &InboundEvent,
    target_id: &str,
    reason: &str,
) -> Result<()> {
    // member lookups, the ledger write and the DM can outlast the ack window
    event.defer(false).await?;

    let Some((actor, target)) =
        authorize_moderation(ctx, event, target_id, Permissions::MODERATE_MEMBERS, false).await?
    else {
        return Ok(());
    };
    if target.is_bot {
        return deny(event, "Bots can't be warned.").await;
    }

    let guild_id = event.require_guild()?;
    let infraction_id = ctx
        .store
        .add_infraction(&target.user_id, guild_id, &actor.user_id, InfractionKind::Warn, reason)
        .await?;
    let warning_count = ctx
        .store
        .get_infraction_count(&target.user_id, guild_id, Some(InfractionKind::Warn))
        .await?;

    let mut response = format!(
        "⚠️ {} has been warned.\n**Reason:** {}\n**Infraction ID:** `{}` (warning #{})",
        mention(&target.user_id),
        reason,
        infraction_id,
        warning_count
    );

    if let Err(e) = ctx
        .gateway
        .send_direct_message(&target.user_id, &warning_dm(reason, &infraction_id, warning_count))
        .await
    {
        warn!("Could not DM warning {} to {}: {:#}", infraction_id, target.user_id, e);
        response.push_str("\n*I couldn't DM them about it.*");
    }

    event.reply(Reply::public(response)).await?;

    let details = format!(
        "**Reason:** {}\n**Infraction ID:** `{}` (warning #{})",
        reason, infraction_id, warning_count
    );
    if let Err(e) = ctx
        .gateway
        .post_audit_log(guild_id, &audit_entry("Warn", &actor.user_id, &target.user_id, &details))
        .await
    {
        error!("Failed to write audit log for {}: {:#}", infraction_id, e);
    }

    Ok(())
}

pub struct WarnCommand;

#[async_trait]
impl Handler for WarnCommand {
    fn key(&self) -> &str {
        "warn"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Command
    }

    fn description(&self) -> &str {
        "Warn a member and record it in their history"
    }

    fn definition(&self) -> Option<CreateApplicationCommand> {
        Some(
            CreateApplicationCommand::default()
                .name(self.key())
                .description(self.description())
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .create_option(|option| {
                    option
                        .name("user")
                        .description("The member to warn")
                        .kind(CommandOptionType::User)
                        .required(true)
                })
                .create_option(|option| {
                    option
                        .name("reason")
                        .description("Why the member is being warned")
                        .kind(CommandOptionType::String)
                        .required(false)
                })
                .to_owned(),
        )
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let target_id = required_string(event, "user")?;
        let reason = normalize_reason(event.string_option("reason").as_deref());
        issue_warning(ctx, event, &target_id, &reason).await
    }
}

/// User context-menu entry that asks for a reason before warning
pub struct WarnUserMenu;

#[async_trait]
impl Handler for WarnUserMenu {
    fn key(&self) -> &str {
        "Warn User"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Command
    }

    fn definition(&self) -> Option<CreateApplicationCommand> {
        Some(
            CreateApplicationCommand::default()
                .name(self.key())
                .kind(CommandType::User)
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .to_owned(),
        )
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let target_id = event
            .target_id
            .clone()
            .ok_or_else(|| anyhow!("Context menu invocation without a target"))?;

        // refuse before showing the form
        if authorize_moderation(ctx, event, &target_id, Permissions::MODERATE_MEMBERS, false)
            .await?
            .is_none()
        {
            return Ok(());
        }

        event
            .open_modal(ModalPrompt {
                custom_id: custom_id(WARN_MODAL_KEY, &[&target_id]),
                title: "Warn member".to_string(),
                fields: vec![ModalField {
                    custom_id: REASON_FIELD.to_string(),
                    label: "Reason".to_string(),
                    paragraph: true,
                    required: true,
                    max_length: MAX_REASON_LEN as u64,
                }],
            })
            .await
    }
}

/// Submission of the reason modal opened by [`WarnUserMenu`]
pub struct WarnModal;

#[async_trait]
impl Handler for WarnModal {
    fn key(&self) -> &str {
        WARN_MODAL_KEY
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Modal
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        let target_id = event
            .arg(0)
            .ok_or_else(|| anyhow!("Warn modal submitted without a target"))?
            .to_string();
        let reason = normalize_reason(event.fields.get(REASON_FIELD).map(String::as_str));
        issue_warning(ctx, event, &target_id, &reason).await
    }
}
