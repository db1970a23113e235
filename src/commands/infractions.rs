//! Infraction history: /infractions, its type filter menu, and /infraction

use anyhow::{anyhow, Result};
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;
use serenity::model::permissions::Permissions;

use super::{deny, require_permission, required_string};
use crate::dispatcher::HandlerContext;
use crate::formatting::{infraction_detail, infraction_list};
use crate::infractions::InfractionKind;
use crate::platform::{custom_id, InboundEvent, Reply, ReplyComponent};
use crate::registry::{Handler, HandlerKind};

pub const FILTER_MENU_KEY: &str = "infractions_filter";
/// Select value that clears the type filter
pub const ALL_TYPES: &str = "ALL";

fn filter_menu(user_id: &str) -> ReplyComponent {
    let mut options = vec![("All types".to_string(), ALL_TYPES.to_string())];
    options.extend(
        InfractionKind::ALL
            .iter()
            .map(|kind| (kind.as_str().to_string(), kind.as_str().to_string())),
    );

    ReplyComponent::SelectMenu {
        custom_id: custom_id(FILTER_MENU_KEY, &[user_id]),
        placeholder: "Filter by type".to_string(),
        options,
    }
}

async fn listing(
    ctx: &HandlerContext,
    guild_id: &str,
    user_id: &str,
    filter: Option<InfractionKind>,
) -> Result<Reply> {
    let infractions = ctx
        .store
        .get_user_infractions(user_id, guild_id, filter)
        .await?;

    Ok(Reply::ephemeral(infraction_list(user_id, &infractions, filter))
        .with_component(filter_menu(user_id)))
}

fn parse_filter(raw: Option<&str>) -> Result<Option<InfractionKind>, String> {
    match raw {
        None => Ok(None),
        Some(value) if value.eq_ignore_ascii_case(ALL_TYPES) => Ok(None),
        Some(value) => value.parse::<InfractionKind>().map(Some),
    }
}

pub struct InfractionsCommand;

#[async_trait]
impl Handler for InfractionsCommand {
    fn key(&self) -> &str {
        "infractions"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Command
    }

    fn description(&self) -> &str {
        "Show a member's infraction history"
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
                        .description("The member to look up")
                        .kind(CommandOptionType::User)
                        .required(true)
                })
                .create_option(|option| {
                    let option = option
                        .name("type")
                        .description("Only show one type of infraction")
                        .kind(CommandOptionType::String)
                        .required(false);
                    for kind in InfractionKind::ALL {
                        option.add_string_choice(kind.as_str(), kind.as_str());
                    }
                    option
                })
                .to_owned(),
        )
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        event.defer(true).await?;
        if !require_permission(ctx, event, Permissions::MODERATE_MEMBERS).await? {
            return Ok(());
        }

        let user_id = required_string(event, "user")?;
        let filter = match parse_filter(event.string_option("type").as_deref()) {
            Ok(filter) => filter,
            Err(e) => return deny(event, e).await,
        };

        let reply = listing(ctx, event.require_guild()?, &user_id, filter).await?;
        event.reply(reply).await
    }
}

/// Type filter under an infraction listing; the custom id carries the user
pub struct InfractionsFilterMenu;

#[async_trait]
impl Handler for InfractionsFilterMenu {
    fn key(&self) -> &str {
        FILTER_MENU_KEY
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::SelectMenu
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        event.defer(true).await?;
        if !require_permission(ctx, event, Permissions::MODERATE_MEMBERS).await? {
            return Ok(());
        }

        let user_id = event
            .arg(0)
            .ok_or_else(|| anyhow!("Filter menu without a user"))?;
        let filter = parse_filter(event.values.first().map(String::as_str)).map_err(|e| anyhow!(e))?;

        let reply = listing(ctx, event.require_guild()?, user_id, filter).await?;
        event.reply(reply).await
    }
}

pub struct InfractionCommand;

#[async_trait]
impl Handler for InfractionCommand {
    fn key(&self) -> &str {
        "infraction"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Command
    }

    fn description(&self) -> &str {
        "Look up a single infraction by its id"
    }

    fn definition(&self) -> Option<CreateApplicationCommand> {
        Some(
            CreateApplicationCommand::default()
                .name(self.key())
                .description(self.description())
                .default_member_permissions(Permissions::MODERATE_MEMBERS)
                .create_option(|option| {
                    option
                        .name("id")
                        .description("The infraction id")
                        .kind(CommandOptionType::String)
                        .required(true)
                })
                .to_owned(),
        )
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        event.defer(true).await?;
        if !require_permission(ctx, event, Permissions::MODERATE_MEMBERS).await? {
            return Ok(());
        }

        let id = required_string(event, "id")?;
        let guild_id = event.require_guild()?;

        match ctx.store.get_infraction_by_id(id.trim()).await? {
            // ids are global, but other guilds' records stay private
            Some(infraction) if infraction.guild_id == guild_id => {
                event.reply(Reply::ephemeral(infraction_detail(&infraction))).await
            }
            _ => deny(event, format!("No infraction with id `{}` in this server.", id.trim())).await,
        }
    }
}
