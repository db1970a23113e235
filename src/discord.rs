//! # Discord Adapter
//!
//! Connects serenity's gateway to the [`Dispatcher`]. Interactions and
//! gateway events are converted into [`InboundEvent`]s; replies, modals and
//! guild actions go back out through [`InteractionResponder`] and
//! [`SerenityGateway`].
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0

use anyhow::{anyhow, Context as _, Result};
use log::{debug, info, warn};
use serde_json::{json, Value};
use serenity::async_trait;
use serenity::builder::{CreateApplicationCommand, CreateComponents, CreateInteractionResponseData};
use serenity::http::Http;
use serenity::model::application::command::Command;
use serenity::model::application::component::{ActionRow, ActionRowComponent, ButtonStyle, ComponentType, InputTextStyle};
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandDataOption,
};
use serenity::model::application::interaction::message_component::MessageComponentInteraction;
use serenity::model::application::interaction::modal::ModalSubmitInteraction;
use serenity::model::application::interaction::{Interaction, InteractionResponseType};
use serenity::model::event::ResumedEvent;
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::model::permissions::Permissions;
use serenity::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::authorization::MemberAuthority;
use crate::dispatcher::Dispatcher;
use crate::events::{READY, RESUME};
use crate::platform::{GuildGateway, InboundEvent, ModalPrompt, Reply, ReplyComponent, Responder};
use crate::registry::HandlerKind;

fn snowflake(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| anyhow!("'{}' is not a valid Discord id", raw))
}

/// Highest role position and combined permissions of a member's roles,
/// starting from the `@everyone` permissions
fn combine_roles(everyone: Permissions, roles: impl IntoIterator<Item = (i64, Permissions)>) -> (i64, Permissions) {
    roles
        .into_iter()
        .fold((0, everyone), |(top, permissions), (position, granted)| {
            (top.max(position), permissions | granted)
        })
}

/// The audit log channel, but only for actions in the guild that owns it
fn audit_channel_for(channel: ChannelId, channel_guild: GuildId, guild: GuildId) -> Option<ChannelId> {
    (channel_guild == guild).then_some(channel)
}

fn component_kind(component_type: ComponentType) -> Option<HandlerKind> {
    match component_type {
        ComponentType::Button => Some(HandlerKind::Button),
        ComponentType::SelectMenu => Some(HandlerKind::SelectMenu),
        _ => None,
    }
}

fn command_options(options: &[CommandDataOption]) -> HashMap<String, Value> {
    options
        .iter()
        .filter_map(|option| option.value.clone().map(|value| (option.name.clone(), value)))
        .collect()
}

fn modal_fields(rows: &[ActionRow]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for row in rows {
        for component in &row.components {
            if let ActionRowComponent::InputText(input) = component {
                fields.insert(input.custom_id.clone(), input.value.clone());
            }
        }
    }
    fields
}

fn build_components(components: &[ReplyComponent]) -> CreateComponents {
    let mut built = CreateComponents::default();
    for component in components {
        built.create_action_row(|row| match component {
            ReplyComponent::Button { custom_id, label } => row.create_button(|button| {
                button
                    .custom_id(custom_id)
                    .label(label)
                    .style(ButtonStyle::Secondary)
            }),
            ReplyComponent::SelectMenu {
                custom_id,
                placeholder,
                options,
            } => row.create_select_menu(|menu| {
                menu.custom_id(custom_id)
                    .placeholder(placeholder)
                    .options(|menu_options| {
                        for (label, value) in options {
                            menu_options.create_option(|option| option.label(label).value(value));
                        }
                        menu_options
                    })
            }),
        });
    }
    built
}

fn fill_modal<'a, 'b>(
    data: &'b mut CreateInteractionResponseData<'a>,
    modal: &ModalPrompt,
) -> &'b mut CreateInteractionResponseData<'a> {
    data.custom_id(&modal.custom_id)
        .title(&modal.title)
        .components(|components| {
            for field in &modal.fields {
                let style = if field.paragraph {
                    InputTextStyle::Paragraph
                } else {
                    InputTextStyle::Short
                };
                components.create_action_row(|row| {
                    row.create_input_text(|input| {
                        input
                            .custom_id(&field.custom_id)
                            .label(&field.label)
                            .style(style)
                            .required(field.required)
                            .max_length(field.max_length)
                    })
                });
            }
            components
        })
}

enum InteractionTarget {
    Command(ApplicationCommandInteraction),
    Component(MessageComponentInteraction),
    Modal(ModalSubmitInteraction),
}

macro_rules! each_interaction {
    ($target:expr, $interaction:ident => $body:expr) => {
        match $target {
            InteractionTarget::Command($interaction) => $body,
            InteractionTarget::Component($interaction) => $body,
            InteractionTarget::Modal($interaction) => $body,
        }
    };
}

/// Answers one interaction. The first reply is the interaction response, or
/// fills the deferred response; later replies become follow-up messages.
pub struct InteractionResponder {
    http: Arc<Http>,
    target: InteractionTarget,
    answered: AtomicBool,
    /// Deferred, and the placeholder has not been filled yet
    awaiting_edit: AtomicBool,
}

impl InteractionResponder {
    fn new(http: Arc<Http>, target: InteractionTarget) -> Self {
        InteractionResponder {
            http,
            target,
            answered: AtomicBool::new(false),
            awaiting_edit: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Responder for InteractionResponder {
    async fn reply(&self, reply: Reply) -> Result<()> {
        if self.awaiting_edit.swap(false, Ordering::SeqCst) {
            each_interaction!(&self.target, interaction => {
                interaction
                    .edit_original_interaction_response(&self.http, |response| {
                        response
                            .content(&reply.content)
                            .components(|components| {
                                *components = build_components(&reply.components);
                                components
                            })
                    })
                    .await?;
            });
            return Ok(());
        }

        if self.answered.load(Ordering::SeqCst) {
            each_interaction!(&self.target, interaction => {
                interaction
                    .create_followup_message(&self.http, |message| {
                        message
                            .content(&reply.content)
                            .ephemeral(reply.ephemeral)
                            .set_components(build_components(&reply.components))
                    })
                    .await?;
            });
            return Ok(());
        }

        each_interaction!(&self.target, interaction => {
            interaction
                .create_interaction_response(&self.http, |response| {
                    response
                        .kind(InteractionResponseType::ChannelMessageWithSource)
                        .interaction_response_data(|message| {
                            message
                                .content(&reply.content)
                                .ephemeral(reply.ephemeral)
                                .set_components(build_components(&reply.components))
                        })
                })
                .await?;
        });
        self.answered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn defer(&self, ephemeral: bool) -> Result<()> {
        if self.answered.load(Ordering::SeqCst) {
            debug!("Interaction already answered, not deferring");
            return Ok(());
        }

        each_interaction!(&self.target, interaction => {
            interaction
                .create_interaction_response(&self.http, |response| {
                    response
                        .kind(InteractionResponseType::DeferredChannelMessageWithSource)
                        .interaction_response_data(|message| message.ephemeral(ephemeral))
                })
                .await?;
        });
        self.answered.store(true, Ordering::SeqCst);
        self.awaiting_edit.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn open_modal(&self, modal: ModalPrompt) -> Result<()> {
        if self.answered.load(Ordering::SeqCst) {
            return Err(anyhow!("interaction was already answered, cannot open '{}'", modal.custom_id));
        }

        match &self.target {
            InteractionTarget::Command(interaction) => {
                interaction
                    .create_interaction_response(&self.http, |response| {
                        response
                            .kind(InteractionResponseType::Modal)
                            .interaction_response_data(|data| fill_modal(data, &modal))
                    })
                    .await?
            }
            InteractionTarget::Component(interaction) => {
                interaction
                    .create_interaction_response(&self.http, |response| {
                        response
                            .kind(InteractionResponseType::Modal)
                            .interaction_response_data(|data| fill_modal(data, &modal))
                    })
                    .await?
            }
            InteractionTarget::Modal(_) => {
                return Err(anyhow!("a modal submission cannot open another modal"));
            }
        }

        self.answered.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Guild actions backed by the Discord HTTP API
pub struct SerenityGateway {
    ctx: Context,
    audit_log_channel_id: Option<u64>,
    audit_log_guild: Arc<OnceCell<GuildId>>,
    dev_guild_id: Option<u64>,
    bot_id: Arc<OnceCell<UserId>>,
}

impl SerenityGateway {
    /// Guild that owns the audit log channel, resolved once
    async fn audit_channel_guild(&self, channel: ChannelId) -> Result<GuildId> {
        let guild = self
            .audit_log_guild
            .get_or_try_init(|| async {
                let resolved = channel.to_channel(&self.ctx).await?;
                resolved
                    .guild()
                    .map(|guild_channel| guild_channel.guild_id)
                    .ok_or_else(|| anyhow!("audit log channel {} is not a guild channel", channel))
            })
            .await?;
        Ok(*guild)
    }

    async fn bot_user_id(&self) -> Result<UserId> {
        let id = self
            .bot_id
            .get_or_try_init(|| async {
                let user = self.ctx.http.get_current_user().await?;
                Ok::<_, serenity::Error>(user.id)
            })
            .await?;
        Ok(*id)
    }
}

#[async_trait]
impl GuildGateway for SerenityGateway {
    async fn member_authority(&self, guild_id: &str, user_id: &str) -> Result<MemberAuthority> {
        let guild = GuildId(snowflake(guild_id)?);
        let user = UserId(snowflake(user_id)?);

        let member = guild
            .member(&self.ctx, user)
            .await
            .with_context(|| format!("member {} not found in guild {}", user_id, guild_id))?;
        // the gateway fills the cache for every guild; HTTP only on a miss
        let cached = self
            .ctx
            .cache
            .guild_field(guild, |g| (g.roles.clone(), g.owner_id));
        let (roles, owner_id) = match cached {
            Some(found) => found,
            None => {
                debug!("Guild {} not cached, fetching roles and owner", guild_id);
                let roles = guild.roles(&self.ctx.http).await?;
                let owner_id = guild.to_partial_guild(&self.ctx.http).await?.owner_id;
                (roles, owner_id)
            }
        };

        let everyone = roles
            .get(&RoleId(guild.0))
            .map(|role| role.permissions)
            .unwrap_or_else(Permissions::empty);
        let (top_role_position, permissions) = combine_roles(
            everyone,
            member
                .roles
                .iter()
                .filter_map(|id| roles.get(id))
                .map(|role| (role.position, role.permissions)),
        );

        Ok(MemberAuthority {
            user_id: user_id.to_string(),
            top_role_position,
            permissions,
            is_owner: owner_id == user,
            is_bot: member.user.bot,
        })
    }

    async fn bot_authority(&self, guild_id: &str) -> Result<MemberAuthority> {
        let bot_id = self.bot_user_id().await?;
        self.member_authority(guild_id, &bot_id.0.to_string()).await
    }

    async fn set_nickname(&self, guild_id: &str, user_id: &str, nickname: &str) -> Result<()> {
        let guild = GuildId(snowflake(guild_id)?);
        let user = UserId(snowflake(user_id)?);
        guild
            .edit_member(&self.ctx.http, user, |member| member.nickname(nickname))
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()> {
        let user = UserId(snowflake(user_id)?);
        let channel = user.create_dm_channel(&self.ctx).await?;
        channel.say(&self.ctx.http, content).await?;
        Ok(())
    }

    async fn post_audit_log(&self, guild_id: &str, content: &str) -> Result<()> {
        let Some(channel_id) = self.audit_log_channel_id else {
            debug!("No audit log channel configured, skipping entry for guild {}", guild_id);
            return Ok(());
        };
        let channel = ChannelId(channel_id);
        let guild = GuildId(snowflake(guild_id)?);
        let channel_guild = self.audit_channel_guild(channel).await?;

        match audit_channel_for(channel, channel_guild, guild) {
            Some(channel) => {
                channel.say(&self.ctx.http, content).await?;
            }
            None => warn!(
                "Audit log channel {} belongs to guild {}, not posting entry for guild {}",
                channel, channel_guild, guild
            ),
        }
        Ok(())
    }

    async fn publish_commands(&self, definitions: Vec<CreateApplicationCommand>) -> Result<()> {
        match self.dev_guild_id {
            Some(guild_id) => {
                GuildId(guild_id)
                    .set_application_commands(&self.ctx.http, |commands| {
                        commands.set_application_commands(definitions)
                    })
                    .await?;
                info!("Application commands published to guild: {}", guild_id);
            }
            None => {
                Command::set_global_application_commands(&self.ctx.http, |commands| {
                    commands.set_application_commands(definitions)
                })
                .await?;
                info!("Application commands published globally");
            }
        }
        Ok(())
    }
}

/// serenity event handler that feeds the dispatcher
pub struct DiscordHandler {
    dispatcher: Arc<Dispatcher>,
    audit_log_channel_id: Option<u64>,
    audit_log_guild: Arc<OnceCell<GuildId>>,
    dev_guild_id: Option<u64>,
    bot_id: Arc<OnceCell<UserId>>,
}

impl DiscordHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, audit_log_channel_id: Option<u64>, dev_guild_id: Option<u64>) -> Self {
        DiscordHandler {
            dispatcher,
            audit_log_channel_id,
            audit_log_guild: Arc::new(OnceCell::new()),
            dev_guild_id,
            bot_id: Arc::new(OnceCell::new()),
        }
    }

    fn gateway(&self, ctx: &Context) -> Arc<dyn GuildGateway> {
        Arc::new(SerenityGateway {
            ctx: ctx.clone(),
            audit_log_channel_id: self.audit_log_channel_id,
            audit_log_guild: Arc::clone(&self.audit_log_guild),
            dev_guild_id: self.dev_guild_id,
            bot_id: Arc::clone(&self.bot_id),
        })
    }

    fn convert(&self, ctx: &Context, interaction: Interaction) -> Option<InboundEvent> {
        let event = match interaction {
            Interaction::ApplicationCommand(command) => {
                let mut event = InboundEvent::new(HandlerKind::Command, &command.data.name)
                    .with_actor(command.user.id.0.to_string())
                    .with_channel(command.channel_id.0.to_string());
                event.options = command_options(&command.data.options);
                if let Some(target) = command.data.target_id {
                    event = event.with_target(target.0.to_string());
                }
                if let Some(guild_id) = command.guild_id {
                    event = event.with_guild(guild_id.0.to_string());
                }
                let target = InteractionTarget::Command(command);
                event.with_responder(Arc::new(InteractionResponder::new(ctx.http.clone(), target)))
            }
            Interaction::MessageComponent(component) => {
                let Some(kind) = component_kind(component.data.component_type) else {
                    debug!("Ignoring component of type {:?}", component.data.component_type);
                    return None;
                };
                let mut event = InboundEvent::new(kind, &component.data.custom_id)
                    .with_actor(component.user.id.0.to_string())
                    .with_channel(component.channel_id.0.to_string())
                    .with_values(component.data.values.clone());
                if let Some(guild_id) = component.guild_id {
                    event = event.with_guild(guild_id.0.to_string());
                }
                let target = InteractionTarget::Component(component);
                event.with_responder(Arc::new(InteractionResponder::new(ctx.http.clone(), target)))
            }
            Interaction::ModalSubmit(modal) => {
                let mut event = InboundEvent::new(HandlerKind::Modal, &modal.data.custom_id)
                    .with_actor(modal.user.id.0.to_string())
                    .with_channel(modal.channel_id.0.to_string());
                event.fields = modal_fields(&modal.data.components);
                if let Some(guild_id) = modal.guild_id {
                    event = event.with_guild(guild_id.0.to_string());
                }
                let target = InteractionTarget::Modal(modal);
                event.with_responder(Arc::new(InteractionResponder::new(ctx.http.clone(), target)))
            }
            Interaction::Autocomplete(autocomplete) => {
                debug!("Ignoring autocomplete for command: {}", autocomplete.data.name);
                return None;
            }
            Interaction::Ping(_) => {
                debug!("Ping interaction received - Discord health check");
                return None;
            }
        };
        Some(event)
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        let _ = self.bot_id.set(ready.user.id);

        let event = InboundEvent::new(HandlerKind::Event, READY)
            .with_option("user", json!(ready.user.name))
            .with_option("guild_count", json!(ready.guilds.len()))
            .with_option("session_id", json!(ready.session_id));
        self.dispatcher.dispatch(event, self.gateway(&ctx)).await;
    }

    async fn resume(&self, ctx: Context, _: ResumedEvent) {
        let event = InboundEvent::new(HandlerKind::Event, RESUME);
        self.dispatcher.dispatch(event, self.gateway(&ctx)).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Some(event) = self.convert(&ctx, interaction) {
            self.dispatcher.dispatch(event, self.gateway(&ctx)).await;
        }
    }
}
