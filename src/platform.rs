//! # Platform Seam
//!
//! Platform-agnostic view of inbound events and outbound replies. The Discord
//! adapter in [`crate::discord`] converts serenity interactions into
//! [`InboundEvent`]s and implements [`Responder`] and [`GuildGateway`]; tests
//! substitute in-memory fakes.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0

use anyhow::{anyhow, Result};
use serde_json::Value;
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::authorization::MemberAuthority;
use crate::registry::HandlerKind;

/// Separator between the routing key and arguments of a component custom id
pub const CUSTOM_ID_SEPARATOR: char = ':';

/// Build a component custom id from a routing key and its arguments
pub fn custom_id(key: &str, args: &[&str]) -> String {
    let mut id = key.to_string();
    for arg in args {
        id.push(CUSTOM_ID_SEPARATOR);
        id.push_str(arg);
    }
    id
}

/// Split a component custom id into its routing key and arguments
pub fn split_custom_id(raw: &str) -> (String, Vec<String>) {
    let mut parts = raw.split(CUSTOM_ID_SEPARATOR);
    let key = parts.next().unwrap_or("").to_string();
    let args = parts.map(|s| s.to_string()).collect();
    (key, args)
}

/// A message sent back to whoever triggered an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub content: String,
    /// Only visible to the invoking user
    pub ephemeral: bool,
    pub components: Vec<ReplyComponent>,
}

impl Reply {
    pub fn public(content: impl Into<String>) -> Self {
        Reply {
            content: content.into(),
            ephemeral: false,
            components: Vec::new(),
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Reply {
            content: content.into(),
            ephemeral: true,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: ReplyComponent) -> Self {
        self.components.push(component);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyComponent {
    Button {
        custom_id: String,
        label: String,
    },
    SelectMenu {
        custom_id: String,
        placeholder: String,
        /// `(label, value)` pairs
        options: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModalField {
    pub custom_id: String,
    pub label: String,
    pub paragraph: bool,
    pub required: bool,
    pub max_length: u64,
}

/// A form shown to the user in response to a command or component
#[derive(Debug, Clone, PartialEq)]
pub struct ModalPrompt {
    pub custom_id: String,
    pub title: String,
    pub fields: Vec<ModalField>,
}

/// Sends replies for a single inbound interaction
#[async_trait]
pub trait Responder: Send + Sync {
    /// Reply to the interaction. Implementations fall back to a follow-up
    /// message when the interaction was already answered.
    async fn reply(&self, reply: Reply) -> Result<()>;

    /// Acknowledge now and answer later. The first reply after a deferral
    /// fills the deferred message, so its visibility is the one chosen here.
    async fn defer(&self, ephemeral: bool) -> Result<()>;

    async fn open_modal(&self, modal: ModalPrompt) -> Result<()>;
}

/// Guild-level actions and lookups handlers may perform
#[async_trait]
pub trait GuildGateway: Send + Sync {
    async fn member_authority(&self, guild_id: &str, user_id: &str) -> Result<MemberAuthority>;

    /// Authority of the bot's own member in the guild
    async fn bot_authority(&self, guild_id: &str) -> Result<MemberAuthority>;

    async fn set_nickname(&self, guild_id: &str, user_id: &str, nickname: &str) -> Result<()>;

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()>;

    /// Post to the configured audit log channel; a no-op when none is set
    async fn post_audit_log(&self, guild_id: &str, content: &str) -> Result<()>;

    async fn publish_commands(&self, definitions: Vec<CreateApplicationCommand>) -> Result<()>;
}

/// One event delivered by the platform, already classified by kind
#[derive(Clone)]
pub struct InboundEvent {
    pub kind: HandlerKind,
    /// Command name, component routing key, or event name
    pub key: String,
    /// Custom id segments after the routing key
    pub args: Vec<String>,
    pub actor_id: Option<String>,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    /// Target of a context-menu command
    pub target_id: Option<String>,
    pub options: HashMap<String, Value>,
    /// Selected values of a select menu
    pub values: Vec<String>,
    /// Submitted modal inputs by input custom id
    pub fields: HashMap<String, String>,
    pub received_at: Instant,
    responder: Option<Arc<dyn Responder>>,
}

impl InboundEvent {
    /// Create an event. For component kinds `raw_key` is the full custom id,
    /// which gets split into routing key and arguments.
    pub fn new(kind: HandlerKind, raw_key: &str) -> Self {
        let (key, args) = if kind.is_component() {
            split_custom_id(raw_key)
        } else {
            (raw_key.to_string(), Vec::new())
        };

        InboundEvent {
            kind,
            key,
            args,
            actor_id: None,
            guild_id: None,
            channel_id: None,
            target_id: None,
            options: HashMap::new(),
            values: Vec::new(),
            fields: HashMap::new(),
            received_at: Instant::now(),
            responder: None,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    pub fn with_field(mut self, custom_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(custom_id.into(), value.into());
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn string_option(&self, name: &str) -> Option<String> {
        self.options
            .get(name)
            .and_then(|val| val.as_str())
            .map(|s| s.to_string())
    }

    pub fn integer_option(&self, name: &str) -> Option<i64> {
        self.options.get(name).and_then(|val| val.as_i64())
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }

    /// The actor id, or an error for events that carry no actor
    pub fn require_actor(&self) -> Result<&str> {
        self.actor_id
            .as_deref()
            .ok_or_else(|| anyhow!("event '{}' has no acting user", self.key))
    }

    /// The guild id, or an error for events outside a guild (e.g. DMs)
    pub fn require_guild(&self) -> Result<&str> {
        self.guild_id
            .as_deref()
            .ok_or_else(|| anyhow!("event '{}' did not happen in a guild", self.key))
    }

    pub async fn reply(&self, reply: Reply) -> Result<()> {
        match &self.responder {
            Some(responder) => responder.reply(reply).await,
            None => Err(anyhow!("event '{}' cannot be replied to", self.key)),
        }
    }

    pub async fn defer(&self, ephemeral: bool) -> Result<()> {
        match &self.responder {
            Some(responder) => responder.defer(ephemeral).await,
            None => Err(anyhow!("event '{}' cannot be deferred", self.key)),
        }
    }

    pub async fn open_modal(&self, modal: ModalPrompt) -> Result<()> {
        match &self.responder {
            Some(responder) => responder.open_modal(modal).await,
            None => Err(anyhow!("event '{}' cannot open a modal", self.key)),
        }
    }
}
