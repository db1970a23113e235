//! In-memory fakes for the platform seam, shared by unit tests.

use anyhow::{anyhow, Result};
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;
use serenity::model::permissions::Permissions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::authorization::MemberAuthority;
use crate::dispatcher::HandlerContext;
use crate::infractions::InfractionStore;
use crate::platform::{GuildGateway, InboundEvent, ModalPrompt, Reply, Responder};
use crate::registry::{Handler, HandlerKind, HandlerRegistry};

/// A handler that does nothing; `tag` doubles as its description
pub struct NamedHandler {
    key: String,
    kind: HandlerKind,
    once: bool,
    tag: String,
}

impl NamedHandler {
    pub fn new(key: &str, kind: HandlerKind) -> Self {
        NamedHandler {
            key: key.to_string(),
            kind,
            once: false,
            tag: String::new(),
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }
}

#[async_trait]
impl Handler for NamedHandler {
    fn key(&self) -> &str {
        &self.key
    }

    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn once_only(&self) -> bool {
        self.once
    }

    fn description(&self) -> &str {
        &self.tag
    }

    async fn invoke(&self, _ctx: &HandlerContext, _event: &InboundEvent) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingResponder {
    replies: Mutex<Vec<Reply>>,
    modals: Mutex<Vec<ModalPrompt>>,
    /// `"defer"`, `"reply"` and `"modal"` in the order they happened
    actions: Mutex<Vec<&'static str>>,
    deferred_ephemeral: Mutex<Option<bool>>,
    fail: bool,
}

impl RecordingResponder {
    /// A responder whose every send fails, like a revoked permission
    pub fn failing() -> Self {
        RecordingResponder {
            fail: true,
            ..Default::default()
        }
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Vec<String> {
        self.replies().into_iter().map(|r| r.content).collect()
    }

    pub fn modals(&self) -> Vec<ModalPrompt> {
        self.modals.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.actions.lock().unwrap().clone()
    }

    /// Visibility requested by the deferral, if there was one
    pub fn deferred_ephemeral(&self) -> Option<bool> {
        *self.deferred_ephemeral.lock().unwrap()
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn reply(&self, reply: Reply) -> Result<()> {
        if self.fail {
            return Err(anyhow!("Missing Access"));
        }
        self.replies.lock().unwrap().push(reply);
        self.actions.lock().unwrap().push("reply");
        Ok(())
    }

    async fn defer(&self, ephemeral: bool) -> Result<()> {
        if self.fail {
            return Err(anyhow!("Missing Access"));
        }
        *self.deferred_ephemeral.lock().unwrap() = Some(ephemeral);
        self.actions.lock().unwrap().push("defer");
        Ok(())
    }

    async fn open_modal(&self, modal: ModalPrompt) -> Result<()> {
        if self.fail {
            return Err(anyhow!("Missing Access"));
        }
        self.modals.lock().unwrap().push(modal);
        self.actions.lock().unwrap().push("modal");
        Ok(())
    }
}

pub fn authority(user_id: &str, position: i64, permissions: Permissions) -> MemberAuthority {
    MemberAuthority {
        user_id: user_id.to_string(),
        top_role_position: position,
        permissions,
        is_owner: false,
        is_bot: false,
    }
}

/// A guild with a moderator `mod` (position 5), a member `user` (position 1)
/// and the bot (position 10).
pub struct FakeGateway {
    pub members: HashMap<String, MemberAuthority>,
    pub bot: MemberAuthority,
    pub dm_fails: bool,
    pub nicknames: Mutex<Vec<(String, String)>>,
    pub direct_messages: Mutex<Vec<(String, String)>>,
    pub audit_log: Mutex<Vec<String>>,
    pub published: AtomicUsize,
}

impl Default for FakeGateway {
    fn default() -> Self {
        let mut members = HashMap::new();
        members.insert(
            "mod".to_string(),
            authority("mod", 5, Permissions::MODERATE_MEMBERS | Permissions::MANAGE_NICKNAMES),
        );
        members.insert("user".to_string(), authority("user", 1, Permissions::SEND_MESSAGES));
        members.insert("u1".to_string(), authority("u1", 0, Permissions::SEND_MESSAGES));

        FakeGateway {
            members,
            bot: authority("bot", 10, Permissions::ADMINISTRATOR),
            dm_fails: false,
            nicknames: Mutex::new(Vec::new()),
            direct_messages: Mutex::new(Vec::new()),
            audit_log: Mutex::new(Vec::new()),
            published: AtomicUsize::new(0),
        }
    }
}

impl FakeGateway {
    pub fn with_member(mut self, member: MemberAuthority) -> Self {
        self.members.insert(member.user_id.clone(), member);
        self
    }

    pub fn audit_entries(&self) -> Vec<String> {
        self.audit_log.lock().unwrap().clone()
    }

    pub fn sent_dms(&self) -> Vec<(String, String)> {
        self.direct_messages.lock().unwrap().clone()
    }

    pub fn nickname_changes(&self) -> Vec<(String, String)> {
        self.nicknames.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuildGateway for FakeGateway {
    async fn member_authority(&self, _guild_id: &str, user_id: &str) -> Result<MemberAuthority> {
        self.members
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown Member"))
    }

    async fn bot_authority(&self, _guild_id: &str) -> Result<MemberAuthority> {
        Ok(self.bot.clone())
    }

    async fn set_nickname(&self, _guild_id: &str, user_id: &str, nickname: &str) -> Result<()> {
        self.nicknames
            .lock()
            .unwrap()
            .push((user_id.to_string(), nickname.to_string()));
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()> {
        if self.dm_fails {
            return Err(anyhow!("Cannot send messages to this user"));
        }
        self.direct_messages
            .lock()
            .unwrap()
            .push((user_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn post_audit_log(&self, _guild_id: &str, content: &str) -> Result<()> {
        self.audit_log.lock().unwrap().push(content.to_string());
        Ok(())
    }

    async fn publish_commands(&self, definitions: Vec<CreateApplicationCommand>) -> Result<()> {
        self.published.fetch_add(definitions.len(), Ordering::SeqCst);
        Ok(())
    }
}

/// Context over an in-memory store with the given registry and gateway
pub async fn context(registry: HandlerRegistry, gateway: Arc<FakeGateway>) -> HandlerContext {
    HandlerContext {
        store: InfractionStore::open_in_memory().await.unwrap(),
        gateway,
        registry: Arc::new(registry),
    }
}
