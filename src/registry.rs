//! # Handler Registry
//!
//! Maps `(kind, key)` to the handler that serves it. The registry is filled
//! once at startup by [`HandlerRegistry::discover`] and is read-only
//! afterwards, so lookups need no locking.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//!
//! ## Changelog
//! - 1.1.0: Once-only event handlers
//! - 1.0.0: Static handler groups replace the hardcoded command match

use anyhow::Result;
use log::{debug, info, warn};
use serenity::async_trait;
use serenity::builder::CreateApplicationCommand;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::dispatcher::HandlerContext;
use crate::platform::{InboundEvent, CUSTOM_ID_SEPARATOR};

/// Discord caps command names at 32 characters
pub const MAX_COMMAND_KEY_LEN: usize = 32;
/// Discord caps component custom ids at 100 characters
pub const MAX_COMPONENT_KEY_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerKind {
    Command,
    Button,
    Modal,
    SelectMenu,
    Event,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Command => "command",
            HandlerKind::Button => "button",
            HandlerKind::Modal => "modal",
            HandlerKind::SelectMenu => "select_menu",
            HandlerKind::Event => "event",
        }
    }

    /// Kinds whose key is a component custom id
    pub fn is_component(&self) -> bool {
        matches!(
            self,
            HandlerKind::Button | HandlerKind::Modal | HandlerKind::SelectMenu
        )
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of logic bound to one inbound key.
///
/// # Example
///
/// ```ignore
/// pub struct PingCommand;
///
/// #[async_trait]
/// impl Handler for PingCommand {
///     fn key(&self) -> &str {
///         "ping"
///     }
///
///     fn kind(&self) -> HandlerKind {
///         HandlerKind::Command
///     }
///
///     async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
///         event.reply(Reply::public("🏓 Pong!")).await
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync {
    fn key(&self) -> &str;

    fn kind(&self) -> HandlerKind;

    /// Event handlers returning true fire for the first occurrence only
    fn once_only(&self) -> bool {
        false
    }

    /// Short description shown by `/help`
    fn description(&self) -> &str {
        ""
    }

    /// Application command definition published to Discord
    fn definition(&self) -> Option<CreateApplicationCommand> {
        None
    }

    async fn invoke(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("{kind} handler has an empty key")]
    EmptyKey { kind: HandlerKind },
    #[error("{kind} key '{key}' is invalid: {reason}")]
    InvalidKey {
        kind: HandlerKind,
        key: String,
        reason: &'static str,
    },
    #[error("{kind} key '{key}' is longer than {max} characters")]
    KeyTooLong {
        kind: HandlerKind,
        key: String,
        max: usize,
    },
    #[error("{kind} handler '{key}' is marked once-only, which only events support")]
    OnceOnlyNotEvent { kind: HandlerKind, key: String },
}

/// Check a handler's shape before it is admitted into the registry
pub fn validate(handler: &dyn Handler) -> Result<(), RegistrationError> {
    let key = handler.key();
    let kind = handler.kind();

    if key.trim().is_empty() {
        return Err(RegistrationError::EmptyKey { kind });
    }
    if key.contains(CUSTOM_ID_SEPARATOR) {
        return Err(RegistrationError::InvalidKey {
            kind,
            key: key.to_string(),
            reason: "contains the custom id separator",
        });
    }
    // context-menu command names may contain spaces
    if kind != HandlerKind::Command && key.chars().any(char::is_whitespace) {
        return Err(RegistrationError::InvalidKey {
            kind,
            key: key.to_string(),
            reason: "contains whitespace",
        });
    }

    let max = match kind {
        HandlerKind::Command => Some(MAX_COMMAND_KEY_LEN),
        HandlerKind::Button | HandlerKind::Modal | HandlerKind::SelectMenu => {
            Some(MAX_COMPONENT_KEY_LEN)
        }
        HandlerKind::Event => None,
    };
    if let Some(max) = max {
        if key.chars().count() > max {
            return Err(RegistrationError::KeyTooLong {
                kind,
                key: key.to_string(),
                max,
            });
        }
    }

    if handler.once_only() && kind != HandlerKind::Event {
        return Err(RegistrationError::OnceOnlyNotEvent {
            kind,
            key: key.to_string(),
        });
    }

    Ok(())
}

/// A handler admitted into the registry
pub struct RegisteredHandler {
    handler: Arc<dyn Handler>,
    spent: AtomicBool,
}

impl RegisteredHandler {
    fn new(handler: Arc<dyn Handler>) -> Self {
        RegisteredHandler {
            handler,
            spent: AtomicBool::new(false),
        }
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    pub fn key(&self) -> &str {
        self.handler.key()
    }

    pub fn kind(&self) -> HandlerKind {
        self.handler.kind()
    }

    pub fn once_only(&self) -> bool {
        self.handler.once_only()
    }

    /// Claim the right to run. Always succeeds for regular handlers; for
    /// once-only handlers only the first claim succeeds.
    pub fn claim(&self) -> bool {
        if !self.once_only() {
            return true;
        }
        !self.spent.swap(true, Ordering::SeqCst)
    }
}

/// A logical group of handlers produced at startup, e.g. all commands.
pub trait HandlerSource {
    fn group(&self) -> &str;

    /// Produce the group's candidates. An error skips the whole group.
    fn load(&self) -> Result<Vec<Arc<dyn Handler>>>;
}

/// A group backed by a plain constructor function
pub struct StaticSource {
    pub group: &'static str,
    pub handlers: fn() -> Vec<Arc<dyn Handler>>,
}

impl HandlerSource for StaticSource {
    fn group(&self) -> &str {
        self.group
    }

    fn load(&self) -> Result<Vec<Arc<dyn Handler>>> {
        Ok((self.handlers)())
    }
}

/// Outcome of a discovery pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// `(group, handlers loaded)` in discovery order
    pub loaded: Vec<(String, usize)>,
    pub skipped: usize,
    pub failed_groups: Vec<String>,
}

impl DiscoveryReport {
    pub fn total_loaded(&self) -> usize {
        self.loaded.iter().map(|(_, count)| count).sum()
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    entries: HashMap<HandlerKind, HashMap<String, RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every group, admitting valid handlers and skipping the rest.
    /// Neither a malformed handler nor a failing group stops discovery.
    pub fn discover(&mut self, sources: &[&dyn HandlerSource]) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for source in sources {
            let group = source.group().to_string();
            let candidates = match source.load() {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("⚠️ Could not load handler group '{}': {}", group, e);
                    report.failed_groups.push(group);
                    continue;
                }
            };

            let mut loaded = 0;
            for candidate in candidates {
                match self.register(candidate) {
                    Ok(()) => loaded += 1,
                    Err(e) => {
                        warn!("⚠️ Skipping handler in group '{}': {}", group, e);
                        report.skipped += 1;
                    }
                }
            }

            info!("📦 Loaded {} handler(s) from group '{}'", loaded, group);
            report.loaded.push((group, loaded));
        }

        report
    }

    /// Validate and insert a handler. An existing handler with the same kind
    /// and key is replaced.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<(), RegistrationError> {
        validate(handler.as_ref())?;

        let kind = handler.kind();
        let key = handler.key().to_string();
        debug!("Registering {} handler '{}'", kind, key);

        let previous = self
            .entries
            .entry(kind)
            .or_default()
            .insert(key.clone(), RegisteredHandler::new(handler));
        if previous.is_some() {
            warn!("🔁 {} handler '{}' was registered twice; keeping the latest", kind, key);
        }

        Ok(())
    }

    pub fn lookup(&self, key: &str, kind: HandlerKind) -> Option<&RegisteredHandler> {
        self.entries.get(&kind).and_then(|by_key| by_key.get(key))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: HandlerKind) -> usize {
        self.entries.get(&kind).map(HashMap::len).unwrap_or(0)
    }

    fn sorted(&self, kind: HandlerKind) -> Vec<&RegisteredHandler> {
        let mut handlers: Vec<_> = self
            .entries
            .get(&kind)
            .map(|by_key| by_key.values().collect())
            .unwrap_or_default();
        handlers.sort_by(|a, b| a.key().cmp(b.key()));
        handlers
    }

    /// Definitions of every registered command, sorted by name
    pub fn command_definitions(&self) -> Vec<CreateApplicationCommand> {
        self.sorted(HandlerKind::Command)
            .into_iter()
            .filter_map(|entry| entry.handler.definition())
            .collect()
    }

    /// `(name, description)` of commands that have a description
    pub fn commands(&self) -> Vec<(String, String)> {
        self.sorted(HandlerKind::Command)
            .into_iter()
            .filter(|entry| !entry.handler.description().is_empty())
            .map(|entry| {
                (
                    entry.key().to_string(),
                    entry.handler.description().to_string(),
                )
            })
            .collect()
    }
}
