//! # Authorization
//!
//! Role hierarchy and permission checks shared by moderation commands.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use serenity::model::permissions::Permissions;
use thiserror::Error;

/// What the guild lets a member do, resolved from their roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAuthority {
    pub user_id: String,
    /// Position of the member's highest role; 0 for `@everyone` only
    pub top_role_position: i64,
    pub permissions: Permissions,
    pub is_owner: bool,
    pub is_bot: bool,
}

impl MemberAuthority {
    /// Administrators and owners implicitly hold every permission
    pub fn has(&self, required: Permissions) -> bool {
        self.is_owner
            || self.permissions.contains(Permissions::ADMINISTRATOR)
            || self.permissions.contains(required)
    }
}

/// Why a moderation action was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("You need the {0} permission to do that.")]
    MissingPermission(String),
    #[error("You can't use this on yourself.")]
    SelfTarget,
    #[error("The server owner can't be moderated.")]
    TargetIsOwner,
    #[error("That member's highest role is equal to or above yours.")]
    TargetOutranksActor,
    #[error("I need the {0} permission to do that.")]
    BotMissingPermission(String),
    #[error("That member's highest role is equal to or above mine.")]
    TargetOutranksBot,
}

fn permission_name(required: Permissions) -> String {
    required
        .get_permission_names()
        .first()
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("{:?}", required))
}

/// Check whether `actor` may moderate `target`.
///
/// `bot` is only given for actions the bot performs on the platform itself
/// (e.g. editing a nickname); ledger-only actions skip the bot checks.
pub fn check_moderation(
    actor: &MemberAuthority,
    target: &MemberAuthority,
    bot: Option<&MemberAuthority>,
    required: Permissions,
) -> Result<(), Denial> {
    if !actor.has(required) {
        return Err(Denial::MissingPermission(permission_name(required)));
    }
    if actor.user_id == target.user_id {
        return Err(Denial::SelfTarget);
    }
    if target.is_owner {
        return Err(Denial::TargetIsOwner);
    }
    if !actor.is_owner && target.top_role_position >= actor.top_role_position {
        return Err(Denial::TargetOutranksActor);
    }

    if let Some(bot) = bot {
        if !bot.has(required) {
            return Err(Denial::BotMissingPermission(permission_name(required)));
        }
        if target.top_role_position >= bot.top_role_position {
            return Err(Denial::TargetOutranksBot);
        }
    }

    Ok(())
}
