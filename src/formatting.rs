//! Message text for infraction listings, audit log entries and DM notices.

use crate::infractions::{Infraction, InfractionKind};

/// Discord rejects message content longer than this
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Lines shown by an infraction listing before it is cut off
pub const MAX_LISTED_INFRACTIONS: usize = 10;

pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

/// Cut `content` to the message limit on a character boundary
pub fn truncate_message(content: &str) -> String {
    if content.chars().count() <= MAX_MESSAGE_LEN {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(MAX_MESSAGE_LEN - 1).collect();
    truncated.push('…');
    truncated
}

fn kind_emoji(kind: InfractionKind) -> &'static str {
    match kind {
        InfractionKind::Warn => "⚠️",
        InfractionKind::Mute => "🔇",
        InfractionKind::Kick => "👢",
        InfractionKind::Ban => "🔨",
        InfractionKind::Timeout => "⏱️",
    }
}

pub fn infraction_line(infraction: &Infraction) -> String {
    format!(
        "{} `{}` **{}** <t:{}:R> by {}\n> {}",
        kind_emoji(infraction.kind),
        infraction.id,
        infraction.kind,
        infraction.created_at.timestamp(),
        mention(&infraction.moderator_id),
        infraction.reason
    )
}

pub fn infraction_list(
    user_id: &str,
    infractions: &[Infraction],
    filter: Option<InfractionKind>,
) -> String {
    let scope = match filter {
        Some(kind) => format!("{} infractions", kind),
        None => "Infractions".to_string(),
    };

    if infractions.is_empty() {
        return format!("✅ {} has no recorded {}.", mention(user_id), scope.to_lowercase());
    }

    let mut output = format!(
        "📋 **{} for {}** ({} total)\n\n",
        scope,
        mention(user_id),
        infractions.len()
    );
    for infraction in infractions.iter().take(MAX_LISTED_INFRACTIONS) {
        output.push_str(&infraction_line(infraction));
        output.push('\n');
    }
    if infractions.len() > MAX_LISTED_INFRACTIONS {
        output.push_str(&format!(
            "\n*+{} more*",
            infractions.len() - MAX_LISTED_INFRACTIONS
        ));
    }

    truncate_message(&output)
}

pub fn infraction_detail(infraction: &Infraction) -> String {
    format!(
        "{} **Infraction `{}`**\n**Type:** {}\n**User:** {}\n**Moderator:** {}\n**When:** <t:{}:F>\n**Reason:** {}",
        kind_emoji(infraction.kind),
        infraction.id,
        infraction.kind,
        mention(&infraction.user_id),
        mention(&infraction.moderator_id),
        infraction.created_at.timestamp(),
        infraction.reason
    )
}

pub fn audit_entry(action: &str, moderator_id: &str, target_id: &str, details: &str) -> String {
    truncate_message(&format!(
        "🛡️ **{}** | {} → {}\n{}",
        action,
        mention(moderator_id),
        mention(target_id),
        details
    ))
}

pub fn warning_dm(reason: &str, infraction_id: &str, warning_count: i64) -> String {
    truncate_message(&format!(
        "⚠️ You have received a warning.\n**Reason:** {}\n**Infraction ID:** `{}`\nThis is warning #{}.",
        reason, infraction_id, warning_count
    ))
}
