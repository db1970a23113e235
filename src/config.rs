use anyhow::{anyhow, Result};
use std::env;
use std::str::FromStr;

pub const DEFAULT_DATABASE_PATH: &str = "data/infractions.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_path: String,
    pub log_level: String,
    /// Channel that receives moderation audit entries
    pub audit_log_channel_id: Option<u64>,
    /// Publish commands to this guild only (instant updates while developing)
    pub dev_guild_id: Option<u64>,
    pub rate_limit_max: usize,
    pub rate_limit_window_secs: u64,
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value: {}", name, raw)),
        _ => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow!("DISCORD_TOKEN environment variable not set"))?,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            audit_log_channel_id: parse_var("AUDIT_LOG_CHANNEL_ID")?,
            dev_guild_id: parse_var("DEV_GUILD_ID")?,
            rate_limit_max: parse_var("RATE_LIMIT_MAX")?.unwrap_or(10),
            rate_limit_window_secs: parse_var("RATE_LIMIT_WINDOW_SECS")?.unwrap_or(60),
        })
    }
}
