pub mod authorization;
pub mod commands;
pub mod config;
pub mod discord;
pub mod dispatcher;
pub mod events;
pub mod formatting;
pub mod infractions;
pub mod platform;
pub mod rate_limiter;
pub mod registry;

#[cfg(test)]
pub mod testing;
