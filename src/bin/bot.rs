use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use serenity::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use bailiff::commands;
use bailiff::config::Config;
use bailiff::discord::DiscordHandler;
use bailiff::dispatcher::Dispatcher;
use bailiff::infractions::InfractionStore;
use bailiff::rate_limiter::RateLimiter;
use bailiff::registry::{HandlerRegistry, HandlerSource};

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Bailiff moderation bot...");

    let store = InfractionStore::open(&config.database_path).await?;
    info!("🗄️ Infraction store ready at {}", config.database_path);

    let mut registry = HandlerRegistry::new();
    let sources = commands::sources();
    let source_refs: Vec<&dyn HandlerSource> = sources.iter().map(|s| s as &dyn HandlerSource).collect();
    let report = registry.discover(&source_refs);
    info!(
        "📦 Discovered {} handler(s), skipped {}",
        report.total_loaded(),
        report.skipped
    );
    if !report.failed_groups.is_empty() {
        warn!("⚠️ Handler groups that failed to load: {:?}", report.failed_groups);
    }

    let rate_limiter = RateLimiter::new(
        config.rate_limit_max,
        Duration::from_secs(config.rate_limit_window_secs),
    );
    let dispatcher = Dispatcher::new(Arc::new(registry), store.clone(), rate_limiter);
    let handler = DiscordHandler::new(
        Arc::new(dispatcher),
        config.audit_log_channel_id,
        config.dev_guild_id,
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {}", e);
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    let shard_manager = client.shard_manager.clone();
    let signal_store = store.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutting down...");
        signal_store.close().await;
        shard_manager.lock().await.shutdown_all().await;
    });

    info!("Connecting to Discord gateway with intents: {:?}", intents);

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {:?}", why);
        store.close().await;
        return Err(anyhow::anyhow!("Failed to establish gateway connection: {}", why));
    }

    store.close().await;
    info!("👋 Bailiff stopped");
    Ok(())
}
