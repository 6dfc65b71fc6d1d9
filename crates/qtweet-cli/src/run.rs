//! `qtweet run` — wires the Discord client, relay and feed together.
//!
//! Startup sequence:
//! 1. Load config, open the subscription store
//! 2. Create the Discord client (and its event receiver)
//! 3. Build poster, feed stream, command registry, pipeline
//! 4. Log in through the supervisor (retries with backoff)
//! 5. Route events until Ctrl+C

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tracing::{error, info};

use qtweet_core::config::load_config;
use qtweet_core::utils::expand_home;
use qtweet_core::{Backoff, Localizer};
use qtweet_discord::DiscordClient;
use qtweet_relay::{
    AuthorizationPipeline, ChatClient, CommandContext, CommandRegistry, ConnectionSupervisor,
    EventRouter, FeedStream, IdleConnector, JsonSubscriptionStore, Poster, RouterSettings, StreamManager,
    SubscriptionStore,
};

use crate::helpers;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    helpers::print_banner();

    let config = load_config(config_path);
    if !config.discord.is_configured() {
        anyhow::bail!(
            "no Discord token configured (set discord.token or QTWEET_DISCORD__TOKEN)"
        );
    }

    let store_path = expand_home(&config.storage.subscriptions_path);
    let store = Arc::new(
        JsonSubscriptionStore::open(&store_path, config.bot.default_lang.clone())
            .await
            .with_context(|| format!("failed to open {}", store_path.display()))?,
    );
    let store_dyn: Arc<dyn SubscriptionStore> = store.clone();

    let (discord, events) =
        DiscordClient::new(&config.discord).context("failed to create Discord client")?;
    let discord = Arc::new(discord);
    let chat: Arc<dyn ChatClient> = discord.clone();

    let poster = Arc::new(Poster::new(
        chat.clone(),
        store_dyn.clone(),
        Arc::new(Localizer::builtin().with_fallback(&config.bot.default_lang)),
    ));
    let feed = Arc::new(StreamManager::new(
        store_dyn.clone(),
        poster.clone(),
        Arc::new(IdleConnector),
    ));

    let ctx = CommandContext {
        chat: chat.clone(),
        store: store_dyn,
        poster,
        feed: feed.clone(),
    };
    let registry = Arc::new(CommandRegistry::with_builtins());
    let pipeline = Arc::new(
        AuthorizationPipeline::new(registry.clone(), ctx)
            .with_check_timeout(config.commands.check_timeout()),
    );
    let supervisor = Arc::new(ConnectionSupervisor::new(
        chat,
        Backoff::from_config(&config.reconnect),
    ));
    let router = Arc::new(EventRouter::new(
        RouterSettings::from_config(&config),
        pipeline,
        supervisor.clone(),
    ));

    info!(
        prefix = %config.bot.prefix,
        commands = ?registry.names(),
        subscriptions = store.len().await,
        store = %store_path.display(),
        "relay starting"
    );

    println!("  Prefix:        {}", config.bot.prefix);
    println!("  Commands:      {}", registry.names().join(", "));
    println!("  Subscriptions: {}", store.len().await);
    println!("  Store:         {}", helpers::display_path(&store_path));
    println!();
    println!("  Ctrl+C to stop");
    println!();

    let shutdown = Arc::new(Notify::new());
    let router_task = tokio::spawn(router.run(events, shutdown.clone()));
    supervisor.spawn_login();

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "failed to listen for Ctrl+C, shutting down"),
    }

    println!();
    println!("  Shutting down...");
    supervisor.stop();
    feed.destroy_stream().await;
    discord.shutdown();
    shutdown.notify_waiters();
    if let Err(e) = router_task.await {
        error!(error = %e, "event router task failed");
    }

    println!("  Stopped. Goodbye!");
    Ok(())
}
