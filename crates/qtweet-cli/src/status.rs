//! `qtweet status` — show configuration and subscription status.

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use qtweet_core::config::{get_config_path, load_config};
use qtweet_core::utils::expand_home;
use qtweet_core::Localizer;
use qtweet_relay::{JsonSubscriptionStore, SubscriptionStore};

use crate::helpers::display_path;

/// Run the status command.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    println!();
    println!("{}", "QTweet Status".cyan().bold());
    println!();

    println!(
        "  {:<16} {} {}",
        "Config:".bold(),
        display_path(&path),
        found(path.exists())
    );

    let token = if config.discord.is_configured() {
        format!("{} (set)", "✓".green())
    } else {
        format!("{}", "· not configured".dimmed())
    };
    println!("  {:<16} {}", "Discord token:".bold(), token);
    println!("  {:<16} {}", "Prefix:".bold(), config.bot.prefix);
    println!(
        "  {:<16} {} {}",
        "Language:".bold(),
        config.bot.default_lang,
        format!("(available: {})", Localizer::builtin().languages().join(", ")).dimmed()
    );
    println!(
        "  {:<16} {:?} {}",
        "Reconnect:".bold(),
        config.reconnect.mode,
        format!("{}ms → {}ms", config.reconnect.start_ms, config.reconnect.max_ms).dimmed()
    );

    // Subscriptions
    println!();
    let store_path = expand_home(&config.storage.subscriptions_path);
    println!(
        "  {:<16} {} {}",
        "Store:".bold(),
        display_path(&store_path),
        found(store_path.exists())
    );
    match JsonSubscriptionStore::open(&store_path, config.bot.default_lang.clone()).await {
        Ok(store) => {
            let accounts = store.followed_accounts().await;
            println!("  {:<16} {}", "Subscriptions:".bold(), store.len().await);
            println!("  {:<16} {}", "Accounts:".bold(), accounts.len());
            for account in accounts {
                println!("    {} @{}", "·".dimmed(), account);
            }
        }
        Err(e) => println!("  {:<16} {}", "Subscriptions:".bold(), e.to_string().red()),
    }

    println!();
    Ok(())
}

fn found(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}
