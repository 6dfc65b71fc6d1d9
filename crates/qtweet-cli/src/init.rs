//! `qtweet init` — write the default configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use qtweet_core::config::{get_config_path, save_config, Config};

use crate::helpers::display_path;

/// Run the init command.
pub fn run(config_path: Option<&Path>, force: bool) -> Result<()> {
    println!();
    println!("{}", "QTweet — Setup".cyan().bold());
    println!();

    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if write_default(&path, force)? {
        println!("  {} created config at {}", "✓".green(), display_path(&path));
    } else {
        println!(
            "  {} config already exists at {} (use --force to overwrite)",
            "✓".green(),
            display_path(&path)
        );
    }

    println!();
    println!(
        "{}",
        "  Set discord.token (or QTWEET_DISCORD__TOKEN), then run `qtweet run`.".green()
    );
    println!();
    Ok(())
}

/// Write `Config::default()` to `path`. Returns `false` when a file exists
/// and `force` is off.
fn write_default(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    // Defaults only: env overrides (the token) never end up on disk
    save_config(&Config::default(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
