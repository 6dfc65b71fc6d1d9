//! Config loader — reads `~/.qtweet/config.json`, merges env vars, and
//! applies legacy migrations.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.qtweet/config.json`
//! 3. Environment variables `QTWEET_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    // Parse JSON → Value first for migration
    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// The flat layout `{"prefix": "!", "profileURL": "..."}` is moved under
/// `bot`. Values already present under `bot` win.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(root) = raw.as_object_mut() else {
        return;
    };

    let moves = [("prefix", "prefix"), ("profileURL", "profileUrl")];
    for (legacy, current) in moves {
        let Some(value) = root.remove(legacy) else {
            continue;
        };
        let bot = root
            .entry("bot")
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let Some(bot) = bot.as_object_mut() {
            if !bot.contains_key(current) {
                bot.insert(current.to_string(), value);
                debug!("Migrated {legacy} → bot.{current}");
            }
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `QTWEET_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `QTWEET_DISCORD__TOKEN` → `discord.token`
/// - `QTWEET_BOT__PREFIX` → `bot.prefix`
/// - `QTWEET_BOT__DEFAULT_LANG` → `bot.default_lang`
/// - `QTWEET_RECONNECT__MODE` → `reconnect.mode`
/// - `QTWEET_RECONNECT__START_MS` → `reconnect.start_ms`
/// - `QTWEET_RECONNECT__MAX_MS` → `reconnect.max_ms`
/// - `QTWEET_COMMANDS__CHECK_TIMEOUT_SECS` → `commands.check_timeout_secs`
/// - `QTWEET_STORAGE__SUBSCRIPTIONS_PATH` → `storage.subscriptions_path`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("QTWEET_DISCORD__TOKEN") {
        config.discord.token = val;
    }

    if let Ok(val) = std::env::var("QTWEET_BOT__PREFIX") {
        if !val.is_empty() {
            config.bot.prefix = val;
        }
    }
    if let Ok(val) = std::env::var("QTWEET_BOT__DEFAULT_LANG") {
        config.bot.default_lang = val;
    }

    if let Ok(val) = std::env::var("QTWEET_RECONNECT__MODE") {
        match val.parse() {
            Ok(mode) => config.reconnect.mode = mode,
            Err(e) => warn!("Ignoring QTWEET_RECONNECT__MODE: {}", e),
        }
    }
    if let Ok(val) = std::env::var("QTWEET_RECONNECT__START_MS") {
        if let Ok(n) = val.parse::<u64>() {
            config.reconnect.start_ms = n;
        }
    }
    if let Ok(val) = std::env::var("QTWEET_RECONNECT__MAX_MS") {
        if let Ok(n) = val.parse::<u64>() {
            config.reconnect.max_ms = n;
        }
    }

    if let Ok(val) = std::env::var("QTWEET_COMMANDS__CHECK_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.commands.check_timeout_secs = n;
        }
    }

    if let Ok(val) = std::env::var("QTWEET_STORAGE__SUBSCRIPTIONS_PATH") {
        config.storage.subscriptions_path = val;
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.reconnect.start_ms, 1000);
        assert_eq!(config.bot.prefix, "!");
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "bot": { "prefix": "q!", "profileUrl": "https://example.com/qtweet" },
            "reconnect": { "mode": "constant", "startMs": 500 }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.bot.prefix, "q!");
        assert_eq!(config.bot.profile_url, "https://example.com/qtweet");
        assert_eq!(config.reconnect.mode, BackoffMode::Constant);
        assert_eq!(config.reconnect.start_ms, 500);
        // Default preserved
        assert_eq!(config.reconnect.max_ms, 60000);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.commands.check_timeout_secs, 30);
    }

    #[test]
    fn test_load_wrong_types_returns_defaults() {
        let file = write_temp_json(r#"{ "reconnect": { "startMs": "soon" } }"#);
        let config = load_config_from_path(file.path());
        assert_eq!(config.reconnect.start_ms, 1000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.bot.prefix = "$".to_string();
        config.discord.token = "test-token".to_string();

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.bot.prefix, "$");
        assert_eq!(reloaded.discord.token, "test-token");
    }

    #[test]
    fn test_migrate_flat_layout() {
        let file = write_temp_json(
            r#"{
            "prefix": "!!",
            "profileURL": "https://example.com/profile"
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.bot.prefix, "!!");
        assert_eq!(config.bot.profile_url, "https://example.com/profile");
    }

    #[test]
    fn test_migrate_no_overwrite() {
        let file = write_temp_json(
            r#"{
            "prefix": "!!",
            "bot": { "prefix": "?" }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.bot.prefix, "?");
    }

    #[test]
    fn test_discord_section_from_module_root() {
        let discord: crate::config::DiscordConfig = Config::default().discord;
        assert!(!discord.is_configured());
        assert!(discord.api_base.ends_with("/v10"));
    }

    #[test]
    fn test_env_override_token() {
        std::env::set_var("QTWEET_DISCORD__TOKEN", "env-token");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.discord.token, "env-token");
        std::env::remove_var("QTWEET_DISCORD__TOKEN");
    }

    #[test]
    fn test_env_override_reconnect() {
        std::env::set_var("QTWEET_RECONNECT__MODE", "linear");
        std::env::set_var("QTWEET_RECONNECT__MAX_MS", "5000");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.reconnect.mode, BackoffMode::Linear);
        assert_eq!(config.reconnect.max_ms, 5000);
        std::env::remove_var("QTWEET_RECONNECT__MODE");
        std::env::remove_var("QTWEET_RECONNECT__MAX_MS");
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert!(raw["commands"].get("checkTimeoutSecs").is_some());
        assert!(raw["commands"].get("check_timeout_secs").is_none());
    }
}
