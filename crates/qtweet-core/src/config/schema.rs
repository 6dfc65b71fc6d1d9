//! Configuration schema.
//!
//! Hierarchy: `Config` → `DiscordConfig`, `BotConfig`, `BackoffConfig`,
//! `CommandsConfig`, `StorageConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffMode;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.qtweet/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub bot: BotConfig,
    pub reconnect: BackoffConfig,
    pub commands: CommandsConfig,
    pub storage: StorageConfig,
}

// ─────────────────────────────────────────────
// Discord
// ─────────────────────────────────────────────

/// Chat client connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscordConfig {
    /// Bot token from the Discord Developer Portal.
    pub token: String,
    /// REST API base URL.
    pub api_base: String,
    /// Gateway WebSocket URL.
    pub gateway_url: String,
    /// Gateway intents bitmask.
    pub intents: u64,
}

impl DiscordConfig {
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://discord.com/api/v10".to_string(),
            gateway_url: "wss://gateway.discord.gg/?v=10&encoding=json".to_string(),
            // GUILDS(1) + GUILD_MESSAGES(512) + DIRECT_MESSAGES(4096) + MESSAGE_CONTENT(32768)
            intents: 1 + 512 + 4096 + 32768,
        }
    }
}

// ─────────────────────────────────────────────
// Bot
// ─────────────────────────────────────────────

/// Chat-facing behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    /// Command prefix (e.g. `!` in `!start someone`).
    pub prefix: String,
    /// Link shown in the help panel header.
    pub profile_url: String,
    /// Language used when a guild never set one.
    pub default_lang: String,
    /// Credited in the help panel footer.
    pub help_artist: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            profile_url: String::new(),
            default_lang: crate::i18n::DEFAULT_LANG.to_string(),
            help_artist: "ryusukehamamoto".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Reconnect backoff
// ─────────────────────────────────────────────

/// Reconnection delay policy for the chat client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    pub mode: BackoffMode,
    pub start_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            mode: BackoffMode::Exponential,
            start_ms: 1000,
            max_ms: 60000,
        }
    }
}

// ─────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandsConfig {
    /// How long a command waits for its checks. `0` waits forever.
    pub check_timeout_secs: u64,
}

impl CommandsConfig {
    pub fn check_timeout(&self) -> Option<std::time::Duration> {
        (self.check_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.check_timeout_secs))
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: 30,
        }
    }
}

// ─────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Subscription store file (`~` is expanded).
    pub subscriptions_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            subscriptions_path: "~/.qtweet/subscriptions.json".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.bot.default_lang, "en");
        assert_eq!(config.reconnect.start_ms, 1000);
        assert_eq!(config.reconnect.max_ms, 60000);
        assert_eq!(config.reconnect.mode, BackoffMode::Exponential);
        assert_eq!(config.discord.intents, 37377);
        assert!(!config.discord.is_configured());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "bot": { "prefix": "?" }, "reconnect": { "mode": "linear" } }"#,
        )
        .unwrap();
        assert_eq!(config.bot.prefix, "?");
        assert_eq!(config.bot.default_lang, "en");
        assert_eq!(config.reconnect.mode, BackoffMode::Linear);
        assert_eq!(config.reconnect.max_ms, 60000);
    }

    #[test]
    fn test_check_timeout() {
        let mut commands = CommandsConfig::default();
        assert_eq!(commands.check_timeout(), Some(std::time::Duration::from_secs(30)));
        commands.check_timeout_secs = 0;
        assert_eq!(commands.check_timeout(), None);
    }

    #[test]
    fn test_camel_case_keys() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["bot"].get("profileUrl").is_some());
        assert!(json["reconnect"].get("startMs").is_some());
        assert!(json["storage"].get("subscriptionsPath").is_some());
        assert_eq!(json["reconnect"]["mode"], "exponential");
    }
}
