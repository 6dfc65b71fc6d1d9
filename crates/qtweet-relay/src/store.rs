//! Subscription persistence.
//!
//! File format: one pretty-printed JSON document, rewritten atomically
//! (temp file + rename) after every mutation:
//!
//! ```json
//! {
//!   "subscriptions": [
//!     { "channel": { "channelId": "123", "isDM": false, "guildId": "9" },
//!       "account": "someone", "subscribedAt": "2024-01-01T00:00:00Z" }
//!   ],
//!   "langs": { "9": "fr" }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use qtweet_core::{ChannelAddress, SerializedChannel};

// ─────────────────────────────────────────────
// Errors and results
// ─────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("subscription store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("subscription store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot subscribe an undeliverable channel")]
    Undeliverable,
}

/// What a removal did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemovalCounts {
    /// Subscriptions removed.
    pub subs: usize,
    /// Accounts that lost their last subscriber (no longer followed at all).
    pub users: usize,
}

/// What an insertion did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// A new subscription was stored (false: it already existed).
    pub added: bool,
    /// The account wasn't followed by anyone before.
    pub new_account: bool,
}

// ─────────────────────────────────────────────
// Store trait
// ─────────────────────────────────────────────

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn add(&self, channel: &ChannelAddress, account: &str) -> anyhow::Result<AddOutcome>;

    async fn remove(&self, channel: &ChannelAddress, account: &str)
        -> anyhow::Result<RemovalCounts>;

    /// Accounts a channel is subscribed to, sorted.
    async fn accounts_for(&self, channel: &ChannelAddress) -> Vec<String>;

    /// Channels subscribed to an account.
    async fn subscribers(&self, account: &str) -> Vec<ChannelAddress>;

    /// Every followed account, sorted and unique.
    async fn followed_accounts(&self) -> Vec<String>;

    /// Drop every subscription of a (deleted) guild channel.
    async fn rm_channel(&self, channel_id: &str) -> anyhow::Result<RemovalCounts>;

    /// Drop every subscription of a guild's channels.
    async fn rm_guild(&self, guild_id: &str) -> anyhow::Result<RemovalCounts>;

    /// Repair stored records. Returns how many records were dropped.
    async fn sanity_check(&self) -> anyhow::Result<usize>;

    /// Language of a guild, or the default one.
    async fn get_lang(&self, guild_id: Option<&str>) -> String;

    async fn set_lang(&self, guild_id: &str, lang: &str) -> anyhow::Result<()>;
}

/// Canonical account name: trimmed, without a leading `@`, lowercase.
pub fn normalize_account(account: &str) -> String {
    account.trim().trim_start_matches('@').to_lowercase()
}

// ─────────────────────────────────────────────
// On-disk records
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub channel: SerializedChannel,
    pub account: String,
    #[serde(default = "Utc::now")]
    pub subscribed_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    fn matches(&self, channel: &ChannelAddress) -> bool {
        self.channel.is_dm == channel.is_dm()
            && self.channel.channel_id.as_deref() == channel.id()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoreFile {
    subscriptions: Vec<SubscriptionRecord>,
    langs: BTreeMap<String, String>,
}

impl StoreFile {
    fn accounts(&self) -> BTreeSet<String> {
        self.subscriptions.iter().map(|r| r.account.clone()).collect()
    }

    /// Remove records matching `predicate` and count what went away.
    fn remove_where(&mut self, predicate: impl Fn(&SubscriptionRecord) -> bool) -> RemovalCounts {
        let accounts_before = self.accounts().len();
        let subs_before = self.subscriptions.len();
        self.subscriptions.retain(|r| !predicate(r));
        RemovalCounts {
            subs: subs_before - self.subscriptions.len(),
            users: accounts_before - self.accounts().len(),
        }
    }
}

// ─────────────────────────────────────────────
// JsonSubscriptionStore
// ─────────────────────────────────────────────

/// Subscription store backed by a single JSON file.
pub struct JsonSubscriptionStore {
    path: PathBuf,
    default_lang: String,
    state: Mutex<StoreFile>,
}

impl JsonSubscriptionStore {
    /// Open (or start) the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>, default_lang: impl Into<String>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => StoreFile::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No subscription file at {}, starting empty", path.display());
                StoreFile::default()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        debug!(
            path = %path.display(),
            subscriptions = state.subscriptions.len(),
            "subscription store opened"
        );

        Ok(Self {
            path,
            default_lang: default_lang.into(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored subscriptions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.subscriptions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, state: &StoreFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for JsonSubscriptionStore {
    async fn add(&self, channel: &ChannelAddress, account: &str) -> anyhow::Result<AddOutcome> {
        if !channel.is_deliverable() {
            return Err(StoreError::Undeliverable.into());
        }
        let account = normalize_account(account);
        let mut state = self.state.lock().await;

        if state
            .subscriptions
            .iter()
            .any(|r| r.account == account && r.matches(channel))
        {
            return Ok(AddOutcome {
                added: false,
                new_account: false,
            });
        }

        let new_account = !state.subscriptions.iter().any(|r| r.account == account);
        state.subscriptions.push(SubscriptionRecord {
            channel: channel.serialize(),
            account,
            subscribed_at: Utc::now(),
        });
        self.persist(&state).await?;

        Ok(AddOutcome {
            added: true,
            new_account,
        })
    }

    async fn remove(
        &self,
        channel: &ChannelAddress,
        account: &str,
    ) -> anyhow::Result<RemovalCounts> {
        let account = normalize_account(account);
        let mut state = self.state.lock().await;
        let counts = state.remove_where(|r| r.account == account && r.matches(channel));
        if counts.subs > 0 {
            self.persist(&state).await?;
        }
        Ok(counts)
    }

    async fn accounts_for(&self, channel: &ChannelAddress) -> Vec<String> {
        let state = self.state.lock().await;
        let accounts: BTreeSet<String> = state
            .subscriptions
            .iter()
            .filter(|r| r.matches(channel))
            .map(|r| r.account.clone())
            .collect();
        accounts.into_iter().collect()
    }

    async fn subscribers(&self, account: &str) -> Vec<ChannelAddress> {
        let account = normalize_account(account);
        let state = self.state.lock().await;
        state
            .subscriptions
            .iter()
            .filter(|r| r.account == account)
            .map(|r| ChannelAddress::unserialize(&r.channel))
            .collect()
    }

    async fn followed_accounts(&self) -> Vec<String> {
        self.state.lock().await.accounts().into_iter().collect()
    }

    async fn rm_channel(&self, channel_id: &str) -> anyhow::Result<RemovalCounts> {
        let mut state = self.state.lock().await;
        let counts = state.remove_where(|r| {
            !r.channel.is_dm && r.channel.channel_id.as_deref() == Some(channel_id)
        });
        if counts.subs > 0 {
            self.persist(&state).await?;
        }
        Ok(counts)
    }

    async fn rm_guild(&self, guild_id: &str) -> anyhow::Result<RemovalCounts> {
        let mut state = self.state.lock().await;
        let counts = state.remove_where(|r| {
            !r.channel.is_dm && r.channel.guild_id.as_deref() == Some(guild_id)
        });
        let had_lang = state.langs.remove(guild_id).is_some();
        if counts.subs > 0 || had_lang {
            self.persist(&state).await?;
        }
        Ok(counts)
    }

    async fn sanity_check(&self) -> anyhow::Result<usize> {
        let mut state = self.state.lock().await;
        let before = state.subscriptions.len();
        let mut changed = false;
        let mut seen = HashSet::new();

        let records = std::mem::take(&mut state.subscriptions);
        for mut record in records {
            let id_present = record
                .channel
                .channel_id
                .as_deref()
                .is_some_and(|id| !id.trim().is_empty());
            let account = normalize_account(&record.account);
            if !id_present || account.is_empty() {
                continue;
            }
            if account != record.account {
                record.account = account;
                changed = true;
            }
            if record.channel.is_dm && record.channel.guild_id.is_some() {
                record.channel.guild_id = None;
                changed = true;
            }
            let key = (
                record.channel.channel_id.clone(),
                record.channel.is_dm,
                record.account.clone(),
            );
            if seen.insert(key) {
                state.subscriptions.push(record);
            }
        }

        let removed = before - state.subscriptions.len();
        if removed > 0 || changed {
            self.persist(&state).await?;
        }
        info!(
            removed = removed,
            remaining = state.subscriptions.len(),
            "subscription sanity check done"
        );
        Ok(removed)
    }

    async fn get_lang(&self, guild_id: Option<&str>) -> String {
        let Some(guild_id) = guild_id else {
            return self.default_lang.clone();
        };
        self.state
            .lock()
            .await
            .langs
            .get(guild_id)
            .cloned()
            .unwrap_or_else(|| self.default_lang.clone())
    }

    async fn set_lang(&self, guild_id: &str, lang: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.langs.insert(guild_id.to_string(), lang.to_string());
        self.persist(&state).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
