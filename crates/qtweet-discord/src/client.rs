//! Discord client — REST for sending, the gateway for events.
//!
//! `login()` checks the token (`GET /users/@me`), then starts a gateway
//! session and waits until it is READY. A session lost afterwards surfaces
//! as a `ChatEvent::Error`; calling `login()` again starts a new one
//! (resuming when Discord allows it).
//!
//! REST features:
//! - Message chunking for >2000 char messages
//! - Rate-limit retry (HTTP 429)
//! - DM channel cache per user

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use qtweet_core::config::DiscordConfig;
use qtweet_core::types::{ChannelInfo, Embed, GuildInfo, IncomingMessage};
use qtweet_core::{ChatEvent, Permissions};
use qtweet_relay::ChatClient;

use crate::cache::channel_from_wire;
use crate::error::DiscordError;
use crate::gateway::GatewayState;

/// Discord message length limit.
const DISCORD_MAX_LEN: usize = 2000;

/// Buffered gateway events.
const EVENT_BUFFER: usize = 256;

const MAX_SEND_ATTEMPTS: u32 = 3;

const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DiscordClient {
    token: String,
    api_base: String,
    http: reqwest::Client,
    state: Arc<GatewayState>,
    dm_channels: Mutex<HashMap<String, String>>,
    login_timeout: Duration,
}

impl DiscordClient {
    /// Build a client and the receiver its gateway events arrive on.
    pub fn new(config: &DiscordConfig) -> Result<(Self, mpsc::Receiver<ChatEvent>), DiscordError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let client = Self {
            token: config.token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http,
            state: Arc::new(GatewayState::new(config, tx)),
            dm_channels: Mutex::new(HashMap::new()),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        };
        Ok((client, rx))
    }

    /// How long `login()` waits for the gateway to become ready.
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Close the gateway session, if any.
    pub fn shutdown(&self) {
        self.state.shutdown.notify_waiters();
    }

    /// Number of guilds currently cached.
    pub async fn guild_count(&self) -> usize {
        self.state.cache.read().await.guild_count()
    }

    /// Check the token and return the bot's user id.
    pub async fn fetch_current_user(&self) -> Result<String, DiscordError> {
        let resp = self
            .http
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(DiscordError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DiscordError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let user: Value = resp.json().await?;
        user["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DiscordError::Gateway("user without id".into()))
    }

    /// POST JSON with retry on rate-limit. Returns the response body.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, DiscordError> {
        let url = format!("{}{path}", self.api_base);

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .json(body)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                if text.is_empty() {
                    return Ok(Value::Null);
                }
                return Ok(serde_json::from_str(&text)?);
            }

            if status.as_u16() == 429 {
                let body_text = resp.text().await.unwrap_or_default();
                let retry_after: f64 = serde_json::from_str::<Value>(&body_text)
                    .ok()
                    .and_then(|v| v["retry_after"].as_f64())
                    .unwrap_or(1.0);
                warn!(
                    retry_after_s = retry_after,
                    attempt = attempts,
                    "discord rate limited"
                );
                tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                continue;
            }

            if attempts >= MAX_SEND_ATTEMPTS || status.is_client_error() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DiscordError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            warn!(status = %status, attempt = attempts, "discord send error, retrying in 1s");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn send_chunks(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), DiscordError> {
        let path = format!("/channels/{channel_id}/messages");
        let chunks = split_message(content, DISCORD_MAX_LEN);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({ "content": chunk });
            // Only the first chunk is a reply
            if let (0, Some(message_id)) = (i, reply_to) {
                body["message_reference"] = json!({ "message_id": message_id });
                body["allowed_mentions"] = json!({ "replied_user": false });
            }
            self.post_json(&path, &body).await?;
        }

        debug!(channel = %channel_id, chunks = chunks.len(), "discord message sent");
        Ok(())
    }
}

#[async_trait]
impl ChatClient for DiscordClient {
    async fn login(&self) -> anyhow::Result<()> {
        if self.token.is_empty() {
            return Err(DiscordError::MissingToken.into());
        }

        let user_id = self.fetch_current_user().await?;
        *self.state.user_id.write().await = Some(user_id);

        if self.state.running.swap(true, Ordering::SeqCst) {
            debug!("discord gateway already running");
            return Ok(());
        }

        info!("starting discord gateway (v10)");
        let ready = self.state.arm_ready_signal().await;
        let state = self.state.clone();
        tokio::spawn(async move { state.run().await });

        match tokio::time::timeout(self.login_timeout, ready).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(DiscordError::Gateway(e).into()),
            Ok(Err(_)) => Err(DiscordError::Gateway("session dropped before ready".into()).into()),
            Err(_) => {
                self.shutdown();
                Err(DiscordError::Timeout(self.login_timeout).into())
            }
        }
    }

    async fn current_user_id(&self) -> Option<String> {
        self.state.user_id.read().await.clone()
    }

    async fn channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        if let Some(channel) = self.state.cache.read().await.channel(channel_id) {
            return Some(channel);
        }

        let resp = self
            .http
            .get(format!("{}/channels/{channel_id}", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let data: Value = resp.json().await.ok()?;
        channel_from_wire(&data)
    }

    async fn guild(&self, guild_id: &str) -> Option<GuildInfo> {
        self.state.cache.read().await.guild(guild_id)
    }

    async fn permissions_in(&self, channel_id: &str, user_id: &str) -> Option<Permissions> {
        self.state
            .cache
            .read()
            .await
            .permissions_in(channel_id, user_id)
    }

    async fn dm_channel(&self, user_id: &str) -> anyhow::Result<String> {
        if let Some(id) = self.dm_channels.lock().await.get(user_id) {
            return Ok(id.clone());
        }

        let data = self
            .post_json("/users/@me/channels", &json!({ "recipient_id": user_id }))
            .await?;
        let id = data["id"]
            .as_str()
            .ok_or_else(|| DiscordError::Gateway("DM channel without id".into()))?
            .to_string();

        self.dm_channels
            .lock()
            .await
            .insert(user_id.to_string(), id.clone());
        Ok(id)
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        Ok(self.send_chunks(channel_id, content, None).await?)
    }

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> anyhow::Result<()> {
        let body = json!({ "embeds": [embed_payload(embed)] });
        self.post_json(&format!("/channels/{channel_id}/messages"), &body)
            .await?;
        Ok(())
    }

    async fn reply(&self, message: &IncomingMessage, content: &str) -> anyhow::Result<()> {
        Ok(self
            .send_chunks(&message.channel.id, content, Some(&message.id))
            .await?)
    }
}

/// Discord's embed object.
fn embed_payload(embed: &Embed) -> Value {
    let mut payload = json!({});
    if let Some(color) = embed.color {
        payload["color"] = json!(color);
    }
    if let Some(title) = &embed.title {
        payload["title"] = json!(title);
    }
    if let Some(url) = &embed.url {
        payload["url"] = json!(url);
    }
    if let Some(description) = &embed.description {
        payload["description"] = json!(description);
    }
    if !embed.fields.is_empty() {
        payload["fields"] = embed
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "value": f.value, "inline": false }))
            .collect();
    }
    if let Some(footer) = &embed.footer {
        payload["footer"] = json!({ "text": footer });
    }
    payload
}

/// Split a message into chunks of at most `max_len` bytes.
/// Tries to split at newline boundaries, never inside a character.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let split_at = remaining[..limit]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    chunks
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
