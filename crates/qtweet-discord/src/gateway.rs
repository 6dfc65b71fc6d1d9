//! Discord Gateway v10 session.
//!
//! One session = one WebSocket connection: HELLO → IDENTIFY (or RESUME) →
//! heartbeats every `heartbeat_interval` until the connection drops. The
//! session never reconnects by itself. It ends with an error and the owner
//! decides (the relay turns that into a new login).
//!
//! Dispatches keep the [`Cache`] current and are translated into
//! [`ChatEvent`]s.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex, Notify, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use qtweet_core::config::DiscordConfig;
use qtweet_core::types::{Author, ChannelInfo, IncomingMessage};
use qtweet_core::utils::clock_fraction;
use qtweet_core::{ChatEvent, ClientError};

use crate::cache::{guild_from_wire, Cache};
use crate::error::DiscordError;

// Gateway opcodes
const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RESUME: u64 = 6;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

const DEFAULT_HEARTBEAT_MS: u64 = 41250;

/// State shared between the REST client and the gateway session.
pub struct GatewayState {
    token: String,
    gateway_url: String,
    intents: u64,
    events: mpsc::Sender<ChatEvent>,
    pub(crate) cache: RwLock<Cache>,
    pub(crate) user_id: RwLock<Option<String>>,
    seq: Arc<Mutex<Option<u64>>>,
    heartbeat_acked: Arc<Mutex<bool>>,
    session_id: Mutex<Option<String>>,
    resume_url: Mutex<Option<String>>,
    /// Fired once the session is READY (or RESUMED).
    ready_signal: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    pub(crate) running: AtomicBool,
    pub(crate) shutdown: Notify,
}

impl GatewayState {
    pub fn new(config: &DiscordConfig, events: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            token: config.token.clone(),
            gateway_url: config.gateway_url.clone(),
            intents: config.intents,
            events,
            cache: RwLock::new(Cache::new()),
            user_id: RwLock::new(None),
            seq: Arc::new(Mutex::new(None)),
            heartbeat_acked: Arc::new(Mutex::new(true)),
            session_id: Mutex::new(None),
            resume_url: Mutex::new(None),
            ready_signal: Mutex::new(None),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub(crate) async fn arm_ready_signal(&self) -> oneshot::Receiver<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        *self.ready_signal.lock().await = Some(tx);
        rx
    }

    async fn signal_ready(&self) {
        if let Some(tx) = self.ready_signal.lock().await.take() {
            let _ = tx.send(Ok(()));
        }
    }

    /// Run one session and report how it ended: to a pending login if the
    /// session never got ready, as an `Error` event otherwise.
    pub(crate) async fn run(&self) {
        let result = self.session().await;
        self.running.store(false, Ordering::SeqCst);
        let pending = self.ready_signal.lock().await.take();

        match (result, pending) {
            (Ok(()), Some(tx)) => {
                let _ = tx.send(Err("gateway stopped before ready".to_string()));
            }
            (Ok(()), None) => info!("discord gateway session closed"),
            (Err(e), Some(tx)) => {
                let _ = tx.send(Err(e.to_string()));
            }
            (Err(e), None) => {
                warn!(error = %e, "discord gateway session lost");
                self.emit(ChatEvent::Error(ClientError::new(e.to_string())))
                    .await;
            }
        }
    }

    async fn emit(&self, event: ChatEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }

    /// A single WebSocket session. `Ok` only when shut down locally.
    async fn session(&self) -> Result<(), DiscordError> {
        let url = self
            .resume_url
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| self.gateway_url.clone());

        debug!(url = %url, "connecting to discord gateway");
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        // Every outgoing frame goes through this queue
        let (out_tx, mut out_rx) = mpsc::channel::<String>(16);
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = write.send(WsMessage::text(frame)).await {
                    warn!(error = %e, "discord ws write error");
                    break;
                }
            }
            let _ = write.send(WsMessage::Close(None)).await;
        });

        // Fired by the heartbeat task when an ACK never came
        let (dead_tx, mut dead_rx) = mpsc::channel::<()>(1);
        let mut heartbeat: Option<tokio::task::JoinHandle<()>> = None;
        let result = loop {
            tokio::select! {
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(WsMessage::Text(t))) => t.as_str().to_string(),
                        Some(Ok(WsMessage::Close(_))) | None => {
                            break Err(DiscordError::Gateway("connection closed".into()));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => break Err(e.into()),
                    };

                    let payload: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "discord ws invalid json");
                            continue;
                        }
                    };

                    if let Some(s) = payload["s"].as_u64() {
                        *self.seq.lock().await = Some(s);
                    }

                    match payload["op"].as_u64().unwrap_or(u64::MAX) {
                        OP_HELLO => {
                            let interval = payload["d"]["heartbeat_interval"]
                                .as_u64()
                                .unwrap_or(DEFAULT_HEARTBEAT_MS);
                            debug!(interval_ms = interval, "discord HELLO received");

                            if let Some(h) = heartbeat.take() {
                                h.abort();
                            }
                            *self.heartbeat_acked.lock().await = true;
                            heartbeat = Some(self.spawn_heartbeat(interval, out_tx.clone(), dead_tx.clone()));

                            if out_tx.send(self.identify_frame().await).await.is_err() {
                                break Err(DiscordError::Gateway("writer stopped".into()));
                            }
                        }
                        OP_HEARTBEAT => {
                            let _ = out_tx.send(self.heartbeat_frame().await).await;
                        }
                        OP_HEARTBEAT_ACK => {
                            *self.heartbeat_acked.lock().await = true;
                        }
                        OP_RECONNECT => {
                            info!("discord server requested reconnect");
                            break Err(DiscordError::Gateway("reconnect requested".into()));
                        }
                        OP_INVALID_SESSION => {
                            let resumable = payload["d"].as_bool().unwrap_or(false);
                            warn!(resumable = resumable, "discord invalid session");
                            if !resumable {
                                *self.session_id.lock().await = None;
                                *self.resume_url.lock().await = None;
                            }
                            break Err(DiscordError::Gateway("invalid session".into()));
                        }
                        OP_DISPATCH => {
                            let event = payload["t"].as_str().unwrap_or_default();
                            self.handle_dispatch(event, &payload["d"]).await;
                        }
                        _ => {}
                    }
                }
                Some(()) = dead_rx.recv() => {
                    break Err(DiscordError::Gateway("heartbeat not acknowledged".into()));
                }
                _ = self.shutdown.notified() => {
                    info!("discord gateway shutting down");
                    break Ok(());
                }
            }
        };

        if let Some(h) = heartbeat {
            h.abort();
        }
        drop(out_tx);
        let _ = writer.await;
        result
    }

    fn spawn_heartbeat(
        &self,
        interval: u64,
        out: mpsc::Sender<String>,
        dead: mpsc::Sender<()>,
    ) -> tokio::task::JoinHandle<()> {
        let seq = self.seq.clone();
        let acked = self.heartbeat_acked.clone();
        tokio::spawn(async move {
            let jitter = (interval as f64 * clock_fraction()) as u64;
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            loop {
                {
                    let mut acked = acked.lock().await;
                    if !*acked {
                        warn!("discord heartbeat not ACKed");
                        let _ = dead.send(()).await;
                        break;
                    }
                    *acked = false;
                }

                let s = *seq.lock().await;
                let frame = json!({ "op": OP_HEARTBEAT, "d": s }).to_string();
                if out.send(frame).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(interval)).await;
            }
        })
    }

    async fn heartbeat_frame(&self) -> String {
        let s = *self.seq.lock().await;
        json!({ "op": OP_HEARTBEAT, "d": s }).to_string()
    }

    async fn identify_frame(&self) -> String {
        let session = self.session_id.lock().await.clone();
        match session {
            Some(session_id) => {
                let s = *self.seq.lock().await;
                json!({
                    "op": OP_RESUME,
                    "d": { "token": self.token, "session_id": session_id, "seq": s }
                })
                .to_string()
            }
            None => json!({
                "op": OP_IDENTIFY,
                "d": {
                    "token": self.token,
                    "intents": self.intents,
                    "properties": { "os": "qtweet", "browser": "qtweet", "device": "qtweet" }
                }
            })
            .to_string(),
        }
    }

    // ─────────────────────────────────────────────
    // Dispatches
    // ─────────────────────────────────────────────

    pub(crate) async fn handle_dispatch(&self, event: &str, data: &Value) {
        match event {
            "READY" => {
                if let Some(sid) = data["session_id"].as_str() {
                    *self.session_id.lock().await = Some(sid.to_string());
                }
                if let Some(url) = data["resume_gateway_url"].as_str() {
                    *self.resume_url.lock().await = Some(format!("{url}/?v=10&encoding=json"));
                }
                if let Some(id) = data["user"]["id"].as_str() {
                    *self.user_id.write().await = Some(id.to_string());
                }
                let guilds: HashSet<String> = data["guilds"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|g| g["id"].as_str().map(str::to_string))
                    .collect();
                info!(
                    user = data["user"]["username"].as_str().unwrap_or("unknown"),
                    guilds = guilds.len(),
                    "discord bot READY"
                );
                self.cache.write().await.expect_guilds(guilds);
                self.signal_ready().await;
                self.emit(ChatEvent::Ready).await;
            }
            "RESUMED" => {
                info!("discord session resumed");
                self.signal_ready().await;
                self.emit(ChatEvent::Ready).await;
            }
            "GUILD_CREATE" => {
                let upserted = self.cache.write().await.upsert_guild(data);
                match upserted {
                    Some((guild, true)) => self.emit(ChatEvent::GuildCreate(guild)).await,
                    Some((guild, false)) => debug!(guild = %guild.id, "guild available"),
                    None => warn!("GUILD_CREATE without id"),
                }
            }
            "GUILD_DELETE" => {
                let Some(id) = data["id"].as_str() else {
                    return;
                };
                // Outage, not a removal
                if data["unavailable"].as_bool().unwrap_or(false) {
                    debug!(guild = %id, "guild unavailable");
                    return;
                }
                let removed = self.cache.write().await.remove_guild(id);
                let guild = removed.or_else(|| guild_from_wire(data));
                if let Some(guild) = guild {
                    self.emit(ChatEvent::GuildDelete(guild)).await;
                }
            }
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" => {
                self.cache.write().await.upsert_channel(data);
            }
            "CHANNEL_DELETE" => {
                let Some(id) = data["id"].as_str() else {
                    return;
                };
                let removed = self.cache.write().await.remove_channel(id);
                let channel = removed.or_else(|| crate::cache::channel_from_wire(data));
                if let Some(channel) = channel {
                    self.emit(ChatEvent::ChannelDelete(channel)).await;
                }
            }
            "GUILD_ROLE_CREATE" | "GUILD_ROLE_UPDATE" => {
                if let Some(guild_id) = data["guild_id"].as_str() {
                    self.cache.write().await.upsert_role(guild_id, &data["role"]);
                }
            }
            "GUILD_ROLE_DELETE" => {
                if let (Some(guild_id), Some(role_id)) =
                    (data["guild_id"].as_str(), data["role_id"].as_str())
                {
                    self.cache.write().await.remove_role(guild_id, role_id);
                }
            }
            "GUILD_MEMBER_ADD" | "GUILD_MEMBER_UPDATE" => {
                if let (Some(guild_id), Some(user_id)) =
                    (data["guild_id"].as_str(), data["user"]["id"].as_str())
                {
                    self.cache
                        .write()
                        .await
                        .upsert_member(guild_id, user_id, &data["roles"]);
                }
            }
            "GUILD_MEMBER_REMOVE" => {
                if let (Some(guild_id), Some(user_id)) =
                    (data["guild_id"].as_str(), data["user"]["id"].as_str())
                {
                    self.cache.write().await.remove_member(guild_id, user_id);
                }
            }
            "MESSAGE_CREATE" => {
                if let Some(message) = self.message_from_wire(data).await {
                    self.emit(ChatEvent::Message(message)).await;
                }
            }
            other => debug!(event = other, "discord event (unhandled)"),
        }
    }

    async fn message_from_wire(&self, data: &Value) -> Option<IncomingMessage> {
        let author_id = data["author"]["id"].as_str()?;
        let channel_id = data["channel_id"].as_str()?;

        let username = data["author"]["username"].as_str().unwrap_or_default();
        let tag = match data["author"]["discriminator"].as_str() {
            Some(d) if d != "0" && !d.is_empty() => format!("{username}#{d}"),
            _ => username.to_string(),
        };
        let author = Author {
            id: author_id.to_string(),
            tag,
            bot: data["author"]["bot"].as_bool().unwrap_or(false),
        };

        let channel = match data["guild_id"].as_str() {
            Some(guild_id) => {
                // Keep the author's roles fresh for permission checks
                if data["member"].is_object() {
                    self.cache
                        .write()
                        .await
                        .upsert_member(guild_id, author_id, &data["member"]["roles"]);
                }
                let name = self
                    .cache
                    .read()
                    .await
                    .channel(channel_id)
                    .map(|c| c.name)
                    .unwrap_or_default();
                ChannelInfo::guild_text(channel_id, guild_id, name)
            }
            None => ChannelInfo::direct(channel_id, author_id),
        };

        let mentions = data["mentions"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|m| m["id"].as_str().map(str::to_string))
            .collect();

        Some(IncomingMessage {
            id: data["id"].as_str().unwrap_or_default().to_string(),
            content: data["content"].as_str().unwrap_or_default().to_string(),
            author,
            channel,
            mentions,
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
