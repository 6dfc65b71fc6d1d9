//! Event router — reacts to chat platform lifecycle events.
//!
//! Each event is handled on its own task, independently of the others,
//! against the persistent state held by the store and the feed stream.
//!
//! | Event            | Reaction                                              |
//! |------------------|-------------------------------------------------------|
//! | `Message`        | mention reply, DM welcome, help, or command dispatch  |
//! | `GuildCreate`    | welcome DM to the guild owner                         |
//! | `GuildDelete`    | drop the guild's subscriptions, maybe restart stream  |
//! | `ChannelDelete`  | drop the channel's subscriptions, maybe restart stream|
//! | `Ready`          | sanity check, then start the stream                   |
//! | `Error`          | stop the stream, log in again                         |

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use qtweet_core::types::{ChannelInfo, Embed, GuildInfo, IncomingMessage};
use qtweet_core::{ChannelAddress, ChatEvent, ClientError, Config};

use crate::commands::registry::RESERVED;
use crate::commands::CommandContext;
use crate::fortune;
use crate::pipeline::AuthorizationPipeline;
use crate::supervisor::ConnectionSupervisor;

/// Color of the help panel.
pub const HELP_COLOR: u32 = 0x0e7675;

#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub prefix: String,
    pub profile_url: String,
    pub help_artist: String,
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefix: config.bot.prefix.clone(),
            profile_url: config.bot.profile_url.clone(),
            help_artist: config.bot.help_artist.clone(),
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct EventRouter {
    settings: RouterSettings,
    pipeline: Arc<AuthorizationPipeline>,
    supervisor: Arc<ConnectionSupervisor>,
}

impl EventRouter {
    pub fn new(
        settings: RouterSettings,
        pipeline: Arc<AuthorizationPipeline>,
        supervisor: Arc<ConnectionSupervisor>,
    ) -> Self {
        Self {
            settings,
            pipeline,
            supervisor,
        }
    }

    fn ctx(&self) -> &CommandContext {
        self.pipeline.context()
    }

    /// Consume events until the channel closes or `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChatEvent>, shutdown: Arc<Notify>) {
        info!("event router started");

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("event channel closed");
                        break;
                    };
                    debug!(event = event.kind(), "routing event");
                    let this = self.clone();
                    tokio::spawn(async move { this.handle(event).await });
                }
                _ = shutdown.notified() => {
                    info!("event router shutting down");
                    break;
                }
            }
        }
    }

    pub async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Ready => self.ready().await,
            ChatEvent::Message(message) => self.handle_message(&message).await,
            ChatEvent::GuildCreate(guild) => self.guild_create(&guild).await,
            ChatEvent::GuildDelete(guild) => self.guild_delete(&guild).await,
            ChatEvent::ChannelDelete(channel) => self.channel_delete(&channel).await,
            ChatEvent::Error(err) => self.error(&err).await,
        }
    }

    // ─────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────

    pub async fn handle_message(&self, message: &IncomingMessage) {
        if message.author.bot {
            return;
        }

        let ctx = self.ctx();
        let address = ChannelAddress::from_channel(&message.channel);
        let prefix = self.settings.prefix.as_str();
        let Some(body) = message.content.strip_prefix(prefix) else {
            if let Some(me) = ctx.chat.current_user_id().await {
                if message.mentions_user(&me) {
                    if let Err(e) = ctx.chat.reply(message, fortune::pick()).await {
                        warn!(error = %e, "failed to reply to mention");
                    }
                    return;
                }
            }
            if message.channel.is_dm() {
                ctx.poster
                    .translated_or_log(&address, "welcomeMessage", &[])
                    .await;
            }
            return;
        };

        let mut words = body.split_whitespace();
        let Some(command) = words.next().map(str::to_lowercase) else {
            return;
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        if RESERVED.contains(&command.as_str()) {
            let lang = ctx.store.get_lang(address.guild_id()).await;
            let embed = self.help_embed(&lang);
            if let Err(e) = ctx.poster.embed(&address, &embed).await {
                warn!(to = %address, error = %e, "failed to send help");
            }
            return;
        }

        self.pipeline
            .dispatch(&command, &args, &address, &message.author)
            .await;
    }

    /// Help panel listing every registered command.
    pub fn help_embed(&self, lang: &str) -> Embed {
        let i18n = self.ctx().poster.i18n();
        let mut embed = Embed::new()
            .color(HELP_COLOR)
            .title(i18n.translate(lang, "helpHeader"))
            .url(self.settings.profile_url.clone())
            .description(i18n.translate(lang, "helpIntro"));

        for name in self.pipeline.registry().names() {
            embed = embed.field(
                format!("{}{}", self.settings.prefix, name),
                i18n.translate(lang, &format!("usage-{name}")),
            );
        }

        embed.footer(i18n.translate_with(
            lang,
            "helpFooter",
            &[("artist", &self.settings.help_artist)],
        ))
    }

    // ─────────────────────────────────────────────
    // Guild and channel lifecycle
    // ─────────────────────────────────────────────

    pub async fn guild_create(&self, guild: &GuildInfo) {
        info!(guild = %guild.id, name = %guild.name, "joined guild");
        let ctx = self.ctx();

        let owner = match &guild.owner_id {
            Some(owner) => Some(owner.clone()),
            None => ctx.chat.guild(&guild.id).await.and_then(|g| g.owner_id),
        };
        let address = ChannelAddress::dm(owner.unwrap_or_default());
        if !address.is_deliverable() {
            warn!(guild = %guild.id, "could not resolve guild owner, no welcome sent");
            return;
        }

        // No language has been chosen for a guild we just joined
        let i18n = ctx.poster.i18n();
        let text = i18n.translate(i18n.fallback(), "welcomeMessage");
        if let Err(e) = ctx.poster.dm(&address, &text).await {
            warn!(guild = %guild.id, error = %e, "could not send welcome message to guild owner");
        }
    }

    pub async fn guild_delete(&self, guild: &GuildInfo) {
        info!(guild = %guild.id, name = %guild.name, "left guild");
        let ctx = self.ctx();

        match ctx.store.rm_guild(&guild.id).await {
            Ok(counts) => {
                info!(
                    guild = %guild.id,
                    subs = counts.subs,
                    users = counts.users,
                    "removed guild subscriptions"
                );
                if counts.users > 0 {
                    self.restart_stream().await;
                }
            }
            Err(e) => error!(guild = %guild.id, error = %e, "failed to remove guild subscriptions"),
        }
    }

    pub async fn channel_delete(&self, channel: &ChannelInfo) {
        if channel.is_dm() {
            return;
        }
        let ctx = self.ctx();

        match ctx.store.rm_channel(&channel.id).await {
            Ok(counts) => {
                if counts.subs > 0 {
                    info!(
                        channel = %channel.id,
                        subs = counts.subs,
                        users = counts.users,
                        "channel deleted, removed {} subscription(s)",
                        counts.subs
                    );
                }
                if counts.subs > 0 && counts.users > 0 {
                    self.restart_stream().await;
                }
            }
            Err(e) => {
                error!(channel = %channel.id, error = %e, "failed to remove channel subscriptions")
            }
        }
    }

    // ─────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────

    pub async fn ready(&self) {
        info!("chat client ready");
        let ctx = self.ctx();

        match ctx.store.sanity_check().await {
            Ok(removed) if removed > 0 => warn!(removed = removed, "dropped invalid subscriptions"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "subscription sanity check failed"),
        }
        self.restart_stream().await;
    }

    pub async fn error(&self, err: &ClientError) {
        error!(error = %err, "chat client error, reconnecting");
        self.ctx().feed.destroy_stream().await;
        self.supervisor.spawn_login();
    }

    async fn restart_stream(&self) {
        if let Err(e) = self.ctx().feed.create_stream().await {
            error!(error = %e, "failed to start feed stream");
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
