//! Chat client trait — the boundary to the chat platform.
//!
//! The platform adapter (gateway + REST) implements this; the relay only
//! ever talks to the platform through it. Lifecycle events flow the other
//! way, over an `mpsc` channel of `ChatEvent`s handed to the router.

use async_trait::async_trait;

use qtweet_core::types::{ChannelInfo, Embed, GuildInfo, IncomingMessage};
use qtweet_core::Permissions;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Authenticate and start receiving events.
    ///
    /// Safe to call again while a previous attempt is in flight.
    async fn login(&self) -> anyhow::Result<()>;

    /// The bot's own user id, once logged in.
    async fn current_user_id(&self) -> Option<String>;

    async fn channel(&self, channel_id: &str) -> Option<ChannelInfo>;

    async fn guild(&self, guild_id: &str) -> Option<GuildInfo>;

    /// Effective permissions of `user_id` in a guild channel.
    async fn permissions_in(&self, channel_id: &str, user_id: &str) -> Option<Permissions>;

    /// DM channel id for a user, created if it doesn't exist yet.
    async fn dm_channel(&self, user_id: &str) -> anyhow::Result<String>;

    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()>;

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> anyhow::Result<()>;

    /// Reply to a message in its own channel.
    async fn reply(&self, message: &IncomingMessage, content: &str) -> anyhow::Result<()>;

    /// Whether the bot can send plain messages in a guild channel.
    async fn can_post_in(&self, channel_id: &str) -> bool {
        let Some(me) = self.current_user_id().await else {
            return false;
        };
        self.permissions_in(channel_id, &me)
            .await
            .is_some_and(Permissions::can_post)
    }

    /// Whether the bot can send embeds (with attachments) in a guild channel.
    async fn can_post_embed_in(&self, channel_id: &str) -> bool {
        let Some(me) = self.current_user_id().await else {
            return false;
        };
        self.permissions_in(channel_id, &me)
            .await
            .is_some_and(Permissions::can_post_embed)
    }
}
