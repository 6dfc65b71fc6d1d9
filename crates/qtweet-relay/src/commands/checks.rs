//! Built-in checks.

use async_trait::async_trait;

use qtweet_core::types::Author;
use qtweet_core::ChannelAddress;

use super::{Check, CommandContext};

/// Passes in DMs, or for authors allowed to manage the guild channel.
pub struct IsDmOrMod;

#[async_trait]
impl Check for IsDmOrMod {
    fn name(&self) -> &str {
        "is_dm_or_mod"
    }

    async fn check(&self, author: &Author, channel: &ChannelAddress, ctx: &CommandContext) -> bool {
        if channel.is_dm() {
            return true;
        }
        let Some(id) = channel.id() else {
            return false;
        };
        ctx.chat
            .permissions_in(id, &author.id)
            .await
            .is_some_and(|p| p.is_moderator())
    }
}

/// Passes only in guild channels.
pub struct IsGuildChannel;

#[async_trait]
impl Check for IsGuildChannel {
    fn name(&self) -> &str {
        "is_guild_channel"
    }

    async fn check(&self, _author: &Author, channel: &ChannelAddress, _ctx: &CommandContext) -> bool {
        !channel.is_dm() && channel.guild_id().is_some()
    }
}

/// Passes when the bot can post embeds (and attachments) in the channel.
/// DMs always pass.
pub struct CanPostEmbedHere;

#[async_trait]
impl Check for CanPostEmbedHere {
    fn name(&self) -> &str {
        "can_post_embed_here"
    }

    async fn check(&self, _author: &Author, channel: &ChannelAddress, ctx: &CommandContext) -> bool {
        if channel.is_dm() {
            return true;
        }
        match channel.id() {
            Some(id) => ctx.chat.can_post_embed_in(id).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use qtweet_core::Permissions;

    #[tokio::test]
    async fn test_is_dm_or_mod() {
        let h = Harness::new().await;
        let ctx = h.context();
        let author = Author::new("u1", "user");
        let chan = ChannelAddress::guild_channel("c1", "g1");

        assert!(IsDmOrMod.check(&author, &ChannelAddress::dm("u1"), &ctx).await);
        assert!(!IsDmOrMod.check(&author, &chan, &ctx).await);

        h.chat.allow_user("c1", "u1", Permissions::MANAGE_CHANNELS);
        assert!(IsDmOrMod.check(&author, &chan, &ctx).await);
    }

    #[tokio::test]
    async fn test_is_dm_or_mod_admin() {
        let h = Harness::new().await;
        h.chat.allow_user("c1", "u1", Permissions::ADMINISTRATOR);
        let ok = IsDmOrMod
            .check(
                &Author::new("u1", "user"),
                &ChannelAddress::guild_channel("c1", "g1"),
                &h.context(),
            )
            .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_is_guild_channel() {
        let h = Harness::new().await;
        let ctx = h.context();
        let author = Author::new("u1", "user");
        assert!(IsGuildChannel.check(&author, &ChannelAddress::guild_channel("c1", "g1"), &ctx).await);
        assert!(!IsGuildChannel.check(&author, &ChannelAddress::dm("u1"), &ctx).await);
    }

    #[tokio::test]
    async fn test_can_post_embed_here() {
        let h = Harness::new().await;
        let ctx = h.context();
        let author = Author::new("u1", "user");
        let chan = ChannelAddress::guild_channel("c1", "g1");

        assert!(!CanPostEmbedHere.check(&author, &chan, &ctx).await);
        h.chat.allow("c1", Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES);
        assert!(!CanPostEmbedHere.check(&author, &chan, &ctx).await);
        h.chat.allow(
            "c1",
            Permissions::VIEW_CHANNEL
                | Permissions::SEND_MESSAGES
                | Permissions::EMBED_LINKS
                | Permissions::ATTACH_FILES,
        );
        assert!(CanPostEmbedHere.check(&author, &chan, &ctx).await);
        assert!(CanPostEmbedHere.check(&author, &ChannelAddress::dm("u1"), &ctx).await);
    }
}
