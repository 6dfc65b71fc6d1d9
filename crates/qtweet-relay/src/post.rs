//! Delivery of text, embeds and localized messages to a `ChannelAddress`.

use std::sync::Arc;

use tracing::{debug, warn};

use qtweet_core::types::Embed;
use qtweet_core::{ChannelAddress, Localizer};

use crate::client::ChatClient;
use crate::store::SubscriptionStore;

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("channel address has no id")]
    Undeliverable,
    #[error("missing permission to post in {0}")]
    Forbidden(String),
    #[error(transparent)]
    Client(#[from] anyhow::Error),
}

/// Resolves addresses and sends content through the chat client.
pub struct Poster {
    chat: Arc<dyn ChatClient>,
    store: Arc<dyn SubscriptionStore>,
    i18n: Arc<Localizer>,
}

impl Poster {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        store: Arc<dyn SubscriptionStore>,
        i18n: Arc<Localizer>,
    ) -> Self {
        Self { chat, store, i18n }
    }

    pub fn i18n(&self) -> &Localizer {
        &self.i18n
    }

    /// Send plain text to a guild channel or a DM.
    pub async fn message(&self, addr: &ChannelAddress, text: &str) -> Result<(), PostError> {
        let channel_id = self.resolve(addr, false).await?;
        self.chat.send_message(&channel_id, text).await?;
        debug!(to = %addr, "message sent");
        Ok(())
    }

    /// Send plain text to the DM channel of the address' user.
    pub async fn dm(&self, addr: &ChannelAddress, text: &str) -> Result<(), PostError> {
        let user_id = addr.id().ok_or(PostError::Undeliverable)?;
        let channel_id = self.chat.dm_channel(user_id).await?;
        self.chat.send_message(&channel_id, text).await?;
        debug!(user = %user_id, "dm sent");
        Ok(())
    }

    pub async fn embed(&self, addr: &ChannelAddress, embed: &Embed) -> Result<(), PostError> {
        let channel_id = self.resolve(addr, true).await?;
        self.chat.send_embed(&channel_id, embed).await?;
        debug!(to = %addr, "embed sent");
        Ok(())
    }

    /// Send a catalog message in the language of the address' guild.
    pub async fn translated(
        &self,
        addr: &ChannelAddress,
        key: &str,
        params: &[(&str, &str)],
    ) -> Result<(), PostError> {
        let lang = self.store.get_lang(addr.guild_id()).await;
        let text = self.i18n.translate_with(&lang, key, params);
        self.message(addr, &text).await
    }

    /// Like [`Poster::translated`], but failures are only logged.
    pub async fn translated_or_log(&self, addr: &ChannelAddress, key: &str, params: &[(&str, &str)]) {
        if let Err(e) = self.translated(addr, key, params).await {
            warn!(to = %addr, key = %key, error = %e, "failed to send translated message");
        }
    }

    async fn resolve(&self, addr: &ChannelAddress, rich: bool) -> Result<String, PostError> {
        let id = addr.id().ok_or(PostError::Undeliverable)?;
        if addr.is_dm() {
            return Ok(self.chat.dm_channel(id).await?);
        }

        let allowed = if rich {
            self.chat.can_post_embed_in(id).await
        } else {
            self.chat.can_post_in(id).await
        };
        if !allowed {
            return Err(PostError::Forbidden(id.to_string()));
        }
        Ok(id.to_string())
    }
}
