//! Platform-neutral types passed between the chat client and the relay.
//!
//! The chat client translates its wire payloads into these; nothing above
//! the client ever sees raw gateway JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────

/// The user who sent a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    /// Display tag used in logs (`name#1234`, or just `name`).
    pub tag: String,
    #[serde(default)]
    pub bot: bool,
}

impl Author {
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            bot: false,
        }
    }
}

// ─────────────────────────────────────────────
// Channels and guilds
// ─────────────────────────────────────────────

/// Kind of a chat channel, as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    GuildText,
    DirectMessage,
    Other,
}

/// A live channel as seen by the chat client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub kind: ChannelKind,
    #[serde(default)]
    pub name: String,
    /// Owning guild (absent for DMs).
    #[serde(default)]
    pub guild_id: Option<String>,
    /// The other user of a DM channel.
    #[serde(default)]
    pub recipient_id: Option<String>,
}

impl ChannelInfo {
    pub fn guild_text(id: impl Into<String>, guild_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ChannelKind::GuildText,
            name: name.into(),
            guild_id: Some(guild_id.into()),
            recipient_id: None,
        }
    }

    pub fn direct(id: impl Into<String>, recipient_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ChannelKind::DirectMessage,
            name: String::new(),
            guild_id: None,
            recipient_id: Some(recipient_id.into()),
        }
    }

    pub fn is_dm(&self) -> bool {
        self.kind == ChannelKind::DirectMessage
    }
}

/// A guild (server) the bot is a member of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// A message received from the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: String,
    pub content: String,
    pub author: Author,
    pub channel: ChannelInfo,
    /// Ids of users mentioned in the message.
    pub mentions: Vec<String>,
}

impl IncomingMessage {
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.iter().any(|m| m == user_id)
    }
}

// ─────────────────────────────────────────────
// Rich content
// ─────────────────────────────────────────────

/// One name/value field of an [`Embed`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

/// Rich message content (title, fields, footer).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() {
            self.url = Some(url);
        }
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

// ─────────────────────────────────────────────
// Feed
// ─────────────────────────────────────────────

/// A post arriving from the upstream feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPost {
    /// Lowercase account name the post belongs to.
    pub account: String,
    pub text: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl FeedPost {
    pub fn new(account: impl Into<String>, text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            text: text.into(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }

    /// Plain-text rendering used when relaying to a channel.
    pub fn render(&self) -> String {
        if self.url.is_empty() {
            format!("**@{}**: {}", self.account, self.text)
        } else {
            format!("**@{}**: {}\n{}", self.account, self.text, self.url)
        }
    }
}
