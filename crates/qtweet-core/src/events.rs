//! Lifecycle events emitted by the chat client.

use crate::types::{ChannelInfo, GuildInfo, IncomingMessage};

/// An error reported by the chat client (connection dropped, gateway
/// rejected the session, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientError {
    pub message: String,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Events the relay reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// Logged in and ready to receive events.
    Ready,
    Message(IncomingMessage),
    /// The bot joined a new guild.
    GuildCreate(GuildInfo),
    /// The bot left (or was removed from) a guild.
    GuildDelete(GuildInfo),
    ChannelDelete(ChannelInfo),
    Error(ClientError),
}

impl ChatEvent {
    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Ready => "ready",
            ChatEvent::Message(_) => "message",
            ChatEvent::GuildCreate(_) => "guildCreate",
            ChatEvent::GuildDelete(_) => "guildDelete",
            ChatEvent::ChannelDelete(_) => "channelDelete",
            ChatEvent::Error(_) => "error",
        }
    }
}
