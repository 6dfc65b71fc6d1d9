//! Channel addressing.
//!
//! A `ChannelAddress` is where the bot posts: either a guild text channel
//! (keyed by channel id) or a direct message (keyed by the *recipient user*
//! id, resolved to a DM channel only at send time). Only the serialized
//! `{channelId, isDM}` form is ever persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ChannelInfo;

/// Persisted form of a [`ChannelAddress`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedChannel {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(rename = "isDM", default)]
    pub is_dm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

/// Normalized reference to a postable destination.
///
/// `id()` may be `None` for addresses rebuilt from incomplete records;
/// such an address is undeliverable and callers must check
/// [`is_deliverable`](Self::is_deliverable) before posting.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    id: Option<String>,
    is_dm: bool,
    guild_id: Option<String>,
}

impl ChannelAddress {
    /// Address a live channel. DMs are keyed by their recipient.
    pub fn from_channel(channel: &ChannelInfo) -> Self {
        if channel.is_dm() {
            Self {
                id: non_empty(channel.recipient_id.clone()),
                is_dm: true,
                guild_id: None,
            }
        } else {
            Self {
                id: non_empty(Some(channel.id.clone())),
                is_dm: false,
                guild_id: non_empty(channel.guild_id.clone()),
            }
        }
    }

    /// Direct-message address for a user.
    pub fn dm(user_id: impl Into<String>) -> Self {
        Self {
            id: non_empty(Some(user_id.into())),
            is_dm: true,
            guild_id: None,
        }
    }

    /// Guild text channel address.
    pub fn guild_channel(channel_id: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self {
            id: non_empty(Some(channel_id.into())),
            is_dm: false,
            guild_id: non_empty(Some(guild_id.into())),
        }
    }

    /// Rebuild an address without a live channel. Never fails: an absent or
    /// empty id yields an undeliverable address.
    pub fn unserialize(record: &SerializedChannel) -> Self {
        Self {
            id: non_empty(record.channel_id.clone()),
            is_dm: record.is_dm,
            guild_id: if record.is_dm {
                None
            } else {
                non_empty(record.guild_id.clone())
            },
        }
    }

    pub fn serialize(&self) -> SerializedChannel {
        SerializedChannel {
            channel_id: self.id.clone(),
            is_dm: self.is_dm,
            guild_id: self.guild_id.clone(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_dm(&self) -> bool {
        self.is_dm
    }

    /// Owning guild, `None` for DMs and guild-less channels.
    pub fn guild_id(&self) -> Option<&str> {
        if self.is_dm {
            None
        } else {
            self.guild_id.as_deref()
        }
    }

    pub fn is_deliverable(&self) -> bool {
        self.id.is_some()
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.as_deref().unwrap_or("?");
        if self.is_dm {
            write!(f, "dm:{id}")
        } else {
            write!(f, "#{id}")
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
