//! Chat permission bit set (Discord bit positions).

use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const ADMINISTRATOR: Permissions = Permissions(1 << 3);
    pub const MANAGE_CHANNELS: Permissions = Permissions(1 << 4);
    pub const MANAGE_GUILD: Permissions = Permissions(1 << 5);
    pub const VIEW_CHANNEL: Permissions = Permissions(1 << 10);
    pub const SEND_MESSAGES: Permissions = Permissions(1 << 11);
    pub const EMBED_LINKS: Permissions = Permissions(1 << 14);
    pub const ATTACH_FILES: Permissions = Permissions(1 << 15);
    pub const ALL: Permissions = Permissions(u64::MAX);

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Send + view.
    pub fn can_post(self) -> bool {
        self.contains(Self::SEND_MESSAGES | Self::VIEW_CHANNEL)
    }

    /// Send + view + embed + attach.
    pub fn can_post_embed(self) -> bool {
        self.contains(
            Self::SEND_MESSAGES | Self::VIEW_CHANNEL | Self::EMBED_LINKS | Self::ATTACH_FILES,
        )
    }

    /// Allowed to manage what the bot posts in a channel.
    pub fn is_moderator(self) -> bool {
        self.contains(Self::ADMINISTRATOR)
            || self.contains(Self::MANAGE_CHANNELS)
            || self.contains(Self::MANAGE_GUILD)
    }

    /// Parse the decimal string form used on the wire.
    pub fn from_wire(value: &str) -> Permissions {
        Permissions(value.parse().unwrap_or(0))
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Permissions;

    fn bitand(self, rhs: Self) -> Self::Output {
        Permissions(self.0 & rhs.0)
    }
}

impl Not for Permissions {
    type Output = Permissions;

    fn not(self) -> Self::Output {
        Permissions(!self.0)
    }
}
