//! QTweet Core — types shared by every other crate.
//!
//! - **address**: `ChannelAddress`, the normalized "where to post" reference
//! - **backoff**: reconnection delay policy
//! - **config**: schema + loader (`~/.qtweet/config.json` + env overrides)
//! - **events**: lifecycle events emitted by the chat client
//! - **i18n**: localized string lookup with fallback
//! - **permissions**: chat permission bit set
//! - **types**: authors, channels, guilds, embeds, feed posts

pub mod address;
pub mod backoff;
pub mod config;
pub mod events;
pub mod i18n;
pub mod permissions;
pub mod types;
pub mod utils;

pub use address::{ChannelAddress, SerializedChannel};
pub use backoff::{Backoff, BackoffMode};
pub use config::Config;
pub use events::{ChatEvent, ClientError};
pub use i18n::Localizer;
pub use permissions::Permissions;
