//! QTweet Discord — the chat platform adapter.
//!
//! Implements `qtweet_relay::ChatClient` over the raw Discord Gateway
//! (WebSocket) and REST API. No Discord library required.
//!
//! - **client**: REST sends, DM resolution, login
//! - **gateway**: WebSocket session, heartbeats, dispatch → `ChatEvent`
//! - **cache**: guilds, channels, roles, members and permission computation

pub mod cache;
pub mod client;
pub mod error;
pub mod gateway;

pub use client::DiscordClient;
pub use error::DiscordError;
