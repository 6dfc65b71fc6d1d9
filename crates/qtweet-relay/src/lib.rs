//! QTweet Relay — everything between the chat client and the feed.
//!
//! This crate contains:
//! - **client**: the `ChatClient` trait the platform adapter implements
//! - **commands**: command table, checks and built-in commands
//! - **pipeline**: check fan-out / fan-in and handler dispatch
//! - **router**: reactions to platform lifecycle events
//! - **supervisor**: login with backoff
//! - **store**: subscription persistence
//! - **feed**: feed stream lifecycle and post fan-out
//! - **post**: delivery of text, embeds and localized messages

pub mod client;
pub mod commands;
pub mod feed;
pub mod fortune;
pub mod pipeline;
pub mod post;
pub mod router;
pub mod store;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ChatClient;
pub use commands::registry::CommandRegistry;
pub use commands::{Command, CommandContext};
pub use feed::{FeedConnector, FeedStream, IdleConnector, StreamManager};
pub use pipeline::{AuthorizationPipeline, DispatchOutcome};
pub use post::Poster;
pub use router::{EventRouter, RouterSettings};
pub use store::{JsonSubscriptionStore, RemovalCounts, SubscriptionStore};
pub use supervisor::ConnectionSupervisor;
