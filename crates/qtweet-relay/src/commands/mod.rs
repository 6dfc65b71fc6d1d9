//! Commands — the table the authorization pipeline dispatches into.
//!
//! A [`Command`] is a name, a minimum argument count, an ordered list of
//! async [`Check`]s and a [`CommandHandler`]. Commands are immutable once
//! registered.

pub mod builtin;
pub mod checks;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;

use qtweet_core::types::Author;
use qtweet_core::ChannelAddress;

use crate::client::ChatClient;
use crate::feed::FeedStream;
use crate::post::Poster;
use crate::store::SubscriptionStore;

// ─────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────

/// Collaborators available to checks and handlers.
#[derive(Clone)]
pub struct CommandContext {
    pub chat: Arc<dyn ChatClient>,
    pub store: Arc<dyn SubscriptionStore>,
    pub poster: Arc<Poster>,
    pub feed: Arc<dyn FeedStream>,
}

// ─────────────────────────────────────────────
// Checks
// ─────────────────────────────────────────────

/// An async predicate gating a command.
///
/// Checks of one command run concurrently and must not have side effects:
/// a check may still be running after the command was already rejected.
#[async_trait]
pub trait Check: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn check(&self, author: &Author, channel: &ChannelAddress, ctx: &CommandContext) -> bool;
}

/// A check plus the catalog key posted when it fails.
#[derive(Clone)]
pub struct CheckEntry {
    pub check: Arc<dyn Check>,
    pub bad_message: Option<String>,
}

impl CheckEntry {
    /// A check that fails silently.
    pub fn new(check: Arc<dyn Check>) -> Self {
        Self {
            check,
            bad_message: None,
        }
    }

    pub fn with_message(check: Arc<dyn Check>, key: impl Into<String>) -> Self {
        Self {
            check,
            bad_message: Some(key.into()),
        }
    }
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(
        &self,
        args: &[String],
        channel: &ChannelAddress,
        author: &Author,
        ctx: &CommandContext,
    ) -> anyhow::Result<()>;
}

// ─────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────

pub struct Command {
    pub name: String,
    pub min_args: usize,
    pub checks: Vec<CheckEntry>,
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    pub fn new(name: impl Into<String>, min_args: usize, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            min_args,
            checks: Vec::new(),
            handler,
        }
    }

    /// Append a check. Checks keep their registration order.
    pub fn check(mut self, entry: CheckEntry) -> Self {
        self.checks.push(entry);
        self
    }

    /// Catalog key of this command's usage line.
    pub fn usage_key(&self) -> String {
        format!("usage-{}", self.name)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field(
                "checks",
                &self.checks.iter().map(|c| c.check.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
