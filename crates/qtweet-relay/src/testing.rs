//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use qtweet_core::types::{Author, ChannelInfo, Embed, FeedPost, GuildInfo, IncomingMessage};
use qtweet_core::{ChannelAddress, Localizer, Permissions};

use crate::client::ChatClient;
use crate::commands::{Check, CommandContext, CommandHandler};
use crate::feed::{FeedConnector, FeedStream};
use crate::post::Poster;
use crate::store::{JsonSubscriptionStore, SubscriptionStore};

// ─────────────────────────────────────────────
// Chat client
// ─────────────────────────────────────────────

/// In-memory chat client recording everything sent through it.
#[derive(Default)]
pub struct MockChat {
    perms: Mutex<HashMap<(String, String), Permissions>>,
    sent: Mutex<Vec<(String, String)>>,
    embeds: Mutex<Vec<(String, Embed)>>,
    replies: Mutex<Vec<(String, String)>>,
    login_failures: AtomicUsize,
    login_attempts: AtomicUsize,
}

impl MockChat {
    pub const BOT_ID: &'static str = "bot";

    pub fn new() -> Self {
        Self::default()
    }

    /// Grant the bot `perms` in `channel_id`.
    pub fn allow(&self, channel_id: &str, perms: Permissions) {
        self.allow_user(channel_id, Self::BOT_ID, perms);
    }

    pub fn allow_user(&self, channel_id: &str, user_id: &str, perms: Permissions) {
        self.perms
            .lock()
            .unwrap()
            .insert((channel_id.to_string(), user_id.to_string()), perms);
    }

    /// Make the next `n` logins fail.
    pub fn fail_logins(&self, n: usize) {
        self.login_failures.store(n, Ordering::SeqCst);
    }

    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn embeds(&self) -> Vec<(String, Embed)> {
        self.embeds.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn login(&self) -> anyhow::Result<()> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .login_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("gateway unavailable");
        }
        Ok(())
    }

    async fn current_user_id(&self) -> Option<String> {
        Some(Self::BOT_ID.to_string())
    }

    async fn channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        Some(ChannelInfo::guild_text(channel_id, "g1", "general"))
    }

    async fn guild(&self, guild_id: &str) -> Option<GuildInfo> {
        (guild_id != "g404").then(|| GuildInfo {
            id: guild_id.to_string(),
            name: "guild".to_string(),
            owner_id: None,
        })
    }

    async fn permissions_in(&self, channel_id: &str, user_id: &str) -> Option<Permissions> {
        self.perms
            .lock()
            .unwrap()
            .get(&(channel_id.to_string(), user_id.to_string()))
            .copied()
    }

    async fn dm_channel(&self, user_id: &str) -> anyhow::Result<String> {
        Ok(format!("dm-{user_id}"))
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> anyhow::Result<()> {
        self.embeds
            .lock()
            .unwrap()
            .push((channel_id.to_string(), embed.clone()));
        Ok(())
    }

    async fn reply(&self, message: &IncomingMessage, content: &str) -> anyhow::Result<()> {
        self.replies
            .lock()
            .unwrap()
            .push((message.id.clone(), content.to_string()));
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Feed
// ─────────────────────────────────────────────

/// Feed stream that records the tracked set of every `create_stream()`.
pub struct CountingFeed {
    store: Arc<dyn SubscriptionStore>,
    created: Mutex<Vec<Vec<String>>>,
    destroys: AtomicUsize,
    latest: Mutex<HashMap<String, FeedPost>>,
}

impl CountingFeed {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            created: Mutex::new(Vec::new()),
            destroys: AtomicUsize::new(0),
            latest: Mutex::new(HashMap::new()),
        }
    }

    pub fn creates(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    /// Accounts tracked by the most recent `create_stream()`.
    pub fn last_tracked(&self) -> Vec<String> {
        self.created.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn set_latest(&self, post: FeedPost) {
        self.latest.lock().unwrap().insert(post.account.clone(), post);
    }
}

#[async_trait]
impl FeedStream for CountingFeed {
    async fn create_stream(&self) -> anyhow::Result<()> {
        let accounts = self.store.followed_accounts().await;
        self.created.lock().unwrap().push(accounts);
        Ok(())
    }

    async fn destroy_stream(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }

    async fn latest_post(&self, account: &str) -> anyhow::Result<Option<FeedPost>> {
        Ok(self.latest.lock().unwrap().get(account).cloned())
    }
}

/// Connector that replays a fixed list of posts, then stays connected.
#[derive(Default)]
pub struct ScriptedConnector {
    posts: Vec<FeedPost>,
    runs: Mutex<Vec<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn with_posts(posts: Vec<FeedPost>) -> Self {
        Self {
            posts,
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn run(&self, accounts: Vec<String>, sink: mpsc::Sender<FeedPost>) -> anyhow::Result<()> {
        self.runs.lock().unwrap().push(accounts.clone());
        for post in &self.posts {
            if accounts.contains(&post.account) {
                sink.send(post.clone()).await?;
            }
        }
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn latest(&self, account: &str) -> anyhow::Result<Option<FeedPost>> {
        Ok(self.posts.iter().rev().find(|p| p.account == account).cloned())
    }
}

// ─────────────────────────────────────────────
// Checks and handlers
// ─────────────────────────────────────────────

/// Check answering `passed` after `delay_ms`.
pub struct DelayedCheck {
    passed: bool,
    delay: Duration,
    runs: AtomicUsize,
}

impl DelayedCheck {
    pub fn new(passed: bool, delay_ms: u64) -> Self {
        Self {
            passed,
            delay: Duration::from_millis(delay_ms),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Check for DelayedCheck {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn check(&self, _author: &Author, _channel: &ChannelAddress, _ctx: &CommandContext) -> bool {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.passed
    }
}

/// Check that never answers.
pub struct PendingCheck;

#[async_trait]
impl Check for PendingCheck {
    fn name(&self) -> &str {
        "pending"
    }

    async fn check(&self, _author: &Author, _channel: &ChannelAddress, _ctx: &CommandContext) -> bool {
        std::future::pending::<bool>().await
    }
}

#[derive(Default)]
pub struct CountingHandler {
    calls: AtomicUsize,
    last_args: Mutex<Vec<String>>,
}

impl CountingHandler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Vec<String> {
        self.last_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandHandler for CountingHandler {
    async fn run(
        &self,
        args: &[String],
        _channel: &ChannelAddress,
        _author: &Author,
        _ctx: &CommandContext,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = args.to_vec();
        Ok(())
    }
}

pub struct FailingHandler;

#[async_trait]
impl CommandHandler for FailingHandler {
    async fn run(
        &self,
        _args: &[String],
        _channel: &ChannelAddress,
        _author: &Author,
        _ctx: &CommandContext,
    ) -> anyhow::Result<()> {
        anyhow::bail!("handler exploded")
    }
}

// ─────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────

/// Mock chat + real JSON store in a temp dir + counting feed.
pub struct Harness {
    _dir: tempfile::TempDir,
    pub chat: Arc<MockChat>,
    pub store: Arc<JsonSubscriptionStore>,
    pub poster: Arc<Poster>,
    pub feed: Arc<CountingFeed>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            JsonSubscriptionStore::open(dir.path().join("subscriptions.json"), "en")
                .await
                .unwrap(),
        );
        let chat = Arc::new(MockChat::new());
        let poster = Arc::new(Poster::new(
            chat.clone(),
            store.clone(),
            Arc::new(Localizer::builtin()),
        ));
        let feed = Arc::new(CountingFeed::new(store.clone()));

        Self {
            _dir: dir,
            chat,
            store,
            poster,
            feed,
        }
    }

    pub fn context(&self) -> CommandContext {
        CommandContext {
            chat: self.chat.clone(),
            store: self.store.clone(),
            poster: self.poster.clone(),
            feed: self.feed.clone(),
        }
    }
}
