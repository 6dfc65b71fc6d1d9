//! Feed stream lifecycle.
//!
//! A stream is provisioned with the set of followed accounts at creation
//! time and can't be updated in place: any change to that set means
//! `destroy_stream()` + `create_stream()`. Both are idempotent.
//!
//! Posts received by the connector are fanned out to every channel
//! subscribed to the post's account.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use qtweet_core::types::FeedPost;

use crate::post::Poster;
use crate::store::{normalize_account, SubscriptionStore};

/// Buffer between the connector and the fan-out task.
const POST_BUFFER: usize = 256;

// ─────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────

/// Start/stop control over the upstream feed, as seen by the router.
#[async_trait]
pub trait FeedStream: Send + Sync {
    /// (Re)start the stream with the current subscription set.
    async fn create_stream(&self) -> anyhow::Result<()>;

    /// Stop the stream. No-op when none is running.
    async fn destroy_stream(&self);

    /// Most recent post of an account, fetched on demand.
    async fn latest_post(&self, account: &str) -> anyhow::Result<Option<FeedPost>>;
}

/// The upstream feed protocol.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Follow `accounts`, pushing posts into `sink` until the connection ends.
    async fn run(&self, accounts: Vec<String>, sink: mpsc::Sender<FeedPost>) -> anyhow::Result<()>;

    /// Fetch the latest post of one account.
    async fn latest(&self, account: &str) -> anyhow::Result<Option<FeedPost>>;
}

// ─────────────────────────────────────────────
// StreamManager
// ─────────────────────────────────────────────

struct ActiveStream {
    accounts: Vec<String>,
    connector_task: JoinHandle<()>,
    fanout_task: JoinHandle<()>,
}

impl ActiveStream {
    fn abort(self) {
        self.connector_task.abort();
        self.fanout_task.abort();
    }
}

pub struct StreamManager {
    store: Arc<dyn SubscriptionStore>,
    poster: Arc<Poster>,
    connector: Arc<dyn FeedConnector>,
    active: Mutex<Option<ActiveStream>>,
}

impl StreamManager {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        poster: Arc<Poster>,
        connector: Arc<dyn FeedConnector>,
    ) -> Self {
        Self {
            store,
            poster,
            connector,
            active: Mutex::new(None),
        }
    }

    /// Accounts the running stream was created with (empty when stopped).
    pub async fn tracked_accounts(&self) -> Vec<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|s| s.accounts.clone())
            .unwrap_or_default()
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Relay one post to every subscriber of its account.
    async fn fan_out(store: &dyn SubscriptionStore, poster: &Poster, post: &FeedPost) {
        let subscribers = store.subscribers(&post.account).await;
        debug!(
            account = %post.account,
            subscribers = subscribers.len(),
            "relaying post"
        );

        let text = post.render();
        for addr in subscribers {
            if let Err(e) = poster.message(&addr, &text).await {
                warn!(to = %addr, account = %post.account, error = %e, "failed to relay post");
            }
        }
    }
}

#[async_trait]
impl FeedStream for StreamManager {
    async fn create_stream(&self) -> anyhow::Result<()> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!("replacing running feed stream");
            previous.abort();
        }

        let accounts = self.store.followed_accounts().await;
        if accounts.is_empty() {
            info!("no followed accounts, feed stream not started");
            return Ok(());
        }

        info!(accounts = accounts.len(), "starting feed stream");

        let (tx, mut rx) = mpsc::channel::<FeedPost>(POST_BUFFER);

        let connector = self.connector.clone();
        let followed = accounts.clone();
        let connector_task = tokio::spawn(async move {
            if let Err(e) = connector.run(followed, tx).await {
                error!(error = %e, "feed connector stopped with an error");
            } else {
                info!("feed connector stopped");
            }
        });

        let store = self.store.clone();
        let poster = self.poster.clone();
        let fanout_task = tokio::spawn(async move {
            while let Some(post) = rx.recv().await {
                Self::fan_out(store.as_ref(), &poster, &post).await;
            }
            debug!("feed fan-out finished");
        });

        *active = Some(ActiveStream {
            accounts,
            connector_task,
            fanout_task,
        });
        Ok(())
    }

    async fn destroy_stream(&self) {
        match self.active.lock().await.take() {
            Some(stream) => {
                info!(accounts = stream.accounts.len(), "feed stream destroyed");
                stream.abort();
            }
            None => debug!("no feed stream to destroy"),
        }
    }

    async fn latest_post(&self, account: &str) -> anyhow::Result<Option<FeedPost>> {
        self.connector.latest(&normalize_account(account)).await
    }
}

/// Connector for deployments without an upstream feed: holds the stream
/// open and never yields a post.
pub struct IdleConnector;

#[async_trait]
impl FeedConnector for IdleConnector {
    async fn run(&self, accounts: Vec<String>, _sink: mpsc::Sender<FeedPost>) -> anyhow::Result<()> {
        info!(accounts = ?accounts, "idle feed connector following accounts");
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn latest(&self, _account: &str) -> anyhow::Result<Option<FeedPost>> {
        Ok(None)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
