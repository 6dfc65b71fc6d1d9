//! Connection supervisor — logs the chat client in, retrying forever with
//! backoff.
//!
//! One supervisor exists per process and owns the only [`Backoff`]. Success
//! resets the backoff. A failure is logged, then retried after the current
//! delay, and the delay grows. A failed login is never fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info};

use qtweet_core::Backoff;

use crate::client::ChatClient;

pub struct ConnectionSupervisor {
    chat: Arc<dyn ChatClient>,
    backoff: Mutex<Backoff>,
    shutdown: Notify,
    stopped: AtomicBool,
}

impl ConnectionSupervisor {
    pub fn new(chat: Arc<dyn ChatClient>, backoff: Backoff) -> Self {
        Self {
            chat,
            backoff: Mutex::new(backoff),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Log in, retrying until it works or the supervisor is stopped.
    ///
    /// Returns `true` once logged in.
    pub async fn login(&self) -> bool {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }

            match self.chat.login().await {
                Ok(()) => {
                    self.backoff.lock().await.reset();
                    info!("logged in to the chat platform");
                    return true;
                }
                Err(e) => {
                    let delay = {
                        let mut backoff = self.backoff.lock().await;
                        let delay = backoff.value();
                        backoff.increment();
                        delay
                    };
                    error!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "login failed, retrying"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.notified() => {
                            info!("supervisor stopped, abandoning login");
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Run [`login`](Self::login) in the background.
    pub fn spawn_login(self: &Arc<Self>) -> JoinHandle<bool> {
        let this = self.clone();
        tokio::spawn(async move { this.login().await })
    }

    /// Abort pending retries. Further logins return immediately.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Delay the next failed attempt would wait.
    pub async fn current_delay(&self) -> std::time::Duration {
        self.backoff.lock().await.value()
    }
}
