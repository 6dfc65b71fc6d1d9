//! Reconnection backoff.
//!
//! A small state machine: `value()` is the delay to wait before the next
//! attempt, `increment()` grows it under the configured policy (never past
//! `max`), `reset()` goes back to `start` after a successful connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::schema::BackoffConfig;

/// Growth policy applied by [`Backoff::increment`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    /// Double the delay on every failure.
    #[default]
    Exponential,
    /// Add `start` to the delay on every failure.
    Linear,
    /// Always wait `start`.
    Constant,
}

impl std::str::FromStr for BackoffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(BackoffMode::Exponential),
            "linear" => Ok(BackoffMode::Linear),
            "constant" => Ok(BackoffMode::Constant),
            other => Err(format!("unknown backoff mode: {other}")),
        }
    }
}

/// Delay between reconnection attempts.
#[derive(Clone, Debug)]
pub struct Backoff {
    mode: BackoffMode,
    start: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(mode: BackoffMode, start: Duration, max: Duration) -> Self {
        Self {
            mode,
            start,
            max,
            current: start,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            config.mode,
            Duration::from_millis(config.start_ms),
            Duration::from_millis(config.max_ms),
        )
    }

    /// Current delay.
    pub fn value(&self) -> Duration {
        self.current
    }

    /// Grow the delay, capped at `max`.
    pub fn increment(&mut self) {
        let next = match self.mode {
            BackoffMode::Exponential => self.current.saturating_mul(2),
            BackoffMode::Linear => self.current.saturating_add(self.start),
            BackoffMode::Constant => self.current,
        };
        self.current = next.min(self.max.max(self.start));
    }

    /// Back to the starting delay.
    pub fn reset(&mut self) {
        self.current = self.start;
    }

    pub fn mode(&self) -> BackoffMode {
        self.mode
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
