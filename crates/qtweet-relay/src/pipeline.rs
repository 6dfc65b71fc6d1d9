//! Authorization pipeline — checks fan-out / fan-in, then handler dispatch.
//!
//! All checks of a command are spawned at once. Each reports
//! `(index, passed)` over an mpsc channel, and the dispatcher folds the
//! results into a [`CheckOutcome`] in completion order:
//!
//! - the first failure decides: its bad message (if any) is posted, the
//!   rejection is logged, and the dispatch ends
//! - the report that brings the pass count to the total runs the handler
//!
//! Checks still running after the decision aren't cancelled. Their reports
//! go nowhere once the receiver is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use qtweet_core::types::Author;
use qtweet_core::ChannelAddress;

use crate::commands::registry::CommandRegistry;
use crate::commands::{Command, CommandContext};

// ─────────────────────────────────────────────
// Check bookkeeping
// ─────────────────────────────────────────────

/// What a single check report means for the dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// More passes are needed.
    Pending,
    /// Every check passed: run the handler.
    Execute,
    /// First failure: reject the command.
    Reject,
    /// The decision was already made.
    Ignored,
}

/// Pass count and validity flag of one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckOutcome {
    passed: usize,
    valid: bool,
    total: usize,
}

impl CheckOutcome {
    pub fn new(total: usize) -> Self {
        Self {
            passed: 0,
            valid: true,
            total,
        }
    }

    pub fn record(&mut self, passed: bool) -> Verdict {
        if !self.valid || self.passed == self.total {
            return Verdict::Ignored;
        }
        if !passed {
            self.valid = false;
            return Verdict::Reject;
        }
        self.passed += 1;
        if self.passed == self.total {
            Verdict::Execute
        } else {
            Verdict::Pending
        }
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

// ─────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────

/// How a command dispatch ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No such command. Nothing was sent.
    Unknown,
    /// Too few arguments. The usage line was sent.
    Usage,
    /// The handler ran to completion.
    Executed,
    /// The handler ran and returned an error.
    Failed,
    /// A check failed.
    Rejected { check: String },
    /// The checks didn't all report before the deadline.
    TimedOut,
    /// A check task ended without reporting.
    Aborted,
}

pub struct AuthorizationPipeline {
    registry: Arc<CommandRegistry>,
    ctx: CommandContext,
    check_timeout: Option<Duration>,
}

impl AuthorizationPipeline {
    pub fn new(registry: Arc<CommandRegistry>, ctx: CommandContext) -> Self {
        Self {
            registry,
            ctx,
            check_timeout: None,
        }
    }

    /// Bound how long a dispatch waits for its checks. `None` waits forever.
    pub fn with_check_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn context(&self) -> &CommandContext {
        &self.ctx
    }

    pub async fn dispatch(
        &self,
        name: &str,
        args: &[String],
        channel: &ChannelAddress,
        author: &Author,
    ) -> DispatchOutcome {
        let Some(command) = self.registry.get(name) else {
            debug!(command = %name, user = %author.tag, "ignoring unknown command");
            return DispatchOutcome::Unknown;
        };

        if args.len() < command.min_args {
            info!(
                command = %command.name,
                args = ?args,
                user = %author.tag,
                min_args = command.min_args,
                "not enough arguments"
            );
            self.ctx
                .poster
                .translated_or_log(channel, &command.usage_key(), &[])
                .await;
            return DispatchOutcome::Usage;
        }

        if command.checks.is_empty() {
            return self.execute(&command, args, channel, author).await;
        }

        let total = command.checks.len();
        let (tx, mut rx) = mpsc::channel::<(usize, bool)>(total);
        for (index, entry) in command.checks.iter().enumerate() {
            let check = entry.check.clone();
            let author = author.clone();
            let channel = channel.clone();
            let ctx = self.ctx.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let passed = check.check(&author, &channel, &ctx).await;
                // Fails once the dispatch is decided
                let _ = tx.send((index, passed)).await;
            });
        }
        drop(tx);

        let deadline = self.check_timeout.map(|t| Instant::now() + t);
        let mut outcome = CheckOutcome::new(total);

        loop {
            let report = match deadline {
                Some(deadline) => match timeout_at(deadline, rx.recv()).await {
                    Ok(report) => report,
                    Err(_) => {
                        warn!(
                            command = %command.name,
                            args = ?args,
                            user = %author.tag,
                            passed = outcome.passed(),
                            total = total,
                            "checks timed out, command dropped"
                        );
                        return DispatchOutcome::TimedOut;
                    }
                },
                None => rx.recv().await,
            };

            let Some((index, passed)) = report else {
                warn!(
                    command = %command.name,
                    user = %author.tag,
                    "a check ended without reporting, command dropped"
                );
                return DispatchOutcome::Aborted;
            };

            match outcome.record(passed) {
                Verdict::Pending | Verdict::Ignored => continue,
                Verdict::Execute => return self.execute(&command, args, channel, author).await,
                Verdict::Reject => {
                    let entry = &command.checks[index];
                    if let Some(key) = &entry.bad_message {
                        self.ctx.poster.translated_or_log(channel, key, &[]).await;
                    }
                    info!(
                        command = %command.name,
                        args = ?args,
                        user = %author.tag,
                        check = %entry.check.name(),
                        reason = entry.bad_message.as_deref().unwrap_or("-"),
                        "rejected command"
                    );
                    return DispatchOutcome::Rejected {
                        check: entry.check.name().to_string(),
                    };
                }
            }
        }
    }

    async fn execute(
        &self,
        command: &Command,
        args: &[String],
        channel: &ChannelAddress,
        author: &Author,
    ) -> DispatchOutcome {
        info!(
            command = %command.name,
            args = ?args,
            user = %author.tag,
            channel = %channel,
            "dispatching command"
        );

        match command.handler.run(args, channel, author, &self.ctx).await {
            Ok(()) => DispatchOutcome::Executed,
            Err(e) => {
                error!(command = %command.name, error = %e, "command failed");
                self.ctx
                    .poster
                    .translated_or_log(channel, "command-failed", &[])
                    .await;
                DispatchOutcome::Failed
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CheckEntry, Command};
    use crate::testing::{CountingHandler, DelayedCheck, FailingHandler, Harness, PendingCheck};
    use qtweet_core::Permissions;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn chan() -> ChannelAddress {
        ChannelAddress::guild_channel("c1", "g1")
    }

    fn author() -> Author {
        Author::new("u1", "someone#0001")
    }

    async fn harness() -> Harness {
        let h = Harness::new().await;
        h.chat.allow("c1", Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES);
        h
    }

    fn pipeline(h: &Harness, command: Command) -> AuthorizationPipeline {
        let mut registry = CommandRegistry::new();
        registry.register(command);
        AuthorizationPipeline::new(Arc::new(registry), h.context())
    }

    #[test]
    fn test_check_outcome_all_pass_any_order() {
        let mut outcome = CheckOutcome::new(3);
        assert_eq!(outcome.record(true), Verdict::Pending);
        assert_eq!(outcome.record(true), Verdict::Pending);
        assert_eq!(outcome.record(true), Verdict::Execute);
        // Nothing can trigger a second execution
        assert_eq!(outcome.record(true), Verdict::Ignored);
    }

    #[test]
    fn test_check_outcome_first_failure_decides() {
        let mut outcome = CheckOutcome::new(3);
        assert_eq!(outcome.record(true), Verdict::Pending);
        assert_eq!(outcome.record(false), Verdict::Reject);
        assert!(!outcome.is_valid());
        assert_eq!(outcome.record(false), Verdict::Ignored);
        assert_eq!(outcome.record(true), Verdict::Ignored);
        assert_eq!(outcome.passed(), 1);
    }

    #[test]
    fn test_check_outcome_failure_after_passes() {
        for fail_at in 0..4 {
            let mut outcome = CheckOutcome::new(4);
            let mut executed = 0;
            let mut rejected = 0;
            for i in 0..4 {
                match outcome.record(i != fail_at) {
                    Verdict::Execute => executed += 1,
                    Verdict::Reject => rejected += 1,
                    _ => {}
                }
            }
            assert_eq!(executed, 0);
            assert_eq!(rejected, 1);
        }
    }

    #[tokio::test]
    async fn test_unknown_command_is_silent() {
        let h = harness().await;
        let handler = Arc::new(CountingHandler::default());
        let p = pipeline(&h, Command::new("tweet", 1, handler.clone()));

        let outcome = p.dispatch("nope", &args(&["x"]), &chan(), &author()).await;
        assert_eq!(outcome, DispatchOutcome::Unknown);
        assert!(h.chat.sent().is_empty());
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_too_few_args_sends_usage() {
        let h = harness().await;
        let handler = Arc::new(CountingHandler::default());
        let check = Arc::new(DelayedCheck::new(true, 0));
        let p = pipeline(
            &h,
            Command::new("tweet", 1, handler.clone()).check(CheckEntry::new(check.clone())),
        );

        let outcome = p.dispatch("tweet", &[], &chan(), &author()).await;
        assert_eq!(outcome, DispatchOutcome::Usage);
        assert_eq!(handler.calls(), 0);
        assert_eq!(check.runs(), 0);
        assert_eq!(
            h.chat.sent(),
            vec![(
                "c1".to_string(),
                "`tweet <account>`: post the latest post from an account".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_usage_for_every_min_args() {
        let h = harness().await;
        for n in 1..4usize {
            let handler = Arc::new(CountingHandler::default());
            let p = pipeline(&h, Command::new("custom", n, handler.clone()));
            for given in 0..n {
                let a: Vec<String> = (0..given).map(|i| i.to_string()).collect();
                assert_eq!(
                    p.dispatch("custom", &a, &chan(), &author()).await,
                    DispatchOutcome::Usage
                );
            }
            assert_eq!(handler.calls(), 0);
        }
        assert!(h.chat.sent().iter().all(|(_, text)| text == "usage-custom"));
    }

    #[tokio::test]
    async fn test_no_checks_runs_handler() {
        let h = harness().await;
        let handler = Arc::new(CountingHandler::default());
        let p = pipeline(&h, Command::new("list", 0, handler.clone()));

        let outcome = p.dispatch("LIST", &[], &chan(), &author()).await;
        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_checks_pass_in_any_order_runs_once() {
        let h = harness().await;
        let delays = [[30u64, 5, 15], [5, 15, 30], [15, 30, 5]];
        for order in delays {
            let handler = Arc::new(CountingHandler::default());
            let mut command = Command::new("start", 1, handler.clone());
            for delay in order {
                command = command.check(CheckEntry::new(Arc::new(DelayedCheck::new(true, delay))));
            }
            let p = pipeline(&h, command);

            let outcome = p.dispatch("start", &args(&["alice"]), &chan(), &author()).await;
            assert_eq!(outcome, DispatchOutcome::Executed);
            assert_eq!(handler.calls(), 1);
            assert_eq!(handler.last_args(), args(&["alice"]));
        }
    }

    #[tokio::test]
    async fn test_failing_check_blocks_handler_and_posts_once() {
        let h = harness().await;
        let handler = Arc::new(CountingHandler::default());
        let p = pipeline(
            &h,
            Command::new("stop", 1, handler.clone())
                .check(CheckEntry::new(Arc::new(DelayedCheck::new(true, 5))))
                .check(CheckEntry::with_message(
                    Arc::new(DelayedCheck::new(false, 10)),
                    "checks-mod-only",
                ))
                .check(CheckEntry::new(Arc::new(DelayedCheck::new(true, 40)))),
        );

        let outcome = p.dispatch("stop", &args(&["alice"]), &chan(), &author()).await;
        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));

        // Let the slow check finish; its late result changes nothing
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(handler.calls(), 0);
        let sent = h.chat.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("Only moderators"));
    }

    #[tokio::test]
    async fn test_two_failures_post_only_first() {
        let h = harness().await;
        let handler = Arc::new(CountingHandler::default());
        let p = pipeline(
            &h,
            Command::new("lang", 1, handler.clone())
                .check(CheckEntry::with_message(
                    Arc::new(DelayedCheck::new(false, 30)),
                    "checks-mod-only",
                ))
                .check(CheckEntry::with_message(
                    Arc::new(DelayedCheck::new(false, 5)),
                    "checks-guild-only",
                )),
        );

        p.dispatch("lang", &args(&["fr"]), &chan(), &author()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = h.chat.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("This command only works"));
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_silent_failure() {
        let h = harness().await;
        let handler = Arc::new(CountingHandler::default());
        let p = pipeline(
            &h,
            Command::new("tweet", 0, handler.clone())
                .check(CheckEntry::new(Arc::new(DelayedCheck::new(false, 0)))),
        );

        let outcome = p.dispatch("tweet", &[], &chan(), &author()).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                check: "delayed".to_string()
            }
        );
        assert!(h.chat.sent().is_empty());
    }

    #[tokio::test]
    async fn test_pending_check_times_out() {
        let h = harness().await;
        let handler = Arc::new(CountingHandler::default());
        let p = pipeline(
            &h,
            Command::new("tweet", 0, handler.clone())
                .check(CheckEntry::new(Arc::new(DelayedCheck::new(true, 0))))
                .check(CheckEntry::new(Arc::new(PendingCheck))),
        )
        .with_check_timeout(Some(Duration::from_millis(50)));

        let outcome = p.dispatch("tweet", &[], &chan(), &author()).await;
        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_reported() {
        let h = harness().await;
        let p = pipeline(&h, Command::new("list", 0, Arc::new(FailingHandler)));

        let outcome = p.dispatch("list", &[], &chan(), &author()).await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(h.chat.sent()[0].1, "Something went wrong running that command.");
    }
}
