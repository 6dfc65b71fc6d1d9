//! Built-in commands: `tweet`, `start`, `stop`, `list`, `lang`.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use qtweet_core::types::Author;
use qtweet_core::ChannelAddress;

use super::checks::{CanPostEmbedHere, IsDmOrMod, IsGuildChannel};
use super::registry::CommandRegistry;
use super::{CheckEntry, Command, CommandContext, CommandHandler};
use crate::store::normalize_account;

const ACCOUNT_PATTERN: &str = r"^@?[A-Za-z0-9_]{1,15}$";

/// Compiled once; `None` only if the pattern itself were invalid.
static ACCOUNT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(ACCOUNT_PATTERN).ok());

/// Normalized account name, or `None` when `raw` isn't a valid handle.
pub fn parse_account(raw: &str) -> Option<String> {
    ACCOUNT_RE
        .as_ref()
        .is_some_and(|re| re.is_match(raw))
        .then(|| normalize_account(raw))
}

/// Validate `args[0]` as an account, telling the channel when it isn't one.
async fn account_arg(args: &[String], channel: &ChannelAddress, ctx: &CommandContext) -> Option<String> {
    let raw = args.first().map(String::as_str).unwrap_or_default();
    let account = parse_account(raw);
    if account.is_none() {
        ctx.poster
            .translated_or_log(channel, "account-invalid", &[("account", raw)])
            .await;
    }
    account
}

/// Add every built-in command to `registry`.
pub fn register_builtins(registry: &mut CommandRegistry) {
    let mod_only = || CheckEntry::with_message(Arc::new(IsDmOrMod), "checks-mod-only");

    registry.register(Command::new("tweet", 1, Arc::new(TweetCommand)).check(mod_only()));
    registry.register(
        Command::new("start", 1, Arc::new(StartCommand))
            .check(mod_only())
            .check(CheckEntry::with_message(Arc::new(CanPostEmbedHere), "checks-cannot-post")),
    );
    registry.register(Command::new("stop", 1, Arc::new(StopCommand)).check(mod_only()));
    registry.register(Command::new("list", 0, Arc::new(ListCommand)));
    registry.register(
        Command::new("lang", 1, Arc::new(LangCommand))
            .check(CheckEntry::with_message(Arc::new(IsGuildChannel), "checks-guild-only"))
            .check(mod_only()),
    );
}

// ─────────────────────────────────────────────
// tweet <account>
// ─────────────────────────────────────────────

pub struct TweetCommand;

#[async_trait]
impl CommandHandler for TweetCommand {
    async fn run(
        &self,
        args: &[String],
        channel: &ChannelAddress,
        _author: &Author,
        ctx: &CommandContext,
    ) -> anyhow::Result<()> {
        let Some(account) = account_arg(args, channel, ctx).await else {
            return Ok(());
        };

        match ctx.feed.latest_post(&account).await {
            Ok(Some(post)) => ctx.poster.message(channel, &post.render()).await?,
            Ok(None) => {
                ctx.poster
                    .translated(channel, "tweet-none", &[("account", &account)])
                    .await?
            }
            Err(e) => {
                warn!(account = %account, error = %e, "failed to fetch latest post");
                ctx.poster
                    .translated(channel, "tweet-failed", &[("account", &account)])
                    .await?
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// start <account>
// ─────────────────────────────────────────────

pub struct StartCommand;

#[async_trait]
impl CommandHandler for StartCommand {
    async fn run(
        &self,
        args: &[String],
        channel: &ChannelAddress,
        author: &Author,
        ctx: &CommandContext,
    ) -> anyhow::Result<()> {
        let Some(account) = account_arg(args, channel, ctx).await else {
            return Ok(());
        };

        let outcome = ctx.store.add(channel, &account).await?;
        if !outcome.added {
            ctx.poster
                .translated(channel, "start-already", &[("account", &account)])
                .await?;
            return Ok(());
        }

        info!(account = %account, channel = %channel, by = %author.tag, "subscription added");
        if outcome.new_account {
            ctx.feed.create_stream().await?;
        }
        ctx.poster
            .translated(channel, "start-success", &[("account", &account)])
            .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// stop <account>
// ─────────────────────────────────────────────

pub struct StopCommand;

#[async_trait]
impl CommandHandler for StopCommand {
    async fn run(
        &self,
        args: &[String],
        channel: &ChannelAddress,
        author: &Author,
        ctx: &CommandContext,
    ) -> anyhow::Result<()> {
        let Some(account) = account_arg(args, channel, ctx).await else {
            return Ok(());
        };

        let counts = ctx.store.remove(channel, &account).await?;
        if counts.subs == 0 {
            ctx.poster
                .translated(channel, "stop-missing", &[("account", &account)])
                .await?;
            return Ok(());
        }

        info!(account = %account, channel = %channel, by = %author.tag, "subscription removed");
        if counts.users > 0 {
            ctx.feed.create_stream().await?;
        }
        ctx.poster
            .translated(channel, "stop-success", &[("account", &account)])
            .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// list
// ─────────────────────────────────────────────

pub struct ListCommand;

#[async_trait]
impl CommandHandler for ListCommand {
    async fn run(
        &self,
        _args: &[String],
        channel: &ChannelAddress,
        _author: &Author,
        ctx: &CommandContext,
    ) -> anyhow::Result<()> {
        let accounts = ctx.store.accounts_for(channel).await;
        if accounts.is_empty() {
            ctx.poster.translated(channel, "list-empty", &[]).await?;
            return Ok(());
        }

        let lang = ctx.store.get_lang(channel.guild_id()).await;
        let mut text = ctx.poster.i18n().translate(&lang, "list-header");
        for account in &accounts {
            text.push_str(&format!("\n- @{account}"));
        }
        ctx.poster.message(channel, &text).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// lang <code>
// ─────────────────────────────────────────────

pub struct LangCommand;

#[async_trait]
impl CommandHandler for LangCommand {
    async fn run(
        &self,
        args: &[String],
        channel: &ChannelAddress,
        author: &Author,
        ctx: &CommandContext,
    ) -> anyhow::Result<()> {
        let Some(guild_id) = channel.guild_id() else {
            anyhow::bail!("lang used outside of a guild channel");
        };
        let lang = args.first().map(|l| l.to_lowercase()).unwrap_or_default();

        if !ctx.poster.i18n().has_language(&lang) {
            let languages = ctx.poster.i18n().languages().join(", ");
            ctx.poster
                .translated(
                    channel,
                    "lang-unknown",
                    &[("lang", &lang), ("languages", &languages)],
                )
                .await?;
            return Ok(());
        }

        ctx.store.set_lang(guild_id, &lang).await?;
        info!(guild = %guild_id, lang = %lang, by = %author.tag, "guild language changed");
        ctx.poster
            .translated(channel, "lang-success", &[("lang", &lang)])
            .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
