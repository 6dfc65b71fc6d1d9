//! Replies to messages that mention the bot.

use qtweet_core::utils::clock_fraction;

const FORTUNES: &[&str] = &[
    "Reply hazy, try again.",
    "The stars say: subscribe to more accounts.",
    "I see a new post in your near future.",
    "Ask again after the next timeline refresh.",
    "Signs point to yes.",
    "My sources say no.",
    "Outlook good.",
    "You will soon receive an unexpected notification.",
    "A quiet feed is a happy feed.",
    "Cannot predict now, the stream is buffering.",
];

/// A fortune picked from the clock.
pub fn pick() -> &'static str {
    let index = (clock_fraction() * FORTUNES.len() as f64) as usize;
    FORTUNES[index.min(FORTUNES.len() - 1)]
}
