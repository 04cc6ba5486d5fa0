//! Automatic acknowledgment for inbound messages on the bot number.
//!
//! Flow: inbound message → skip self, admins and bridge replies → per-sender
//! cooldown → send the acknowledgment template through the receiving client.

pub mod cooldown;
pub mod error;
pub mod reply;

pub use {
    cooldown::CooldownMap,
    error::{Error, Result},
    reply::{AdminCheck, AutoResponder, DEFAULT_TEMPLATE, Outcome, SkipReason},
};
