//! Core domain + application logic for the Slack time localization bot.
//!
//! This crate is intentionally framework-agnostic. Slack connectivity lives
//! behind ports (traits) implemented in the adapter crate; the core only
//! reasons about their results.

pub mod compose;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod fanout;
pub mod localize;
pub mod logging;
pub mod ports;
pub mod user_cache;
pub mod zones;

pub use errors::{Error, Result};
