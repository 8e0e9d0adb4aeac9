//! Core domain + application logic for the support ticket bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and SQLite live behind
//! ports (traits) implemented in adapter crates.

pub mod admin;
pub mod audit;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod relay;
pub mod store;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
