//! Core domain + application logic for the Discord relay bot.
//!
//! This crate is intentionally framework-agnostic. Discord, the EarthMC API and the
//! HTTP front door live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod registry;
pub mod webhook_cache;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};
