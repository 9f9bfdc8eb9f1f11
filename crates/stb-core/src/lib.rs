//! Core domain + application logic for the support thread relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind the
//! messaging port implemented in the adapter crate; storage is SQLite.

pub mod activity;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod relay;
pub mod settings;
pub mod topic_service;
pub mod topic_store;

pub use errors::{Error, Result};
