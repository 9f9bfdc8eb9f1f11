//! Messaging-surface abstraction (Telegram today).

pub mod port;

#[cfg(test)]
pub(crate) mod fake;
