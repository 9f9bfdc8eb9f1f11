use std::sync::Arc;

use rusqlite::ErrorCode;

/// Core error type for the relay bot.
///
/// Adapter crates map their specific errors into this type so the relay layer
/// can tell recoverable races (constraint violation, missing thread) apart from
/// failures it must surface.
///
/// `Clone` so a single thread-creation outcome can be handed to every caller
/// coalesced onto it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("storage error: {0}")]
    Storage(Arc<rusqlite::Error>),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("target not found: {0}")]
    TargetMissing(String),

    #[error("recipient blocked the bot: {0}")]
    RecipientBlocked(String),

    #[error("external error: {0}")]
    Transient(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::ConstraintViolation(_))
    }

    pub fn is_target_missing(&self) -> bool {
        matches!(self, Error::TargetMissing(_))
    }

    /// True for failures reported by the messaging surface (as opposed to local
    /// storage or programming errors).
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Error::TargetMissing(_) | Error::RecipientBlocked(_) | Error::Transient(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg)
                if matches!(err.code, ErrorCode::ConstraintViolation) =>
            {
                Error::ConstraintViolation(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => Error::Storage(Arc::new(e)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
