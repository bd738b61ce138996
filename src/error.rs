//! Error taxonomy for message and recipient operations.

use crate::types::RecipientKind;

/// Errors from the messaging core and its SQLite store.
///
/// Viewing an unsent message is deliberately absent: that outcome is a normal
/// [`ViewOutcome::Rejected`](crate::recipient::ViewOutcome::Rejected) value.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// A required field is missing or a value breaks a content constraint.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Another writer claimed the same `(message, kind, position)` slot.
    ///
    /// The whole operation may be retried.
    #[error("position conflict on message {message_id} ({kind}) at position {position:?}")]
    Conflict {
        /// Message whose bucket collided.
        message_id: i64,
        /// Kind bucket that collided.
        kind: RecipientKind,
        /// Position that was attempted, when known.
        position: Option<u32>,
    },

    /// The referenced message does not exist (or was deleted concurrently).
    #[error("message not found: {0}")]
    MessageNotFound(i64),

    /// The referenced recipient does not exist (or was deleted concurrently).
    #[error("recipient not found: {0}")]
    RecipientNotFound(i64),

    /// State transition is not allowed.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// The source state.
        from: String,
        /// The target state.
        to: String,
    },

    /// A stored value could not be decoded.
    #[error("invalid {field} value: {value:?}")]
    InvalidValue {
        /// Which field contained the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },

    /// SQLite stayed locked by another writer past the busy timeout, or no
    /// pooled connection came free in time.
    ///
    /// The whole operation may be retried.
    #[error("database busy: {0}")]
    Busy(#[source] sqlx::Error),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl MessagingError {
    /// Returns `true` when retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Busy(_))
    }
}

impl From<sqlx::Error> for MessagingError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            Self::Busy(err)
        } else {
            Self::Database(err)
        }
    }
}

/// Primary SQLite result codes for lock contention.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Returns `true` for lock contention that clears on its own.
///
/// Matches every extended `SQLITE_BUSY*` / `SQLITE_LOCKED*` code (the primary
/// code is the low byte) and pool acquire timeouts.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}
