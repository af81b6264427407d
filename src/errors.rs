//! Unified error types for the sales rollup engine.
//!
//! Store errors coming out of `SeaORM` are classified on the way in: constraint
//! violations become [`Error::IntegrityViolation`] and lost connections become
//! [`Error::ConnectivityFailure`], so callers can match on intent rather than
//! on driver details.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::entities::INVARIANT_PREFIX;

/// Main error type for every fact store, materialization and verification operation.
#[derive(Debug, Error)]
pub enum Error {
    /// A write would break a fact store invariant. Nothing was committed.
    #[error("Integrity violation: {message}")]
    IntegrityViolation {
        /// Which invariant was violated and by what value
        message: String,
    },

    /// A non-blocking refresh could not proceed.
    #[error("Refresh conflict on {rollup}: {reason}")]
    RefreshConflict {
        /// Name of the materialized rollup
        rollup: String,
        /// Why the non-blocking path was refused
        reason: String,
    },

    /// The consistency verifier found violations and the caller chose to treat them as fatal.
    #[error("Aggregation inconsistency: {violations} violation(s) found")]
    AggregationInconsistency {
        /// Number of violations in the failing report
        violations: usize,
    },

    /// The underlying store is unreachable.
    #[error("Store unreachable: {message}")]
    ConnectivityFailure {
        /// Driver message
        message: String,
    },

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"order"`
        entity: &'static str,
        /// Primary key that was looked up
        id: i64,
    },

    /// Any other database error.
    #[error("Database error: {0}")]
    Database(DbErr),

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for building an [`Error::IntegrityViolation`].
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            message: message.into(),
        }
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => {
                return Self::integrity(format!("duplicate key: {msg}"));
            }
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => {
                return Self::integrity(format!("unresolved reference: {msg}"));
            }
            _ => {}
        }

        match err {
            DbErr::Custom(msg) if msg.starts_with(INVARIANT_PREFIX) => {
                Self::integrity(&msg[INVARIANT_PREFIX.len()..])
            }
            DbErr::Conn(e) => Self::ConnectivityFailure {
                message: e.to_string(),
            },
            DbErr::ConnectionAcquire(e) => Self::ConnectivityFailure {
                message: e.to_string(),
            },
            other => Self::Database(other),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
