//! Error taxonomy for the contacts core.

use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the directory, the relation store and the workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Expected absence. Never logged as a failure.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// More than one user owns the same phone number.
    #[error("phone number {phone_number} matches more than one user")]
    AmbiguousMatch { phone_number: String },

    /// The store rejected a write under its referential rules.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Connectivity failure or timeout talking to the store.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Malformed identifiers or contact entries.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Store failure that fits none of the above.
    #[error("internal store error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn ambiguous_match(phone_number: impl Into<String>) -> Self {
        Self::AmbiguousMatch {
            phone_number: phone_number.into(),
        }
    }

    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// SQLSTATE class 23: integrity constraint violation.
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";
// SQLSTATE class 08: connection exception.
const CONNECTION_EXCEPTION_CLASS: &str = "08";
// admin_shutdown, crash_shutdown, cannot_connect_now.
const SERVER_SHUTDOWN_CODES: [&str; 3] = ["57P01", "57P02", "57P03"];

fn is_connectivity_code(code: &str) -> bool {
    code.starts_with(CONNECTION_EXCEPTION_CLASS) || SERVER_SHUTDOWN_CODES.contains(&code)
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        debug!(error = %err, "sqlx operation failed");
        match err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|code| code.into_owned()).unwrap_or_default();
                if code.starts_with(INTEGRITY_CONSTRAINT_CLASS) {
                    Self::constraint_violation(db.message())
                } else if is_connectivity_code(&code) {
                    Self::store_unavailable(db.message())
                } else {
                    Self::internal(db.message())
                }
            }
            sqlx::Error::Io(err) => Self::store_unavailable(err.to_string()),
            sqlx::Error::Tls(err) => Self::store_unavailable(err.to_string()),
            sqlx::Error::Protocol(message) => Self::store_unavailable(message),
            sqlx::Error::PoolTimedOut => Self::store_unavailable("timed out acquiring connection"),
            sqlx::Error::PoolClosed => Self::store_unavailable("connection pool closed"),
            sqlx::Error::WorkerCrashed => Self::store_unavailable("database worker crashed"),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::internal(format!("migration failed: {err}"))
    }
}
