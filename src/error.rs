//! Error taxonomy for the ingestion and acknowledgment core.
//!
//! Expected outcomes (duplicate content, empty period, unknown archive) are
//! typed variants so callers can branch on them. Mailbox and timeout
//! failures abort the current sweep. Storage failures are carried as
//! [`LedgerError::Persistence`] wrapping the adapter's `anyhow` error.

use std::time::Duration;

use thiserror::Error;

use crate::models::DocumentRef;
use crate::period::Period;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Content with this hash is already stored.
    #[error("document with content hash {content_hash} already exists ({})", .existing.filename)]
    DuplicateContent {
        content_hash: String,
        existing: DocumentRef,
    },

    /// No documents fall in the requested period.
    #[error("no documents for period {0}")]
    EmptyPeriod(Period),

    #[error("not found: {0}")]
    NotFound(String),

    /// Mail source unreachable or the session broke mid-sweep.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("authentication failure: {0}")]
    AuthFailure(String),

    /// The sweep exceeded its overall time bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A message could not be parsed as MIME.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    #[error("invalid period {0}")]
    InvalidPeriod(String),
}

impl LedgerError {
    /// Short machine-readable code, used in logs and status notifications.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateContent { .. } => "duplicate_content",
            LedgerError::EmptyPeriod(_) => "empty_period",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::ConnectionFailure(_) => "connection_failure",
            LedgerError::AuthFailure(_) => "auth_failure",
            LedgerError::Timeout(_) => "timeout",
            LedgerError::MalformedMessage(_) => "malformed_message",
            LedgerError::Persistence(_) => "persistence_failure",
            LedgerError::InvalidPeriod(_) => "invalid_period",
        }
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Persistence(err)
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
