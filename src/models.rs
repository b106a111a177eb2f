//! Core data models.
//!
//! These are the rows the [`Store`](crate::store::Store) persists: ingested
//! documents, generated archives, and notification targets with their
//! acknowledgment watermark.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::period::Period;

/// An ingested document. Immutable once stored.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    /// Hex SHA-256 of `payload`; unique across all documents.
    pub content_hash: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn to_ref(&self) -> DocumentRef {
        DocumentRef {
            id: self.id.clone(),
            filename: self.filename.clone(),
            content_hash: self.content_hash.clone(),
            created_at: self.created_at,
        }
    }
}

/// Lightweight handle to a stored document (no payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRef {
    pub id: String,
    pub filename: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A generated period bundle. The period never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    pub id: String,
    pub filename: String,
    pub content_hash: String,
    pub period: Period,
    pub created_at: DateTime<Utc>,
}

/// A chat or channel that receives nag and status notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationTarget {
    pub id: String,
    pub enabled: bool,
    /// Latest period acknowledged as delivered; `None` if never acknowledged.
    pub last_acknowledged: Option<Period>,
}

/// Result of an atomic insert-if-absent keyed by content hash.
#[derive(Debug, Clone)]
pub enum Inserted<T> {
    /// The row was new and has been written.
    Created(T),
    /// A row with the same key already existed; it is returned unchanged.
    Existing(T),
}

impl<T> Inserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Inserted::Created(v) | Inserted::Existing(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Inserted::Created(_))
    }
}

/// Hex-encoded SHA-256 digest used as the dedup key for documents and archives.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(b"abc").len(), 64);
    }
}
