//! Storage abstraction for the ingestion core.
//!
//! The [`Store`] trait is the persistence port used by the document store,
//! archive builder, and acknowledgment ledger. Backends must make two
//! primitives atomic:
//!
//! - **insert-if-absent by content hash** ([`insert_document`](Store::insert_document),
//!   [`insert_archive`](Store::insert_archive)): two concurrent inserts of the
//!   same hash yield exactly one `Created` and one `Existing`.
//! - **compare-and-advance** ([`advance_acknowledgment`](Store::advance_acknowledgment)):
//!   the stored watermark becomes `max(current, period)`, never an overwrite.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`insert_document`](Store::insert_document) | Insert a document unless its hash exists |
//! | [`documents_in_period`](Store::documents_in_period) | Documents created within a period |
//! | [`period_counts`](Store::period_counts) | Document count per period |
//! | [`insert_archive`](Store::insert_archive) | Insert an archive unless its hash exists |
//! | [`find_archive_by_hash`](Store::find_archive_by_hash) | Look up an archive by bundle hash |
//! | [`archives_for_period`](Store::archives_for_period) | Every archive built for a period |
//! | [`enable_target`](Store::enable_target) | Create or re-enable a notification target |
//! | [`disable_target`](Store::disable_target) | Disable a notification target |
//! | [`advance_acknowledgment`](Store::advance_acknowledgment) | Monotonic watermark update |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Archive, Document, DocumentRef, Inserted, NotificationTarget};
use crate::period::Period;

pub use memory::InMemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert `doc` unless a document with the same `content_hash` exists.
    ///
    /// On conflict the existing row is returned and nothing is written.
    async fn insert_document(&self, doc: &Document) -> Result<Inserted<DocumentRef>>;

    /// All documents whose `created_at` falls in `period`, oldest first.
    /// Ties keep insertion order.
    async fn documents_in_period(&self, period: Period) -> Result<Vec<Document>>;

    /// Number of documents per period, ascending by period. Periods without
    /// documents are absent.
    async fn period_counts(&self) -> Result<Vec<(Period, i64)>>;

    async fn count_documents(&self) -> Result<i64>;

    /// Insert `archive` unless an archive with the same `content_hash` exists.
    async fn insert_archive(&self, archive: &Archive) -> Result<Inserted<Archive>>;

    async fn find_archive_by_hash(&self, content_hash: &str) -> Result<Option<Archive>>;

    /// Every archive built for `period`, oldest first.
    async fn archives_for_period(&self, period: Period) -> Result<Vec<Archive>>;

    async fn count_archives(&self) -> Result<i64>;

    /// Create the target (never acknowledged) or re-enable it, keeping its
    /// acknowledgment watermark.
    async fn enable_target(&self, id: &str) -> Result<NotificationTarget>;

    /// Disable the target. Returns `false` if it does not exist.
    async fn disable_target(&self, id: &str) -> Result<bool>;

    async fn get_target(&self, id: &str) -> Result<Option<NotificationTarget>>;

    /// All targets, enabled or not, ordered by id.
    async fn list_targets(&self) -> Result<Vec<NotificationTarget>>;

    /// Set the target's watermark to `period` if and only if `period` is
    /// strictly after the current one (or none is recorded).
    ///
    /// Returns `true` when the watermark moved, `false` for a no-op or an
    /// unknown target.
    async fn advance_acknowledgment(&self, id: &str, period: Period) -> Result<bool>;
}
