//! Content-addressed document store.
//!
//! Documents arrive from direct uploads and from the mailbox sweep. Each
//! payload is keyed by its SHA-256; a second ingestion of identical bytes
//! fails with [`LedgerError::DuplicateContent`] and writes nothing.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::SubsecRound;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::models::{content_hash, Document, DocumentRef, Inserted};
use crate::period::Period;
use crate::store::Store;

#[derive(Clone)]
pub struct DocumentStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl DocumentStore {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Store `payload` under `filename`, stamped with the current time.
    ///
    /// The hash check and the insert are one atomic store operation, so two
    /// concurrent calls with identical bytes cannot both succeed.
    pub async fn ingest(&self, filename: &str, payload: Vec<u8>) -> Result<DocumentRef> {
        let hash = content_hash(&payload);
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_hash: hash.clone(),
            payload,
            created_at: self.clock.now().trunc_subsecs(0),
        };

        match self.store.insert_document(&doc).await? {
            Inserted::Created(doc_ref) => {
                info!(
                    id = %doc_ref.id,
                    filename = %doc_ref.filename,
                    content_hash = %doc_ref.content_hash,
                    "document ingested"
                );
                Ok(doc_ref)
            }
            Inserted::Existing(existing) => {
                debug!(filename, content_hash = %hash, existing = %existing.id, "duplicate content");
                Err(LedgerError::DuplicateContent {
                    content_hash: hash,
                    existing,
                })
            }
        }
    }

    /// Documents created within `period`, oldest first.
    pub async fn list_by_period(&self, period: Period) -> Result<Vec<DocumentRef>> {
        let docs = self.store.documents_in_period(period).await?;
        Ok(docs.iter().map(Document::to_ref).collect())
    }

    /// Distinct periods holding at least one document.
    pub async fn list_periods_with_documents(&self) -> Result<BTreeSet<Period>> {
        let counts = self.store.period_counts().await?;
        Ok(counts.into_iter().map(|(period, _)| period).collect())
    }

    /// `(period, document count)` pairs, newest period first.
    pub async fn period_summaries(&self) -> Result<Vec<(Period, i64)>> {
        let mut counts = self.store.period_counts().await?;
        counts.reverse();
        Ok(counts)
    }
}
