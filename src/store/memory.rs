//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Every table lives behind one `RwLock`, so each trait method runs under a
//! single write (or read) guard and check-then-insert is atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Archive, Document, DocumentRef, Inserted, NotificationTarget};
use crate::period::Period;

use super::Store;

#[derive(Default)]
struct Tables {
    /// Insertion-ordered; index by hash below.
    documents: Vec<Document>,
    document_by_hash: HashMap<String, usize>,
    archives: Vec<Archive>,
    archive_by_hash: HashMap<String, usize>,
    targets: BTreeMap<String, NotificationTarget>,
}

/// In-memory store. Contents are lost when dropped.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<Inserted<DocumentRef>> {
        let mut tables = self.write()?;
        if let Some(&idx) = tables.document_by_hash.get(&doc.content_hash) {
            return Ok(Inserted::Existing(tables.documents[idx].to_ref()));
        }
        let idx = tables.documents.len();
        tables.documents.push(doc.clone());
        tables
            .document_by_hash
            .insert(doc.content_hash.clone(), idx);
        Ok(Inserted::Created(doc.to_ref()))
    }

    async fn documents_in_period(&self, period: Period) -> Result<Vec<Document>> {
        let tables = self.read()?;
        let mut docs: Vec<Document> = tables
            .documents
            .iter()
            .filter(|d| period.contains(d.created_at))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    async fn period_counts(&self) -> Result<Vec<(Period, i64)>> {
        let tables = self.read()?;
        let mut counts: BTreeMap<Period, i64> = BTreeMap::new();
        for doc in &tables.documents {
            *counts.entry(Period::of(doc.created_at)).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn count_documents(&self) -> Result<i64> {
        Ok(self.read()?.documents.len() as i64)
    }

    async fn insert_archive(&self, archive: &Archive) -> Result<Inserted<Archive>> {
        let mut tables = self.write()?;
        if let Some(&idx) = tables.archive_by_hash.get(&archive.content_hash) {
            return Ok(Inserted::Existing(tables.archives[idx].clone()));
        }
        let idx = tables.archives.len();
        tables.archives.push(archive.clone());
        tables
            .archive_by_hash
            .insert(archive.content_hash.clone(), idx);
        Ok(Inserted::Created(archive.clone()))
    }

    async fn find_archive_by_hash(&self, content_hash: &str) -> Result<Option<Archive>> {
        let tables = self.read()?;
        Ok(tables
            .archive_by_hash
            .get(content_hash)
            .map(|&idx| tables.archives[idx].clone()))
    }

    async fn archives_for_period(&self, period: Period) -> Result<Vec<Archive>> {
        let tables = self.read()?;
        Ok(tables
            .archives
            .iter()
            .filter(|a| a.period == period)
            .cloned()
            .collect())
    }

    async fn count_archives(&self) -> Result<i64> {
        Ok(self.read()?.archives.len() as i64)
    }

    async fn enable_target(&self, id: &str) -> Result<NotificationTarget> {
        let mut tables = self.write()?;
        let target = tables
            .targets
            .entry(id.to_string())
            .or_insert_with(|| NotificationTarget {
                id: id.to_string(),
                enabled: true,
                last_acknowledged: None,
            });
        target.enabled = true;
        Ok(target.clone())
    }

    async fn disable_target(&self, id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        match tables.targets.get_mut(id) {
            Some(target) => {
                target.enabled = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_target(&self, id: &str) -> Result<Option<NotificationTarget>> {
        Ok(self.read()?.targets.get(id).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<NotificationTarget>> {
        Ok(self.read()?.targets.values().cloned().collect())
    }

    async fn advance_acknowledgment(&self, id: &str, period: Period) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(target) = tables.targets.get_mut(id) else {
            return Ok(false);
        };
        match target.last_acknowledged {
            Some(current) if current >= period => Ok(false),
            _ => {
                target.last_acknowledged = Some(period);
                Ok(true)
            }
        }
    }
}
