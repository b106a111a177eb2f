//! Directory-backed mail source.
//!
//! Treats a directory of `*.eml` files as an inbox. Files are ordered by
//! name, so names that sort chronologically (e.g. a timestamp prefix) give
//! the same "newest last" ordering as an IMAP sequence. The file name is the
//! message id; deleting a message removes its file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;

use super::{connection_failure, Envelope, MailSession, MailSource, MailboxStatus, RawMessage};

pub struct SpoolMailSource {
    dir: PathBuf,
}

impl SpoolMailSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MailSource for SpoolMailSource {
    async fn connect(&self) -> Result<Box<dyn MailSession>> {
        if !self.dir.is_dir() {
            return Err(connection_failure(
                "spool directory unavailable",
                self.dir.display(),
            ));
        }
        Ok(Box::new(SpoolSession {
            dir: self.dir.clone(),
            listing: Vec::new(),
        }))
    }

    fn describe(&self) -> String {
        format!("spool:{}", self.dir.display())
    }
}

struct SpoolSession {
    dir: PathBuf,
    /// Snapshot taken by `select_inbox`; sequence number `n` is `listing[n - 1]`.
    listing: Vec<PathBuf>,
}

fn scan(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| connection_failure("failed to list spool", e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_eml = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("eml"))
            .unwrap_or(false);
        if is_eml {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[async_trait]
impl MailSession for SpoolSession {
    async fn select_inbox(&mut self) -> Result<MailboxStatus> {
        self.listing = scan(&self.dir)?;
        Ok(MailboxStatus {
            message_count: self.listing.len() as u32,
        })
    }

    async fn fetch_range(&mut self, from: u32, to: u32) -> Result<Vec<RawMessage>> {
        let mut messages = Vec::new();
        for seq in from.max(1)..=to {
            let Some(path) = self.listing.get(seq as usize - 1) else {
                break;
            };
            let body = tokio::fs::read(path)
                .await
                .map_err(|e| connection_failure(&format!("failed to read {}", path.display()), e))?;
            let envelope = Envelope::from_rfc822(&body)?;
            let id = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            debug!(seq, id = %id, subject = %envelope.subject, "fetched spool message");
            messages.push(RawMessage { id, envelope, body });
        }
        Ok(messages)
    }

    async fn delete_and_expunge(&mut self, id: &str) -> Result<()> {
        let path = self.dir.join(id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| connection_failure(&format!("failed to delete {}", path.display()), e))?;
        self.listing.retain(|p| p != &path);
        Ok(())
    }
}
