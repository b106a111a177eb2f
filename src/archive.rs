//! Period archive builder.
//!
//! Bundles every document of a calendar period into one zip and records the
//! bundle in the archive table keyed by its SHA-256. The same document set
//! always produces the same bytes: entries are sorted by filename (ties by
//! content hash), written with a fixed timestamp and fixed permissions.
//! Rebuilding an unchanged period therefore returns the existing archive,
//! while a period that gained documents yields a new archive row and keeps
//! the old ones for receipt matching.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;

use anyhow::Context;
use chrono::SubsecRound;
use tracing::info;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::models::{content_hash, Archive, Document};
use crate::period::Period;
use crate::store::Store;

/// An archive row together with the bundle bytes it was computed from.
#[derive(Debug, Clone)]
pub struct BuiltArchive {
    pub archive: Archive,
    pub bytes: Vec<u8>,
    /// `false` when an identical bundle had already been recorded.
    pub created: bool,
}

#[derive(Clone)]
pub struct ArchiveBuilder {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    name_prefix: String,
}

impl ArchiveBuilder {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, name_prefix: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            name_prefix: name_prefix.into(),
        }
    }

    /// File name of the bundle for `period`, e.g. `invoices_2024-01.zip`.
    pub fn archive_filename(&self, period: Period) -> String {
        format!("{}_{}.zip", self.name_prefix, period)
    }

    pub async fn build(&self, period: Period) -> Result<BuiltArchive> {
        let documents = self.store.documents_in_period(period).await?;
        if documents.is_empty() {
            return Err(LedgerError::EmptyPeriod(period));
        }

        let folder = format!("{}_{}", self.name_prefix, period);
        let bytes = bundle(&folder, &documents)?;
        let hash = content_hash(&bytes);

        let candidate = Archive {
            id: Uuid::new_v4().to_string(),
            filename: self.archive_filename(period),
            content_hash: hash,
            period,
            created_at: self.clock.now().trunc_subsecs(0),
        };

        let inserted = self.store.insert_archive(&candidate).await?;
        let created = inserted.is_created();
        let archive = inserted.into_inner();
        info!(
            period = %period,
            documents = documents.len(),
            content_hash = %archive.content_hash,
            created,
            "archive built"
        );

        Ok(BuiltArchive {
            archive,
            bytes,
            created,
        })
    }

    /// Every archive recorded for `period`, oldest first.
    pub async fn history(&self, period: Period) -> Result<Vec<Archive>> {
        Ok(self.store.archives_for_period(period).await?)
    }

    /// Look up a previously built archive by bundle hash.
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Archive> {
        match self.store.find_archive_by_hash(content_hash).await? {
            Some(archive) => Ok(archive),
            None => Err(LedgerError::NotFound(format!("archive {}", content_hash))),
        }
    }
}

/// Write `documents` into a zip under `folder/`, in canonical order.
fn bundle(folder: &str, documents: &[Document]) -> Result<Vec<u8>> {
    let mut ordered: Vec<&Document> = documents.iter().collect();
    ordered.sort_by(|a, b| {
        a.filename
            .cmp(&b.filename)
            .then_with(|| a.content_hash.cmp(&b.content_hash))
    });

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used: HashSet<String> = HashSet::new();

    for doc in ordered {
        let name = entry_name(doc, &mut used);
        writer
            .start_file(format!("{}/{}", folder, name), options)
            .with_context(|| format!("failed to add {} to archive", name))?;
        writer
            .write_all(&doc.payload)
            .with_context(|| format!("failed to write {} to archive", name))?;
    }

    let cursor = writer.finish().context("failed to finish archive")?;
    Ok(cursor.into_inner())
}

/// A unique, path-free entry name for `doc`.
///
/// Colliding names get the first 8 hex digits of the content hash appended
/// to the stem, then a counter if that is taken too. Documents are visited
/// in canonical order, so the result is a function of the document set.
fn entry_name(doc: &Document, used: &mut HashSet<String>) -> String {
    let base = sanitize_filename(&doc.filename);
    if used.insert(base.clone()) {
        return base;
    }

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base.as_str(), None),
    };
    let short = &doc.content_hash[..doc.content_hash.len().min(8)];
    let with_suffix = |suffix: &str| match ext {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext),
        None => format!("{}-{}", stem, suffix),
    };

    let mut candidate = with_suffix(short);
    let mut n = 2u32;
    while !used.insert(candidate.clone()) {
        candidate = with_suffix(&format!("{}-{}", short, n));
        n += 1;
    }
    candidate
}

fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if last.is_empty() || last == "." || last == ".." {
        "document".to_string()
    } else {
        last.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Read;

    fn doc(filename: &str, payload: &[u8], minute: u32) -> Document {
        Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_hash: content_hash(payload),
            payload: payload.to_vec(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 10, 12, minute, 0).unwrap(),
        }
    }

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_bundle_independent_of_input_order() {
        let a = doc("b.pdf", b"second", 1);
        let b = doc("a.pdf", b"first", 2);
        let c = doc("c.pdf", b"third", 3);

        let one = bundle("invoices_2024-01", &[a.clone(), b.clone(), c.clone()]).unwrap();
        let two = bundle("invoices_2024-01", &[c, a, b]).unwrap();
        assert_eq!(one, two);
        assert_eq!(
            entry_names(&one),
            vec![
                "invoices_2024-01/a.pdf",
                "invoices_2024-01/b.pdf",
                "invoices_2024-01/c.pdf"
            ]
        );
    }

    #[test]
    fn test_colliding_names_are_disambiguated() {
        let x = doc("invoice.pdf", b"one", 1);
        let y = doc("invoice.pdf", b"two", 2);
        let bytes = bundle("f", &[y.clone(), x.clone()]).unwrap();
        let names = entry_names(&bytes);
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"f/invoice.pdf".to_string()));

        let (first, second) = if x.content_hash < y.content_hash {
            (&x, &y)
        } else {
            (&y, &x)
        };
        let expected = format!("f/invoice-{}.pdf", &second.content_hash[..8]);
        assert!(names.contains(&expected), "names: {:?}", names);

        let mut archive = zip::ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let mut body = Vec::new();
        archive
            .by_name("f/invoice.pdf")
            .unwrap()
            .read_to_end(&mut body)
            .unwrap();
        assert_eq!(body, first.payload);
    }

    #[test]
    fn test_suffixed_name_already_taken() {
        let x = doc("invoice.pdf", b"one", 1);
        let y = doc("invoice.pdf", b"two", 2);
        let second = if x.content_hash < y.content_hash { &y } else { &x };
        let short = &second.content_hash[..8];
        let squatter = doc(&format!("invoice-{}.pdf", short), b"three", 3);

        let bytes = bundle("f", &[x.clone(), y.clone(), squatter.clone()]).unwrap();
        let names = entry_names(&bytes);
        assert_eq!(names.len(), 3);
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(names.contains(&format!("f/invoice-{}.pdf", short)));
        assert!(names.contains(&format!("f/invoice-{}-2.pdf", short)));

        let mut archive = zip::ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let mut body = Vec::new();
        archive
            .by_name(&format!("f/invoice-{}-2.pdf", short))
            .unwrap()
            .read_to_end(&mut body)
            .unwrap();
        assert_eq!(body, second.payload);
    }

    #[test]
    fn test_sanitize_filename_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\inv.pdf"), "inv.pdf");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("dir/"), "document");
    }
}
