//! Mailbox ingestion sweep.
//!
//! One sweep opens a mail session, fetches the newest `fetch_window`
//! messages, and routes each leaf part by MIME type:
//!
//! | Type | Action |
//! |------|--------|
//! | `application/pdf` | ingest into the document store, report the outcome to all enabled targets |
//! | `application/zip` | if the bytes match a built archive, acknowledge its period for all enabled targets |
//! | anything else | ignored |
//!
//! A processed message is deleted and expunged before the next one is
//! touched. Any fetch, parse, or storage error aborts the rest of the sweep;
//! messages already deleted stay deleted and the rest are retried by the
//! next sweep.
//!
//! # Exclusivity
//!
//! Sweeps are serialized by a lock held for the whole run. A sweep started
//! while another is in flight returns [`SweepOutcome::AlreadyRunning`]
//! immediately instead of queueing. The lock guard is dropped on every exit
//! path, including timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveBuilder;
use crate::documents::DocumentStore;
use crate::error::{LedgerError, Result};
use crate::gateway::{broadcast, NotificationGateway};
use crate::ledger::AcknowledgmentLedger;
use crate::mailbox::mime::{MIME_PDF, MIME_ZIP};
use crate::mailbox::{
    fetch_window, leaf_parts, Attachment, Envelope, MailSession, MailSource, MailboxStatus,
    RawMessage,
};
use crate::models::content_hash;
use crate::period::Period;

#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    /// Maximum number of (newest) messages fetched per sweep.
    pub fetch_window: u32,
    /// Bound on the whole sweep, connect through last delete.
    pub timeout: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            fetch_window: 10,
            timeout: Duration::from_secs(60),
        }
    }
}

/// What a sweep did before it finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub messages_processed: usize,
    pub documents_ingested: usize,
    pub duplicates: usize,
    /// Periods acknowledged through returned archives, in message order.
    pub acknowledged: Vec<Period>,
    pub ignored_parts: usize,
}

#[derive(Debug)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep held the lock.
    AlreadyRunning,
    Failed(LedgerError),
}

impl SweepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SweepOutcome::Completed(_))
    }
}

pub struct MailboxSweep {
    source: Arc<dyn MailSource>,
    documents: DocumentStore,
    archives: ArchiveBuilder,
    ledger: AcknowledgmentLedger,
    gateway: Arc<dyn NotificationGateway>,
    settings: SweepSettings,
    lock: Mutex<()>,
}

impl MailboxSweep {
    pub fn new(
        source: Arc<dyn MailSource>,
        documents: DocumentStore,
        archives: ArchiveBuilder,
        ledger: AcknowledgmentLedger,
        gateway: Arc<dyn NotificationGateway>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            source,
            documents,
            archives,
            ledger,
            gateway,
            settings,
            lock: Mutex::new(()),
        }
    }

    /// Run one sweep unless another is already in flight.
    pub async fn run(&self) -> SweepOutcome {
        let Ok(_guard) = self.lock.try_lock() else {
            info!("mailbox sweep already running, skipping");
            return SweepOutcome::AlreadyRunning;
        };

        info!(source = %self.source.describe(), "mailbox sweep started");
        let timeout = self.settings.timeout;
        let outcome = match tokio::time::timeout(timeout, self.sweep()).await {
            Ok(Ok(report)) => SweepOutcome::Completed(report),
            Ok(Err(e)) => SweepOutcome::Failed(e),
            Err(_) => SweepOutcome::Failed(LedgerError::Timeout(timeout)),
        };

        match &outcome {
            SweepOutcome::Completed(report) => info!(
                messages = report.messages_processed,
                ingested = report.documents_ingested,
                duplicates = report.duplicates,
                acknowledged = report.acknowledged.len(),
                "mailbox sweep completed"
            ),
            SweepOutcome::Failed(e) => {
                error!(code = e.code(), error = %e, "mailbox sweep failed")
            }
            SweepOutcome::AlreadyRunning => {}
        }
        outcome
    }

    /// Connect and select the inbox once, holding the sweep lock. Bounded by
    /// the sweep timeout.
    pub async fn probe(&self) -> Result<MailboxStatus> {
        let _guard = self.lock.lock().await;
        let timeout = self.settings.timeout;
        let status = tokio::time::timeout(timeout, self.select_once())
            .await
            .map_err(|_| LedgerError::Timeout(timeout))??;
        info!(
            source = %self.source.describe(),
            messages = status.message_count,
            "mailbox reachable"
        );
        Ok(status)
    }

    async fn select_once(&self) -> Result<MailboxStatus> {
        let mut session = self.source.connect().await?;
        let status = session.select_inbox().await;
        if let Err(e) = session.logout().await {
            debug!(error = %e, "logout after probe failed");
        }
        status
    }

    async fn sweep(&self) -> Result<SweepReport> {
        let mut session = self.source.connect().await?;
        let mut report = SweepReport::default();
        let result = self.sweep_session(session.as_mut(), &mut report).await;
        if let Err(e) = session.logout().await {
            debug!(error = %e, "logout after sweep failed");
        }
        result.map(|()| report)
    }

    async fn sweep_session(
        &self,
        session: &mut dyn MailSession,
        report: &mut SweepReport,
    ) -> Result<()> {
        let status = session.select_inbox().await?;
        let Some((from, to)) = fetch_window(status.message_count, self.settings.fetch_window)
        else {
            debug!("mailbox empty");
            return Ok(());
        };

        let messages = session.fetch_range(from, to).await?;
        debug!(total = status.message_count, from, to, fetched = messages.len(), "fetched messages");

        for message in messages {
            self.process_message(&message, report).await?;
            session.delete_and_expunge(&message.id).await?;
            report.messages_processed += 1;
        }
        Ok(())
    }

    async fn process_message(&self, message: &RawMessage, report: &mut SweepReport) -> Result<()> {
        info!(id = %message.id, subject = %message.envelope.subject, "processing message");
        let parts = leaf_parts(&message.body)?;

        for part in parts {
            debug!(mime_type = %part.mime_type, filename = %part.filename, "part");
            match part.mime_type.as_str() {
                MIME_PDF => self.handle_pdf(&message.envelope, part, report).await?,
                MIME_ZIP => self.handle_zip(&message.envelope, part, report).await?,
                _ => report.ignored_parts += 1,
            }
        }
        Ok(())
    }

    async fn handle_pdf(
        &self,
        envelope: &Envelope,
        part: Attachment,
        report: &mut SweepReport,
    ) -> Result<()> {
        let result = match self.documents.ingest(&part.filename, part.content).await {
            Ok(_) => {
                report.documents_ingested += 1;
                "success".to_string()
            }
            Err(e @ LedgerError::DuplicateContent { .. }) => {
                report.duplicates += 1;
                e.to_string()
            }
            Err(e) => return Err(e),
        };

        let targets = self.ledger.enabled_targets().await?;
        let text = invoice_status_text(&part.filename, envelope, &result);
        let dispatch = broadcast(self.gateway.as_ref(), &targets, &text).await;
        if !dispatch.failed.is_empty() {
            warn!(failed = dispatch.failed.len(), "invoice status not delivered to all targets");
        }
        Ok(())
    }

    async fn handle_zip(
        &self,
        envelope: &Envelope,
        part: Attachment,
        report: &mut SweepReport,
    ) -> Result<()> {
        let hash = content_hash(&part.content);
        let archive = match self.archives.find_by_hash(&hash).await {
            Ok(archive) => archive,
            Err(LedgerError::NotFound(_)) => {
                debug!(filename = %part.filename, content_hash = %hash, "zip is not a known archive");
                report.ignored_parts += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let targets = self.ledger.enabled_targets().await?;
        for target in &targets {
            self.ledger
                .record_acknowledgment(&target.id, archive.period)
                .await?;
        }
        report.acknowledged.push(archive.period);
        info!(
            period = %archive.period,
            archive = %archive.filename,
            sender = %envelope.sender(),
            targets = targets.len(),
            "archive receipt matched"
        );

        let text = receipt_text(&part.filename, envelope, archive.period);
        broadcast(self.gateway.as_ref(), &targets, &text).await;
        Ok(())
    }
}

pub fn invoice_status_text(filename: &str, envelope: &Envelope, result: &str) -> String {
    format!(
        "Received e-mail invoice:\nFile name: {}\nSubject: {}\nSender: {}\nProcessing result: {}",
        filename,
        envelope.subject,
        envelope.sender(),
        result
    )
}

pub fn receipt_text(filename: &str, envelope: &Envelope, period: Period) -> String {
    let recipients: Vec<&str> = envelope
        .cc
        .iter()
        .chain(envelope.to.iter())
        .map(String::as_str)
        .collect();
    format!(
        "Received e-mail zip file: {} from {}\nMarking month {} as sent.\nCC, To: {}",
        filename,
        envelope.sender(),
        period,
        recipients.join(", ")
    )
}
