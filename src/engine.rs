//! Component wiring.
//!
//! [`Engine`] owns one instance of every component over a shared store,
//! clock, and gateway, and is what the CLI and the long-running service
//! talk to. Cloning is cheap; clones share the same sweep lock.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::archive::{ArchiveBuilder, BuiltArchive};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::documents::DocumentStore;
use crate::error::{LedgerError, Result};
use crate::gateway::{create_gateway, NotificationGateway};
use crate::ledger::{pending_periods, AcknowledgmentLedger};
use crate::mailbox::{MailSource, MailboxStatus, SpoolMailSource};
use crate::models::{Archive, DocumentRef, NotificationTarget};
use crate::period::Period;
use crate::scheduler::{NotificationScheduler, SchedulerReport};
use crate::sqlite_store::SqliteStore;
use crate::store::Store;
use crate::sweep::{MailboxSweep, SweepOutcome, SweepSettings};
use crate::tasks::PeriodicTask;

#[derive(Clone)]
pub struct Engine {
    clock: Arc<dyn Clock>,
    gateway: Arc<dyn NotificationGateway>,
    documents: DocumentStore,
    archives: ArchiveBuilder,
    ledger: AcknowledgmentLedger,
    scheduler: NotificationScheduler,
    sweep: Option<Arc<MailboxSweep>>,
}

/// Inputs for [`Engine::new`].
pub struct EngineParts {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub gateway: Arc<dyn NotificationGateway>,
    pub mail_source: Option<Arc<dyn MailSource>>,
    pub archive_prefix: String,
    pub sweep: SweepSettings,
}

impl Engine {
    pub fn new(parts: EngineParts) -> Self {
        let EngineParts {
            store,
            clock,
            gateway,
            mail_source,
            archive_prefix,
            sweep,
        } = parts;

        let documents = DocumentStore::new(store.clone(), clock.clone());
        let archives = ArchiveBuilder::new(store.clone(), clock.clone(), archive_prefix);
        let ledger = AcknowledgmentLedger::new(store);
        let scheduler = NotificationScheduler::new(
            documents.clone(),
            ledger.clone(),
            gateway.clone(),
            clock.clone(),
        );
        let sweep = mail_source.map(|source| {
            Arc::new(MailboxSweep::new(
                source,
                documents.clone(),
                archives.clone(),
                ledger.clone(),
                gateway.clone(),
                sweep,
            ))
        });

        Self {
            clock,
            gateway,
            documents,
            archives,
            ledger,
            scheduler,
            sweep,
        }
    }

    /// Open the configured SQLite store and gateway with the system clock.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(config).await?;
        let gateway = create_gateway(&config.gateway)?;
        let mail_source = config
            .mailbox
            .spool_dir
            .as_ref()
            .map(|dir| Arc::new(SpoolMailSource::new(dir)) as Arc<dyn MailSource>);

        Ok(Self::new(EngineParts {
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            gateway,
            mail_source,
            archive_prefix: config.archive.name_prefix.clone(),
            sweep: SweepSettings {
                fetch_window: config.mailbox.fetch_window,
                timeout: config.mailbox.timeout(),
            },
        }))
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn archives(&self) -> &ArchiveBuilder {
        &self.archives
    }

    pub fn ledger(&self) -> &AcknowledgmentLedger {
        &self.ledger
    }

    pub fn has_mailbox(&self) -> bool {
        self.sweep.is_some()
    }

    pub async fn ingest_document(&self, filename: &str, payload: Vec<u8>) -> Result<DocumentRef> {
        self.documents.ingest(filename, payload).await
    }

    pub async fn build_archive(&self, period: Period) -> Result<BuiltArchive> {
        self.archives.build(period).await
    }

    /// Build the archive for `period` and send it to `target_id`.
    pub async fn send_archive(
        &self,
        period: Period,
        target_id: &str,
    ) -> anyhow::Result<BuiltArchive> {
        let built = self.archives.build(period).await?;
        self.gateway
            .send_file(target_id, &built.archive.filename, &built.bytes)
            .await
            .with_context(|| format!("failed to send {} to {}", built.archive.filename, target_id))?;
        Ok(built)
    }

    pub async fn archive_history(&self, period: Period) -> Result<Vec<Archive>> {
        self.archives.history(period).await
    }

    pub async fn period_summaries(&self) -> Result<Vec<(Period, i64)>> {
        self.documents.period_summaries().await
    }

    pub async fn opt_in(&self, target_id: &str) -> Result<NotificationTarget> {
        self.ledger.opt_in(target_id).await
    }

    pub async fn opt_out(&self, target_id: &str) -> Result<bool> {
        self.ledger.opt_out(target_id).await
    }

    pub async fn acknowledge(&self, target_id: &str, period: Period) -> Result<NotificationTarget> {
        self.ledger.acknowledge(target_id, period).await
    }

    pub async fn targets(&self) -> Result<Vec<NotificationTarget>> {
        self.ledger.all_targets().await
    }

    /// Periods `target_id` would currently be reminded about.
    pub async fn pending_for(&self, target_id: &str) -> Result<Vec<Period>> {
        let target = self.ledger.target(target_id).await?;
        let known = self.documents.list_periods_with_documents().await?;
        Ok(pending_periods(&target, &known, self.clock.current_period()))
    }

    pub async fn notify_once(&self) -> Result<SchedulerReport> {
        self.scheduler.run_once().await
    }

    /// Run one mailbox sweep. Without a configured mailbox this fails with
    /// a connection failure.
    pub async fn run_sweep(&self) -> SweepOutcome {
        match &self.sweep {
            Some(sweep) => sweep.run().await,
            None => SweepOutcome::Failed(LedgerError::ConnectionFailure(
                "no mailbox configured".to_string(),
            )),
        }
    }

    pub async fn probe_mailbox(&self) -> Result<MailboxStatus> {
        match &self.sweep {
            Some(sweep) => sweep.probe().await,
            None => Err(LedgerError::ConnectionFailure(
                "no mailbox configured".to_string(),
            )),
        }
    }

    pub fn start_scheduler(&self, every: std::time::Duration) -> PeriodicTask {
        let scheduler = self.scheduler.clone();
        PeriodicTask::spawn("notification-scheduler", every, move || {
            let scheduler = scheduler.clone();
            async move {
                if let Err(e) = scheduler.run_once().await {
                    warn!(code = e.code(), error = %e, "notification run failed");
                }
            }
        })
    }

    /// Probe the mailbox once, then sweep it every `every`. Returns `None`
    /// when no mailbox is configured; a failed probe is an error and no task
    /// is started.
    pub async fn start_sweeper(
        &self,
        every: std::time::Duration,
    ) -> anyhow::Result<Option<PeriodicTask>> {
        let Some(sweep) = self.sweep.clone() else {
            return Ok(None);
        };
        let status = sweep
            .probe()
            .await
            .context("Mailbox probe failed; check [mailbox] settings")?;
        info!(messages = status.message_count, "mailbox probe ok");

        Ok(Some(PeriodicTask::spawn("mailbox-sweep", every, move || {
            let sweep = sweep.clone();
            async move {
                sweep.run().await;
            }
        })))
    }
}
