//! Notification scheduler.
//!
//! Each run works out, for every enabled target, which elapsed periods hold
//! documents that have not been acknowledged yet, and sends that target one
//! consolidated reminder. The scheduler never acknowledges anything itself,
//! so a period keeps being reported on every run until a receipt or an
//! explicit acknowledgment moves the target's watermark past it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::documents::DocumentStore;
use crate::error::Result;
use crate::gateway::NotificationGateway;
use crate::ledger::{pending_periods, AcknowledgmentLedger};
use crate::period::{format_periods, Period};

/// Summary of one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// `(target id, pending periods)` for every target that was sent a reminder.
    pub notified: Vec<(String, Vec<Period>)>,
    /// Targets whose reminder could not be dispatched.
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    documents: DocumentStore,
    ledger: AcknowledgmentLedger,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
}

impl NotificationScheduler {
    pub fn new(
        documents: DocumentStore,
        ledger: AcknowledgmentLedger,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            documents,
            ledger,
            gateway,
            clock,
        }
    }

    pub async fn run_once(&self) -> Result<SchedulerReport> {
        let current = self.clock.current_period();
        let mut known = self.documents.list_periods_with_documents().await?;
        known.retain(|p| *p < current);

        let targets = self.ledger.enabled_targets().await?;
        let mut report = SchedulerReport::default();

        for target in &targets {
            let pending = pending_periods(target, &known, current);
            if pending.is_empty() {
                continue;
            }

            match self
                .gateway
                .send_text(&target.id, &reminder_text(&pending))
                .await
            {
                Ok(()) => report.notified.push((target.id.clone(), pending)),
                Err(e) => {
                    warn!(target_id = %target.id, error = %e, "reminder dispatch failed");
                    report.failed.push(target.id.clone());
                }
            }
        }

        info!(
            current = %current,
            known_periods = known.len(),
            targets = targets.len(),
            notified = report.notified.len(),
            failed = report.failed.len(),
            "notification run finished"
        );
        Ok(report)
    }
}

pub fn reminder_text(pending: &[Period]) -> String {
    format!(
        "You have invoices to send to accounting for the following months: {}",
        format_periods(pending)
    )
}
