//! Per-target acknowledgment ledger.
//!
//! Each notification target carries a watermark: the latest period that has
//! been acknowledged as delivered to accounting. The watermark only moves
//! forward. Targets opt in and out through this module as well; opting out
//! disables the target but keeps its watermark.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::models::NotificationTarget;
use crate::period::Period;
use crate::store::Store;

#[derive(Clone)]
pub struct AcknowledgmentLedger {
    store: Arc<dyn Store>,
}

impl AcknowledgmentLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Raise `target`'s watermark to `period` if it is later than the
    /// current one. Returns `true` when the watermark moved.
    pub async fn record_acknowledgment(&self, target: &str, period: Period) -> Result<bool> {
        let moved = self.store.advance_acknowledgment(target, period).await?;
        if moved {
            info!(target_id = target, period = %period, "acknowledgment recorded");
        } else {
            debug!(target_id = target, period = %period, "acknowledgment not newer, ignored");
        }
        Ok(moved)
    }

    /// Like [`record_acknowledgment`](Self::record_acknowledgment) but fails
    /// with [`LedgerError::NotFound`] for an unknown target.
    pub async fn acknowledge(&self, target: &str, period: Period) -> Result<NotificationTarget> {
        if self.store.get_target(target).await?.is_none() {
            return Err(LedgerError::NotFound(format!("target {}", target)));
        }
        self.record_acknowledgment(target, period).await?;
        self.target(target).await
    }

    pub async fn opt_in(&self, target: &str) -> Result<NotificationTarget> {
        let t = self.store.enable_target(target).await?;
        info!(target_id = target, "target opted in");
        Ok(t)
    }

    /// Returns `false` if the target was never registered.
    pub async fn opt_out(&self, target: &str) -> Result<bool> {
        let existed = self.store.disable_target(target).await?;
        info!(target_id = target, existed, "target opted out");
        Ok(existed)
    }

    pub async fn target(&self, target: &str) -> Result<NotificationTarget> {
        self.store
            .get_target(target)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("target {}", target)))
    }

    pub async fn enabled_targets(&self) -> Result<Vec<NotificationTarget>> {
        let targets = self.store.list_targets().await?;
        Ok(targets.into_iter().filter(|t| t.enabled).collect())
    }

    pub async fn all_targets(&self) -> Result<Vec<NotificationTarget>> {
        Ok(self.store.list_targets().await?)
    }
}

/// Periods in `known` that are before `current` and after the target's
/// watermark, ascending.
pub fn pending_periods(
    target: &NotificationTarget,
    known: &BTreeSet<Period>,
    current: Period,
) -> Vec<Period> {
    known
        .iter()
        .copied()
        .filter(|p| *p < current)
        .filter(|p| target.last_acknowledged.map_or(true, |ack| *p > ack))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    fn target(ack: Option<Period>) -> NotificationTarget {
        NotificationTarget {
            id: "chat".to_string(),
            enabled: true,
            last_acknowledged: ack,
        }
    }

    #[test]
    fn test_pending_excludes_current_period() {
        let known: BTreeSet<Period> = [p(2024, 1), p(2024, 2), p(2024, 5)].into_iter().collect();
        let pending = pending_periods(&target(None), &known, p(2024, 5));
        assert_eq!(pending, vec![p(2024, 1), p(2024, 2)]);
    }

    #[test]
    fn test_pending_excludes_future_periods() {
        let known: BTreeSet<Period> = [p(2024, 1), p(2024, 7)].into_iter().collect();
        let pending = pending_periods(&target(None), &known, p(2024, 5));
        assert_eq!(pending, vec![p(2024, 1)]);
    }

    #[test]
    fn test_pending_respects_watermark() {
        let known: BTreeSet<Period> = [p(2023, 11), p(2023, 12), p(2024, 1), p(2024, 2)]
            .into_iter()
            .collect();
        let pending = pending_periods(&target(Some(p(2023, 12))), &known, p(2024, 3));
        assert_eq!(pending, vec![p(2024, 1), p(2024, 2)]);
    }

    #[test]
    fn test_pending_empty_when_fully_acknowledged() {
        let known: BTreeSet<Period> = [p(2024, 1), p(2024, 2)].into_iter().collect();
        let pending = pending_periods(&target(Some(p(2024, 2))), &known, p(2024, 3));
        assert!(pending.is_empty());
    }
}
