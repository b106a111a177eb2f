//! Cancellable periodic tasks.
//!
//! A [`PeriodicTask`] runs a job on a fixed interval until stopped. Runs never
//! overlap: the next tick is only awaited after the current run returns, and
//! ticks missed while a run overran are skipped rather than queued.
//!
//! Stopping is cooperative. [`PeriodicTask::stop`] signals the loop and waits
//! for it to exit; a run already in progress finishes first.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `job` every `every`, starting immediately.
    pub fn spawn<F, Fut>(name: &'static str, every: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(task = name, interval_secs = every.as_secs(), "periodic task started");

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        // A dropped sender also means stop.
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        debug!(task = name, "tick");
                        job().await;
                    }
                }
            }

            info!(task = name, "periodic task stopped");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task and wait until it has exited.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(task = self.name, error = %e, "periodic task panicked");
        }
    }
}
