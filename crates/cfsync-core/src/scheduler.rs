//! Periodic driver for the reconciler
//!
//! Runs one cycle immediately, then one every `update_interval`, measured from
//! the start of a cycle to the start of the next. A cycle that overruns the
//! interval is followed immediately by the next one; missed ticks are never
//! replayed as a burst. Exactly one cycle runs at a time.
//!
//! There is no backoff here: a pair that failed is simply retried by the next
//! tick.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::reconciler::{CycleReport, Reconciler};
use crate::shutdown::Shutdown;

/// Default capacity of the report channel
pub const DEFAULT_REPORT_CHANNEL_CAPACITY: usize = 16;

/// Drives [`Reconciler::run_cycle`] on a fixed interval until shutdown
pub struct Scheduler {
    /// The reconciler to drive
    reconciler: Reconciler,

    /// Time between cycle starts
    interval: Duration,

    /// Optional sink for cycle reports
    report_tx: Option<mpsc::Sender<CycleReport>>,
}

impl Scheduler {
    /// Create a scheduler using the reconciler's configured interval
    pub fn new(reconciler: Reconciler) -> Self {
        let interval = reconciler.config().update_interval;
        Self {
            reconciler,
            interval,
            report_tx: None,
        }
    }

    /// Also publish every cycle report on a bounded channel
    ///
    /// When the channel is full, reports are dropped with a warning so a slow
    /// consumer can never stall the loop.
    pub fn with_reports(mut self, capacity: usize) -> (Self, mpsc::Receiver<CycleReport>) {
        let (tx, rx) = mpsc::channel(capacity);
        self.report_tx = Some(tx);
        (self, rx)
    }

    /// The interval between cycle starts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until `shutdown` fires
    ///
    /// Returns the number of cycles that ran. A cycle in progress when
    /// shutdown fires finishes its in-flight calls before this returns.
    pub async fn run(&self, shutdown: Shutdown) -> u64 {
        info!(
            "Scheduler started: {} domain(s), every {:?}",
            self.reconciler.config().domains.len(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sequence: u64 = 0;
        let mut unauthorized_streak: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!("Shutdown requested, not starting another cycle");
                    break;
                }

                _ = ticker.tick() => {}
            }

            if shutdown.is_triggered() {
                break;
            }

            sequence += 1;
            let report = self.reconciler.run_cycle(sequence, &shutdown).await;

            if report.aborted {
                unauthorized_streak += 1;
                error!(
                    "Provider rejected the API token ({} consecutive cycle(s)); will try again in {:?}",
                    unauthorized_streak, self.interval
                );
            } else {
                unauthorized_streak = 0;
            }

            self.publish(report);
        }

        info!("Scheduler stopped after {} cycle(s)", sequence);
        sequence
    }

    /// Offer a report to the report channel, if any
    fn publish(&self, report: CycleReport) {
        let Some(tx) = &self.report_tx else {
            return;
        };

        match tx.try_send(report) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => {
                warn!(
                    "Report channel full, dropping report for cycle {}",
                    report.sequence
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
