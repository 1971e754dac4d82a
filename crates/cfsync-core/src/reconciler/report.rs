//! Per-cycle outcome reporting

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::error::{ResolutionError, StoreError};
use crate::reconciler::UpdatePlan;
use crate::traits::AddressFamily;

/// Why a pair was not reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The family is disabled in the configuration
    FamilyDisabled,
    /// An earlier pair hit a fatal provider error in this cycle
    Aborted,
    /// Shutdown was requested before the pair's next call
    ShutDown,
}

/// Why a pair failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairFailure {
    /// The family's public address could not be resolved this cycle
    Resolution(ResolutionError),
    /// A provider call failed
    Store(StoreError),
}

impl PairFailure {
    /// Whether the failure aborted the cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, PairFailure::Store(err) if err.is_fatal())
    }
}

impl fmt::Display for PairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairFailure::Resolution(err) => err.fmt(f),
            PairFailure::Store(err) => err.fmt(f),
        }
    }
}

/// Result of reconciling one (domain, family) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Record already correct
    NoOp,
    /// A create or update call succeeded
    Applied(UpdatePlan),
    /// Resolution or a provider call failed; retried next cycle
    Failed(PairFailure),
    /// Not attempted
    Skipped(SkipReason),
}

/// Outcome of one pair, tagged with the pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairReport {
    pub domain: String,
    pub family: AddressFamily,
    pub outcome: PairOutcome,
}

/// Outcome tallies for a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub noop: usize,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Everything that happened in one reconciliation cycle
///
/// Pairs are listed in configuration order: each domain in turn, IPv4 before IPv6.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Cycle number, starting at 1
    pub sequence: u64,
    /// Monotonic start of the cycle
    pub started: Instant,
    /// Wall-clock start of the cycle
    pub started_at: DateTime<Utc>,
    /// Time the cycle took
    pub elapsed: Duration,
    /// Per-pair outcomes
    pub pairs: Vec<PairReport>,
    /// A fatal provider error cut the cycle short
    pub aborted: bool,
    /// Shutdown was observed before every pair finished
    pub interrupted: bool,
}

impl CycleReport {
    /// Tally outcomes by kind
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for pair in &self.pairs {
            match pair.outcome {
                PairOutcome::NoOp => counts.noop += 1,
                PairOutcome::Applied(_) => counts.applied += 1,
                PairOutcome::Failed(_) => counts.failed += 1,
                PairOutcome::Skipped(_) => counts.skipped += 1,
            }
        }
        counts
    }

    /// Outcome for a specific pair
    pub fn outcome(&self, domain: &str, family: AddressFamily) -> Option<&PairOutcome> {
        self.pairs
            .iter()
            .find(|p| p.domain == domain && p.family == family)
            .map(|p| &p.outcome)
    }

    /// Whether every attempted pair ended without failure
    pub fn is_clean(&self) -> bool {
        self.counts().failed == 0 && !self.aborted
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self.counts();
        write!(
            f,
            "cycle {}: {} unchanged, {} applied, {} failed, {} skipped in {:?}",
            self.sequence, counts.noop, counts.applied, counts.failed, counts.skipped, self.elapsed
        )?;
        if self.aborted {
            f.write_str(" (aborted)")?;
        }
        if self.interrupted {
            f.write_str(" (interrupted by shutdown)")?;
        }
        Ok(())
    }
}
