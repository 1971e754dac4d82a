//! Reconciliation of address records against the host's public IP
//!
//! The Reconciler is responsible for:
//! - Resolving the public address of each enabled family once per cycle
//! - Reading the provider's current record for every (domain, family) pair
//! - Deciding whether a write is needed ([`UpdatePlan`])
//! - Issuing the minimal create/update call
//! - Reporting every pair's outcome ([`CycleReport`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ IpResolver  │─── ObservedAddress (per family, per cycle) ───┐
//! └─────────────┘                                               │
//!                                                               ▼
//!                                                      ┌──────────────┐
//!                                                      │  Reconciler  │
//!                                                      └──────────────┘
//!                                                               │
//!                               ┌───────────────────────────────┼──────────────┐
//!                               ▼                               ▼              ▼
//!                       ┌──────────────┐              ┌──────────────┐  ┌─────────────┐
//!                       │ RecordStore  │              │ RecordStore  │  │ CycleReport │
//!                       │ (find)       │              │ (create/upd) │  │             │
//!                       └──────────────┘              └──────────────┘  └─────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Resolve every enabled family (concurrently, once)
//! 2. Lookup phase, bounded by `max_concurrency`: disabled family → skipped;
//!    failed resolution → failed; otherwise `find` and plan
//! 3. Write phase, bounded the same way: create/update for every pair whose
//!    plan is not a no-op
//! 4. `Unauthorized` from the provider aborts the cycle: lookups not yet
//!    started and every write not yet issued are skipped. Writes already in
//!    flight when a write is rejected still complete
//! 5. Shutdown stops new pairs and new calls; in-flight calls finish
//!
//! Nothing is remembered between cycles. The provider is the source of truth
//! on every pass.

mod plan;
mod report;

pub use plan::UpdatePlan;
pub use report::{CycleReport, OutcomeCounts, PairFailure, PairOutcome, PairReport, SkipReason};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, ResolutionError, StoreError};
use crate::shutdown::Shutdown;
use crate::traits::{AddressFamily, IpResolver, ObservedAddress, RecordStore};

/// Upper bound for one trait call, as a multiple of the HTTP timeout
///
/// A store call may span several HTTP requests (zone discovery, then the
/// record call), each bounded by the adapter's own timeout.
const CALL_TIMEOUT_FACTOR: u32 = 4;

/// Resolution result per family for one cycle; `None` when the family is disabled
struct Observations {
    v4: Option<Result<ObservedAddress, ResolutionError>>,
    v6: Option<Result<ObservedAddress, ResolutionError>>,
}

impl Observations {
    fn get(&self, family: AddressFamily) -> Option<&Result<ObservedAddress, ResolutionError>> {
        match family {
            AddressFamily::V4 => self.v4.as_ref(),
            AddressFamily::V6 => self.v6.as_ref(),
        }
    }
}

/// Result of the lookup phase for one pair
enum Step {
    /// Nothing left to do
    Done(PairOutcome),
    /// A create or update is needed
    Write(UpdatePlan),
}

/// Cycle-scoped state shared by every pair
struct CycleContext<'a> {
    observations: Observations,
    aborted: AtomicBool,
    shutdown: &'a Shutdown,
}

impl CycleContext<'_> {
    /// Reason to stop before the next provider call, if any
    fn interruption(&self) -> Option<SkipReason> {
        if self.aborted.load(Ordering::SeqCst) {
            Some(SkipReason::Aborted)
        } else if self.shutdown.is_triggered() {
            Some(SkipReason::ShutDown)
        } else {
            None
        }
    }
}

/// Core reconciliation engine
///
/// Holds no mutable state; every call to [`Reconciler::run_cycle`] starts from
/// scratch. The resolver, store and configuration are passed in explicitly so
/// tests can substitute fakes.
pub struct Reconciler {
    /// Public address discovery
    resolver: Arc<dyn IpResolver>,

    /// DNS provider records
    store: Arc<dyn RecordStore>,

    /// Immutable configuration
    config: Arc<Config>,

    /// Upper bound for any single resolver or store call
    call_timeout: Duration,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// Fails if the configuration is invalid, in particular if no address
    /// family is enabled.
    pub fn new(
        resolver: Arc<dyn IpResolver>,
        store: Arc<dyn RecordStore>,
        config: Config,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let call_timeout = config.http_timeout.saturating_mul(CALL_TIMEOUT_FACTOR);

        Ok(Self {
            resolver,
            store,
            config: Arc::new(config),
            call_timeout,
        })
    }

    /// Override the per-call timeout guard
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The configuration this reconciler runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one reconciliation cycle over every configured pair
    pub async fn run_cycle(&self, sequence: u64, shutdown: &Shutdown) -> CycleReport {
        let started = Instant::now();
        let started_at = Utc::now();

        debug!(
            "Cycle {} starting: {} domain(s), families: {:?}",
            sequence,
            self.config.domains.len(),
            self.config.families().collect::<Vec<_>>()
        );

        let (v4, v6) = tokio::join!(
            self.observe(AddressFamily::V4),
            self.observe(AddressFamily::V6)
        );

        let ctx = CycleContext {
            observations: Observations { v4, v6 },
            aborted: AtomicBool::new(false),
            shutdown,
        };

        let pairs: Vec<(&str, AddressFamily)> = self
            .config
            .domains
            .iter()
            .flat_map(|domain| {
                AddressFamily::ALL
                    .into_iter()
                    .map(move |family| (domain.as_str(), family))
            })
            .collect();

        let ctx_ref = &ctx;
        let limit = self.config.max_concurrency;
        let pairs_ref = &pairs;

        // Phase 1: no write starts until every lookup has finished
        let lookups: Vec<(usize, Step)> =
            futures_util::stream::iter(0..pairs.len())
                .map(|index| async move {
                    let (domain, family) = pairs_ref[index];
                    (index, self.lookup_pair(domain, family, ctx_ref).await)
                })
                .buffer_unordered(limit)
                .collect()
                .await;

        let mut outcomes: Vec<(usize, PairOutcome)> = Vec::with_capacity(pairs.len());
        let mut writes: Vec<(usize, UpdatePlan)> = Vec::new();
        for (index, step) in lookups {
            match step {
                Step::Done(outcome) => outcomes.push((index, outcome)),
                Step::Write(plan) => writes.push((index, plan)),
            }
        }

        // Phase 2: the writes the lookups called for
        let applied: Vec<(usize, PairOutcome)> = futures_util::stream::iter(writes)
            .map(|(index, plan)| async move {
                let (domain, family) = pairs_ref[index];
                (index, self.apply_plan(domain, family, plan, ctx_ref).await)
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        outcomes.extend(applied);

        outcomes.sort_by_key(|(index, _)| *index);
        let pairs: Vec<PairReport> = pairs
            .iter()
            .zip(outcomes)
            .map(|(&(domain, family), (_, outcome))| PairReport {
                domain: domain.to_string(),
                family,
                outcome,
            })
            .collect();

        let interrupted = pairs
            .iter()
            .any(|p| p.outcome == PairOutcome::Skipped(SkipReason::ShutDown));

        let report = CycleReport {
            sequence,
            started,
            started_at,
            elapsed: started.elapsed(),
            pairs,
            aborted: ctx.aborted.load(Ordering::SeqCst),
            interrupted,
        };

        if report.aborted {
            error!("{}", report);
        } else if report.counts().failed > 0 {
            warn!("{}", report);
        } else {
            info!("{}", report);
        }

        report
    }

    /// Resolve `family` if it is enabled
    async fn observe(
        &self,
        family: AddressFamily,
    ) -> Option<Result<ObservedAddress, ResolutionError>> {
        if !self.config.is_enabled(family) {
            return None;
        }

        let result = match self.guard(self.resolver.resolve(family)).await {
            Some(result) => result,
            None => Err(ResolutionError::transport(format!(
                "{} lookup timed out after {:?}",
                family, self.call_timeout
            ))),
        };

        match &result {
            Ok(observed) => info!("Public {} address: {}", family, observed.address),
            Err(e) => warn!(
                "Failed to resolve public {} address via {}: {}",
                family,
                self.resolver.name(),
                e
            ),
        }

        Some(result)
    }

    /// Look up a single (domain, family) pair and decide what it needs
    async fn lookup_pair(
        &self,
        domain: &str,
        family: AddressFamily,
        ctx: &CycleContext<'_>,
    ) -> Step {
        let observed = match ctx.observations.get(family) {
            None => return Step::Done(PairOutcome::Skipped(SkipReason::FamilyDisabled)),
            Some(Err(e)) => {
                return Step::Done(PairOutcome::Failed(PairFailure::Resolution(e.clone())));
            }
            Some(Ok(observed)) => observed,
        };

        if let Some(reason) = ctx.interruption() {
            return Step::Done(PairOutcome::Skipped(reason));
        }

        let remote = match self.store_call(self.store.find(domain, family)).await {
            Ok(remote) => remote,
            Err(e) => return Step::Done(self.store_failure(domain, family, "lookup", e, ctx)),
        };

        let plan = UpdatePlan::compute(domain, observed, remote.as_ref(), self.config.proxied);
        if !plan.is_mutating() {
            debug!(
                "{} {} already points at {}",
                family.record_type(),
                domain,
                observed.address
            );
            return Step::Done(PairOutcome::NoOp);
        }

        Step::Write(plan)
    }

    /// Issue the create/update call for a pair, unless the cycle was stopped
    async fn apply_plan(
        &self,
        domain: &str,
        family: AddressFamily,
        plan: UpdatePlan,
        ctx: &CycleContext<'_>,
    ) -> PairOutcome {
        if let Some(reason) = ctx.interruption() {
            debug!("Not applying '{}': {:?}", plan, reason);
            return PairOutcome::Skipped(reason);
        }

        let proxied = self.config.proxied;
        let applied = match &plan {
            UpdatePlan::NoOp => return PairOutcome::NoOp,
            UpdatePlan::Create { address, .. } => {
                self.store_call(self.store.create(domain, family, *address, proxied))
                    .await
            }
            UpdatePlan::Update {
                record_id,
                new_address,
                ..
            } => {
                self.store_call(
                    self.store
                        .update(domain, family, record_id, *new_address, proxied),
                )
                .await
            }
        };

        match applied {
            Ok(record) => {
                info!("Applied {} (record {})", plan, record.record_id);
                PairOutcome::Applied(plan)
            }
            Err(e) => self.store_failure(domain, family, "write", e, ctx),
        }
    }

    /// Record a provider failure, aborting the cycle if it is fatal
    fn store_failure(
        &self,
        domain: &str,
        family: AddressFamily,
        operation: &str,
        err: StoreError,
        ctx: &CycleContext<'_>,
    ) -> PairOutcome {
        if err.is_fatal() {
            if !ctx.aborted.swap(true, Ordering::SeqCst) {
                error!(
                    "{} {} {} rejected by {}: {}; aborting the rest of this cycle",
                    family.record_type(),
                    domain,
                    operation,
                    self.store.name(),
                    err
                );
            }
        } else {
            warn!(
                "{} {} {} failed, will retry next cycle: {}",
                family.record_type(),
                domain,
                operation,
                err
            );
        }
        PairOutcome::Failed(PairFailure::Store(err))
    }

    /// Run a store call under the call timeout guard
    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match self.guard(call).await {
            Some(result) => result,
            None => Err(StoreError::transport(format!(
                "provider call timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Bound a call by `call_timeout`; `None` if it elapsed
    async fn guard<T>(&self, call: impl Future<Output = T>) -> Option<T> {
        tokio::time::timeout(self.call_timeout, call).await.ok()
    }
}
