// # cfsync-core
//
// Core library for keeping DNS address records in sync with the host's
// public IP address.
//
// ## Architecture Overview
//
// - **IpResolver**: Trait for discovering the current public IPv4/IPv6 address
// - **RecordStore**: Trait for reading and writing A/AAAA records at the provider
// - **Reconciler**: One pass comparing observed addresses against provider state
// - **Scheduler**: Runs the reconciler on a fixed interval until shutdown
// - **Config**: Validated, immutable settings loaded from the environment
//
// ## Design Principles
//
// 1. **Provider is truth**: Remote state is re-read every cycle; nothing is persisted locally
// 2. **Idempotency**: A second cycle with no external change issues no writes
// 3. **Failure isolation**: One pair's failure never stops the others
// 4. **Explicit context**: Config, collaborators and shutdown are passed in, never global
// 5. **Library-First**: The daemon is a thin wrapper around this crate

pub mod config;
pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod shutdown;
pub mod traits;

// Re-export core types for convenience
pub use config::Config;
pub use error::{ConfigError, Error, ResolutionError, Result, StoreError};
pub use reconciler::{CycleReport, PairFailure, PairOutcome, Reconciler, SkipReason, UpdatePlan};
pub use scheduler::Scheduler;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use traits::{AddressFamily, IpResolver, ObservedAddress, RecordStore, RemoteRecord};
