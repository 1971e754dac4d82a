//! Core traits for cfsync
//!
//! The reconciler only talks to the outside world through these interfaces.
//!
//! - [`IpResolver`]: discover the host's public address per family
//! - [`RecordStore`]: read and write A/AAAA records at the DNS provider

pub mod ip_resolver;
pub mod record_store;

pub use ip_resolver::{AddressFamily, IpResolver, ObservedAddress};
pub use record_store::{RecordStore, RemoteRecord};
