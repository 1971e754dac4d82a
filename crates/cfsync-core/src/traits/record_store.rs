// # Record Store Trait
//
// Defines the interface to the DNS provider's record API, reduced to the three
// calls reconciliation needs.
//
// ## Implementations
//
// - Cloudflare: `cfsync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use cfsync_core::{AddressFamily, RecordStore};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* RecordStore implementation */;
//
//     match store.find("home.example.com", AddressFamily::V4).await? {
//         Some(record) => println!("{} -> {}", record.domain, record.address),
//         None => println!("no A record yet"),
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::StoreError;
use crate::traits::AddressFamily;

/// Snapshot of an address record as the provider reports it
///
/// Read-only and scoped to a single cycle; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Fully qualified record name
    pub domain: String,
    /// A or AAAA
    pub family: AddressFamily,
    /// Provider-assigned record id (opaque)
    pub record_id: String,
    /// Record content as stored by the provider
    pub address: String,
    /// Whether traffic is routed through the provider's proxy
    pub proxied: bool,
}

impl RemoteRecord {
    /// Whether the record already points at `address`
    ///
    /// Compares parsed addresses so equivalent IPv6 spellings match. Content
    /// that does not parse is treated as different.
    pub fn points_at(&self, address: &IpAddr) -> bool {
        self.address
            .trim()
            .parse::<IpAddr>()
            .map(|current| current == *address)
            .unwrap_or(false)
    }
}

/// Trait for DNS record stores
///
/// Every call is scoped to one (domain, family) pair and performs a bounded
/// number of provider API calls. Implementations never retry, never back off
/// and never delete records: the next scheduled cycle is the retry mechanism.
///
/// # Errors
///
/// [`StoreError::Unauthorized`] signals a broken credential and makes the
/// reconciler abort the whole cycle. Every other variant fails only the pair.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up the record for (domain, family)
    ///
    /// Returns `Ok(None)` if no record exists and
    /// [`StoreError::AmbiguousRecord`] if more than one does.
    async fn find(
        &self,
        domain: &str,
        family: AddressFamily,
    ) -> Result<Option<RemoteRecord>, StoreError>;

    /// Create a record for (domain, family)
    async fn create(
        &self,
        domain: &str,
        family: AddressFamily,
        address: IpAddr,
        proxied: bool,
    ) -> Result<RemoteRecord, StoreError>;

    /// Overwrite the content and proxy flag of an existing record
    async fn update(
        &self,
        domain: &str,
        family: AddressFamily,
        record_id: &str,
        address: IpAddr,
        proxied: bool,
    ) -> Result<RemoteRecord, StoreError>;

    /// Store name (for logging)
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str) -> RemoteRecord {
        RemoteRecord {
            domain: "home.example.com".into(),
            family: AddressFamily::V6,
            record_id: "rec1".into(),
            address: address.into(),
            proxied: false,
        }
    }

    #[test]
    fn points_at_compares_parsed_addresses() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(record("2001:db8::1").points_at(&ip));
        assert!(record("2001:0db8:0:0::1").points_at(&ip));
        assert!(!record("2001:db8::2").points_at(&ip));
    }

    #[test]
    fn unparsable_content_never_matches() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(!record("").points_at(&ip));
        assert!(!record("not-an-ip").points_at(&ip));
    }
}
