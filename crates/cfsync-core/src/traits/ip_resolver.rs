// # IP Resolver Trait
//
// Defines the interface for discovering the host's current public address.
//
// ## Implementations
//
// - Address-echo over HTTP: `cfsync-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use cfsync_core::{AddressFamily, IpResolver};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* IpResolver implementation */;
//
//     let observed = resolver.resolve(AddressFamily::V4).await?;
//     println!("public IPv4: {}", observed.address);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::ResolutionError;

/// Address family of a DNS address record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressFamily {
    /// IPv4, published as an A record
    V4,
    /// IPv6, published as an AAAA record
    V6,
}

impl AddressFamily {
    /// Both families, in reconciliation order
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    /// The DNS record type carrying this family
    pub fn record_type(self) -> &'static str {
        match self {
            AddressFamily::V4 => "A",
            AddressFamily::V6 => "AAAA",
        }
    }

    /// The family of an address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(self, ip: &IpAddr) -> bool {
        Self::of(ip) == self
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// A public address observed during one reconciliation cycle
///
/// Produced fresh every cycle and shared read-only by every domain reconciled
/// in that cycle. The family always matches the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedAddress {
    /// Which family was asked for
    pub family: AddressFamily,
    /// The address reported by the resolver
    pub address: IpAddr,
    /// When the address was observed
    pub observed_at: DateTime<Utc>,
}

impl ObservedAddress {
    /// Create an observation timestamped now
    ///
    /// Fails with [`ResolutionError::MalformedResponse`] if `address` is not of `family`.
    pub fn new(family: AddressFamily, address: IpAddr) -> Result<Self, ResolutionError> {
        Self::at(family, address, Utc::now())
    }

    /// Create an observation with an explicit timestamp
    pub fn at(
        family: AddressFamily,
        address: IpAddr,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, ResolutionError> {
        if !family.matches(&address) {
            return Err(ResolutionError::malformed(format!(
                "expected an {} address, got {}",
                family, address
            )));
        }

        Ok(Self {
            family,
            address,
            observed_at,
        })
    }

    /// Parse the text returned by an address-echo service
    pub fn parse(family: AddressFamily, text: &str) -> Result<Self, ResolutionError> {
        let text = text.trim();
        let address: IpAddr = text
            .parse()
            .map_err(|_| ResolutionError::malformed(format!("not an IP address: {:?}", text)))?;
        Self::new(family, address)
    }
}

/// Trait for public IP resolvers
///
/// # Contract
///
/// - One outbound lookup per call, bounded by a timeout.
/// - The lookup must travel over the requested family's transport so a
///   dual-stack host never reports its IPv4 address when asked for IPv6.
/// - The returned address is validated to belong to `family`.
///
/// The reconciler calls `resolve` at most once per family per cycle and shares
/// the result across all domains.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public address of `family`
    async fn resolve(&self, family: AddressFamily) -> Result<ObservedAddress, ResolutionError>;

    /// Resolver name (for logging)
    fn name(&self) -> &'static str;
}
