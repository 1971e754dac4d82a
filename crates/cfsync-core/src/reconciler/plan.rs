//! Update planning
//!
//! The decision of what to write is a pure function of the observed address,
//! the provider's current record and the configured proxy flag.

use std::fmt;
use std::net::IpAddr;

use crate::traits::{AddressFamily, ObservedAddress, RemoteRecord};

/// What the reconciler intends to do for one (domain, family) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    /// Record already matches; nothing to write
    NoOp,

    /// No record exists yet
    Create {
        domain: String,
        family: AddressFamily,
        address: IpAddr,
    },

    /// Record exists but its address or proxy flag is stale
    Update {
        domain: String,
        family: AddressFamily,
        record_id: String,
        old_address: String,
        new_address: IpAddr,
    },
}

impl UpdatePlan {
    /// Diff the observed address against the provider's record
    ///
    /// - no record → `Create`
    /// - different address or proxy flag → `Update`
    /// - otherwise → `NoOp`
    pub fn compute(
        domain: &str,
        observed: &ObservedAddress,
        remote: Option<&RemoteRecord>,
        proxied: bool,
    ) -> Self {
        match remote {
            None => UpdatePlan::Create {
                domain: domain.to_string(),
                family: observed.family,
                address: observed.address,
            },
            Some(record) if !record.points_at(&observed.address) || record.proxied != proxied => {
                UpdatePlan::Update {
                    domain: domain.to_string(),
                    family: observed.family,
                    record_id: record.record_id.clone(),
                    old_address: record.address.clone(),
                    new_address: observed.address,
                }
            }
            Some(_) => UpdatePlan::NoOp,
        }
    }

    /// Whether applying the plan calls the provider
    pub fn is_mutating(&self) -> bool {
        !matches!(self, UpdatePlan::NoOp)
    }
}

impl fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePlan::NoOp => f.write_str("no-op"),
            UpdatePlan::Create {
                domain,
                family,
                address,
            } => write!(f, "create {} {} -> {}", family.record_type(), domain, address),
            UpdatePlan::Update {
                domain,
                family,
                old_address,
                new_address,
                ..
            } => write!(
                f,
                "update {} {} {} -> {}",
                family.record_type(),
                domain,
                old_address,
                new_address
            ),
        }
    }
}
