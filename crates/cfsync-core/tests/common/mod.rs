//! Test doubles and common utilities for reconciliation contract tests
//!
//! The fakes record every call so tests can assert on exactly which provider
//! operations a cycle issued.

#![allow(dead_code)]

use cfsync_core::traits::{AddressFamily, IpResolver, ObservedAddress, RecordStore, RemoteRecord};
use cfsync_core::{Config, ResolutionError, StoreError};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A resolver whose answers are set by the test
pub struct FakeResolver {
    answers: Mutex<HashMap<AddressFamily, Result<IpAddr, ResolutionError>>>,
    v4_calls: AtomicUsize,
    v6_calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            v4_calls: AtomicUsize::new(0),
            v6_calls: AtomicUsize::new(0),
        }
    }

    /// Answer IPv4 lookups with `ip`
    pub fn with_v4(self, ip: &str) -> Self {
        self.set(AddressFamily::V4, Ok(ip.parse().unwrap()));
        self
    }

    /// Answer IPv6 lookups with `ip`
    pub fn with_v6(self, ip: &str) -> Self {
        self.set(AddressFamily::V6, Ok(ip.parse().unwrap()));
        self
    }

    /// Change the answer for a family
    pub fn set(&self, family: AddressFamily, answer: Result<IpAddr, ResolutionError>) {
        self.answers.lock().unwrap().insert(family, answer);
    }

    /// Number of lookups for a family
    pub fn calls(&self, family: AddressFamily) -> usize {
        match family {
            AddressFamily::V4 => self.v4_calls.load(Ordering::SeqCst),
            AddressFamily::V6 => self.v6_calls.load(Ordering::SeqCst),
        }
    }
}

#[async_trait::async_trait]
impl IpResolver for FakeResolver {
    async fn resolve(&self, family: AddressFamily) -> Result<ObservedAddress, ResolutionError> {
        match family {
            AddressFamily::V4 => self.v4_calls.fetch_add(1, Ordering::SeqCst),
            AddressFamily::V6 => self.v6_calls.fetch_add(1, Ordering::SeqCst),
        };

        let answer = self
            .answers
            .lock()
            .unwrap()
            .get(&family)
            .cloned()
            .unwrap_or_else(|| Err(ResolutionError::transport("no answer configured")));

        ObservedAddress::new(family, answer?)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// A provider call observed by [`FakeStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Find {
        domain: String,
        family: AddressFamily,
    },
    Create {
        domain: String,
        family: AddressFamily,
        address: IpAddr,
        proxied: bool,
    },
    Update {
        domain: String,
        family: AddressFamily,
        record_id: String,
        address: IpAddr,
        proxied: bool,
    },
}

impl StoreCall {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, StoreCall::Find { .. })
    }
}

/// An in-memory record store with failure injection
pub struct FakeStore {
    records: Mutex<HashMap<(String, AddressFamily), Vec<RemoteRecord>>>,
    calls: Mutex<Vec<StoreCall>>,
    find_errors: Mutex<HashMap<String, StoreError>>,
    write_errors: Mutex<HashMap<String, StoreError>>,
    find_delay: Mutex<Option<Duration>>,
    domain_find_delays: Mutex<HashMap<String, Duration>>,
    next_id: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            find_errors: Mutex::new(HashMap::new()),
            write_errors: Mutex::new(HashMap::new()),
            find_delay: Mutex::new(None),
            domain_find_delays: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Seed a record, as if it had been created out-of-band
    pub fn seed(&self, domain: &str, family: AddressFamily, address: &str, proxied: bool) {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records
            .lock()
            .unwrap()
            .entry((domain.to_string(), family))
            .or_default()
            .push(RemoteRecord {
                domain: domain.to_string(),
                family,
                record_id: id,
                address: address.to_string(),
                proxied,
            });
    }

    /// Make `find` for `domain` fail
    pub fn fail_find(&self, domain: &str, err: StoreError) {
        self.find_errors
            .lock()
            .unwrap()
            .insert(domain.to_string(), err);
    }

    /// Make `create`/`update` for `domain` fail
    pub fn fail_write(&self, domain: &str, err: StoreError) {
        self.write_errors
            .lock()
            .unwrap()
            .insert(domain.to_string(), err);
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        self.find_errors.lock().unwrap().clear();
        self.write_errors.lock().unwrap().clear();
    }

    /// Delay every `find` by `delay`
    pub fn delay_find(&self, delay: Duration) {
        *self.find_delay.lock().unwrap() = Some(delay);
    }

    /// Delay `find` for `domain` only, overriding [`FakeStore::delay_find`]
    pub fn delay_find_for(&self, domain: &str, delay: Duration) {
        self.domain_find_delays
            .lock()
            .unwrap()
            .insert(domain.to_string(), delay);
    }

    /// Current records for a pair
    pub fn records(&self, domain: &str, family: AddressFamily) -> Vec<RemoteRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(domain.to_string(), family))
            .cloned()
            .unwrap_or_default()
    }

    /// Every call in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Create/update calls only
    pub fn mutating_calls(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(StoreCall::is_mutating)
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record_call(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn write_error(&self, domain: &str) -> Option<StoreError> {
        self.write_errors.lock().unwrap().get(domain).cloned()
    }
}

#[async_trait::async_trait]
impl RecordStore for FakeStore {
    async fn find(
        &self,
        domain: &str,
        family: AddressFamily,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        self.record_call(StoreCall::Find {
            domain: domain.to_string(),
            family,
        });

        let delay = self
            .domain_find_delays
            .lock()
            .unwrap()
            .get(domain)
            .copied()
            .or(*self.find_delay.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.find_errors.lock().unwrap().get(domain).cloned() {
            return Err(err);
        }

        let records = self.records(domain, family);
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.into_iter().next()),
            count => Err(StoreError::AmbiguousRecord {
                domain: domain.to_string(),
                family,
                count,
            }),
        }
    }

    async fn create(
        &self,
        domain: &str,
        family: AddressFamily,
        address: IpAddr,
        proxied: bool,
    ) -> Result<RemoteRecord, StoreError> {
        self.record_call(StoreCall::Create {
            domain: domain.to_string(),
            family,
            address,
            proxied,
        });

        if let Some(err) = self.write_error(domain) {
            return Err(err);
        }

        let record = RemoteRecord {
            domain: domain.to_string(),
            family,
            record_id: format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            address: address.to_string(),
            proxied,
        };
        self.records
            .lock()
            .unwrap()
            .entry((domain.to_string(), family))
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        domain: &str,
        family: AddressFamily,
        record_id: &str,
        address: IpAddr,
        proxied: bool,
    ) -> Result<RemoteRecord, StoreError> {
        self.record_call(StoreCall::Update {
            domain: domain.to_string(),
            family,
            record_id: record_id.to_string(),
            address,
            proxied,
        });

        if let Some(err) = self.write_error(domain) {
            return Err(err);
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&(domain.to_string(), family))
            .and_then(|list| list.iter_mut().find(|r| r.record_id == record_id))
            .ok_or_else(|| StoreError::not_found(format!("record {}", record_id)))?;
        record.address = address.to_string();
        record.proxied = proxied;
        Ok(record.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Helper to create a minimal config for testing
pub fn config(domains: &[&str]) -> Config {
    Config::new("test-token", domains.iter().copied()).with_max_concurrency(1)
}
