// # Cloudflare Record Store
//
// This crate provides the Cloudflare implementation of [`RecordStore`] for
// cfsync.
//
// ## What it does
//
// - Looks up the zone owning a record name (cached per record name)
// - Lists the A/AAAA records of a name
// - Creates (POST) and updates (PATCH) a single record
//
// It makes exactly one API call per operation, plus zone discovery the first
// time a name is seen. Retrying, scheduling and deciding whether a write is
// needed at all belong to the reconciler.
//
// ## Error Mapping
//
// | Response                       | Error           |
// |--------------------------------|-----------------|
// | 401, 403                       | `Unauthorized`  |
// | 404                            | `NotFound`      |
// | 429                            | `RateLimited`   |
// | 5xx, other, `success: false`   | `ProviderFault` |
// | connect failure, timeout       | `Transport`     |
//
// ## Security Requirements
//
// - API token NEVER appears in logs
// - API token NEVER appears in error messages
// - Debug output redacts the token

mod api;

use api::{DnsRecord, Envelope, ErrorBody, RecordPayload, Zone};
use cfsync_core::traits::{AddressFamily, RecordStore, RemoteRecord};
use cfsync_core::{Config, StoreError};

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Record id reported for creates that dry-run mode skipped
pub const DRY_RUN_RECORD_ID: &str = "dry-run";

/// Cloudflare DNS record store
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the store will:
/// - Perform all GET requests (zone lookup, record lookup)
/// - Log the intended POST/PATCH payload
/// - **NOT** modify any record
pub struct CloudflareStore {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL, overridable for tests
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: read, but never write
    dry_run: bool,

    /// Zone id per record name
    zones: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for CloudflareStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareStore")
            .field("api_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareStore {
    /// Create a new Cloudflare store
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:Read and DNS:Edit permissions
    /// - `dry_run`: If true, perform lookups but skip writes
    /// - `timeout`: bound for every API request
    ///
    /// # Security
    ///
    /// The API token will NEVER be logged or displayed in error messages.
    pub fn new(
        api_token: impl Into<String>,
        dry_run: bool,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(StoreError::unauthorized("Cloudflare API token is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
            zones: RwLock::new(HashMap::new()),
        })
    }

    /// Create a store from the daemon configuration
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::new(config.token.clone(), config.dry_run, config.http_timeout)
    }

    /// Point the store at another API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Get the zone id owning `domain`
    ///
    /// Tries every suffix of `domain` with at least two labels, longest first,
    /// so delegated sub-zones win over their parent.
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com&status=active
    /// Authorization: Bearer <token>
    /// ```
    async fn zone_id(&self, domain: &str) -> Result<String, StoreError> {
        if let Some(zone_id) = self.zones.read().await.get(domain) {
            return Ok(zone_id.clone());
        }

        for candidate in zone_candidates(domain) {
            tracing::debug!("Looking up zone {} for {}", candidate, domain);

            let request = self
                .client
                .get(format!("{}/zones", self.api_base))
                .query(&[("name", candidate), ("status", "active")]);
            let zones: Vec<Zone> = self.send(request, "zone lookup").await?;

            if let Some(zone) = zones.into_iter().next() {
                tracing::debug!("Zone for {} is {} ({})", domain, zone.name, zone.id);
                self.zones
                    .write()
                    .await
                    .insert(domain.to_string(), zone.id.clone());
                return Ok(zone.id);
            }
        }

        Err(StoreError::not_found(format!("no Cloudflare zone owns {}", domain)))
    }

    /// Send a record call made under `domain`'s cached zone id
    ///
    /// A 404 drops the cached id; the next call for `domain` rediscovers the
    /// zone.
    async fn send_in_zone<T: DeserializeOwned>(
        &self,
        domain: &str,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, StoreError> {
        let result = self.send(request, what).await;

        if matches!(result, Err(StoreError::NotFound(_)))
            && self.zones.write().await.remove(domain).is_some()
        {
            tracing::debug!("Dropped cached zone for {} after {} returned 404", domain, what);
        }

        result
    }

    /// Send a request and unwrap the API envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, StoreError> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| StoreError::transport(format!("{} request failed: {}", what, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);

            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .filter(|b| !b.errors.is_empty())
                .map(|b| api::join_messages(&b.errors))
                .unwrap_or_else(|| status.to_string());

            return Err(match status.as_u16() {
                401 | 403 => StoreError::unauthorized(format!("{} rejected: {}", what, detail)),
                404 => StoreError::not_found(format!("{}: {}", what, detail)),
                429 => StoreError::RateLimited { retry_after },
                500..=599 => {
                    StoreError::provider_fault(format!("{}: server error {} - {}", what, status, detail))
                }
                _ => StoreError::provider_fault(format!("{} failed: {} - {}", what, status, detail)),
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            StoreError::provider_fault(format!("failed to parse {} response: {}", what, e))
        })?;

        envelope.into_result(what)
    }

    fn to_remote(domain: &str, family: AddressFamily, record: DnsRecord) -> RemoteRecord {
        RemoteRecord {
            domain: domain.to_string(),
            family,
            record_id: record.id,
            address: record.content,
            proxied: record.proxied,
        }
    }
}

#[async_trait]
impl RecordStore for CloudflareStore {
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=home.example.com
    /// ```
    async fn find(
        &self,
        domain: &str,
        family: AddressFamily,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        let zone_id = self.zone_id(domain).await?;

        let request = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
            .query(&[("type", family.record_type()), ("name", domain)]);
        let records: Vec<DnsRecord> = self.send_in_zone(domain, request, "record lookup").await?;

        // The type filter is a query hint; drop anything of another type
        let mut records: Vec<DnsRecord> = records
            .into_iter()
            .filter(|r| r.record_type == family.record_type())
            .collect();

        match records.len() {
            0 => {
                tracing::debug!("No {} record for {}", family.record_type(), domain);
                Ok(None)
            }
            1 => {
                let record = records.remove(0);
                tracing::debug!(
                    "Found {} record for {}: {} (id {})",
                    family.record_type(),
                    record.name,
                    record.content,
                    record.id
                );
                Ok(Some(Self::to_remote(domain, family, record)))
            }
            count => Err(StoreError::AmbiguousRecord {
                domain: domain.to_string(),
                family,
                count,
            }),
        }
    }

    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type":"A","name":"home.example.com","content":"203.0.113.7","proxied":false,"ttl":1}
    /// ```
    async fn create(
        &self,
        domain: &str,
        family: AddressFamily,
        address: IpAddr,
        proxied: bool,
    ) -> Result<RemoteRecord, StoreError> {
        let payload = RecordPayload {
            record_type: family.record_type(),
            name: domain,
            content: address.to_string(),
            proxied,
            ttl: Some(1),
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would create {} {} -> {} (proxied: {})",
                payload.record_type,
                domain,
                payload.content,
                proxied
            );
            return Ok(RemoteRecord {
                domain: domain.to_string(),
                family,
                record_id: DRY_RUN_RECORD_ID.to_string(),
                address: payload.content,
                proxied,
            });
        }

        let zone_id = self.zone_id(domain).await?;
        let request = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
            .json(&payload);
        let record: DnsRecord = self.send_in_zone(domain, request, "record create").await?;

        tracing::info!(
            "Created {} {} -> {} (id {})",
            record.record_type,
            record.name,
            record.content,
            record.id
        );
        Ok(Self::to_remote(domain, family, record))
    }

    /// # API Call
    ///
    /// ```http
    /// PATCH /zones/:zone_id/dns_records/:record_id
    /// {"type":"A","name":"home.example.com","content":"203.0.113.7","proxied":false}
    /// ```
    async fn update(
        &self,
        domain: &str,
        family: AddressFamily,
        record_id: &str,
        address: IpAddr,
        proxied: bool,
    ) -> Result<RemoteRecord, StoreError> {
        let payload = RecordPayload {
            record_type: family.record_type(),
            name: domain,
            content: address.to_string(),
            proxied,
            ttl: None,
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would update {} {} (id {}) -> {} (proxied: {})",
                payload.record_type,
                domain,
                record_id,
                payload.content,
                proxied
            );
            return Ok(RemoteRecord {
                domain: domain.to_string(),
                family,
                record_id: record_id.to_string(),
                address: payload.content,
                proxied,
            });
        }

        let zone_id = self.zone_id(domain).await?;
        let request = self
            .client
            .patch(format!(
                "{}/zones/{}/dns_records/{}",
                self.api_base, zone_id, record_id
            ))
            .json(&payload);
        let record: DnsRecord = self.send_in_zone(domain, request, "record update").await?;

        tracing::info!(
            "Updated {} {} -> {} (id {})",
            record.record_type,
            record.name,
            record.content,
            record.id
        );
        Ok(Self::to_remote(domain, family, record))
    }

    fn name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Zone names that could own `domain`, longest first
///
/// `a.b.example.co.uk` yields `a.b.example.co.uk`, `b.example.co.uk`,
/// `example.co.uk`, `co.uk`. A leading wildcard label is never a zone.
fn zone_candidates(domain: &str) -> Vec<&str> {
    std::iter::once(domain)
        .chain(domain.match_indices('.').map(|(i, _)| &domain[i + 1..]))
        .filter(|candidate| candidate.contains('.') && !candidate.starts_with("*."))
        .collect()
}
