// # HTTP IP Resolver
//
// This crate provides an address-echo based [`IpResolver`] for cfsync.
//
// ## Architecture
//
// Each family has its own endpoint (e.g. `https://v4.ident.me`,
// `https://v6.ident.me`) and its own `reqwest::Client`. The client is bound to
// the unspecified address of its family (`0.0.0.0` or `::`), so the request
// can only leave over that family's transport. On a dual-stack host this
// guarantees an IPv6 lookup never reports the IPv4 address and vice versa.
//
// The response body must be a bare address literal of the requested family.
// Anything else is a `MalformedResponse`.
//
// ## No Caching
//
// Every call performs exactly one request. The reconciler already calls each
// family at most once per cycle and shares the result.

use cfsync_core::traits::{AddressFamily, IpResolver, ObservedAddress};
use cfsync_core::{Config, ResolutionError};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;

/// Default timeout for echo requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest body accepted from an echo service
const MAX_BODY_LEN: usize = 128;

/// One family's endpoint and pinned client
#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    client: reqwest::Client,
}

impl Endpoint {
    fn new(family: AddressFamily, url: String, timeout: Duration) -> Result<Self, ResolutionError> {
        let local: IpAddr = match family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .local_address(local)
            .build()
            .map_err(|e| {
                ResolutionError::transport(format!("failed to build {} HTTP client: {}", family, e))
            })?;

        Ok(Self { url, client })
    }
}

/// Address-echo IP resolver
#[derive(Debug, Clone)]
pub struct HttpIpResolver {
    v4: Endpoint,
    v6: Endpoint,
}

impl HttpIpResolver {
    /// Create a resolver for explicit endpoints
    ///
    /// # Parameters
    ///
    /// - `ipv4_url`: endpoint answering with the caller's IPv4 address
    /// - `ipv6_url`: endpoint answering with the caller's IPv6 address
    /// - `timeout`: bound for each lookup
    pub fn new(
        ipv4_url: impl Into<String>,
        ipv6_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ResolutionError> {
        Ok(Self {
            v4: Endpoint::new(AddressFamily::V4, ipv4_url.into(), timeout)?,
            v6: Endpoint::new(AddressFamily::V6, ipv6_url.into(), timeout)?,
        })
    }

    /// Create a resolver from the daemon configuration
    pub fn from_config(config: &Config) -> Result<Self, ResolutionError> {
        Self::new(
            config.echo_url(AddressFamily::V4),
            config.echo_url(AddressFamily::V6),
            config.http_timeout,
        )
    }

    fn endpoint(&self, family: AddressFamily) -> &Endpoint {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve(&self, family: AddressFamily) -> Result<ObservedAddress, ResolutionError> {
        let endpoint = self.endpoint(family);
        tracing::debug!("Resolving public {} address via {}", family, endpoint.url);

        let mut response = endpoint
            .client
            .get(&endpoint.url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await
            .map_err(|e| ResolutionError::transport(format!("request to {} failed: {}", endpoint.url, e)))?;

        if !response.status().is_success() {
            return Err(ResolutionError::transport(format!(
                "{} answered with HTTP {}",
                endpoint.url,
                response.status()
            )));
        }

        let oversized = || {
            ResolutionError::malformed(format!(
                "response from {} is over {} bytes, expected a bare address",
                endpoint.url, MAX_BODY_LEN
            ))
        };

        if response
            .content_length()
            .is_some_and(|len| len > MAX_BODY_LEN as u64)
        {
            return Err(oversized());
        }

        // Stop reading as soon as the body is too long
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ResolutionError::transport(format!("failed to read response: {}", e)))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > MAX_BODY_LEN {
                return Err(oversized());
            }
        }

        let body = String::from_utf8(bytes).map_err(|_| {
            ResolutionError::malformed(format!("response from {} is not UTF-8", endpoint.url))
        })?;

        ObservedAddress::parse(family, &body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
