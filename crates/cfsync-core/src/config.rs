//! Configuration for cfsync
//!
//! Settings come from environment variables (see the table below) and are
//! validated once at startup. A [`Config`] is immutable afterwards and handed
//! to the reconciler and scheduler by reference.
//!
//! | Key | Default | Meaning |
//! |---|---|---|
//! | `CF_TOKEN` | required | API bearer token |
//! | `CF_DOMAINS` | required | Comma-separated record names |
//! | `CF_IPV4_ENABLED` | `true` | Reconcile A records |
//! | `CF_IPV6_ENABLED` | `false` | Reconcile AAAA records |
//! | `CF_PROXIED` | `false` | Proxy flag written on create/update |
//! | `CF_UPDATE_INTERVAL` | `300` | Seconds between cycle starts |
//! | `CF_LOG_LEVEL` | `info` | trace, debug, info, warn or error |
//! | `CF_DRY_RUN` | `false` | Read from the provider but never write |
//! | `CF_HTTP_TIMEOUT` | `10` | Seconds allowed per outbound HTTP call |
//! | `CF_MAX_CONCURRENCY` | `4` | Pairs reconciled concurrently |
//! | `CF_IPV4_URL` | `https://v4.ident.me` | IPv4 address-echo endpoint |
//! | `CF_IPV6_URL` | `https://v6.ident.me` | IPv6 address-echo endpoint |

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::traits::AddressFamily;

pub const KEY_TOKEN: &str = "CF_TOKEN";
pub const KEY_DOMAINS: &str = "CF_DOMAINS";
pub const KEY_IPV4_ENABLED: &str = "CF_IPV4_ENABLED";
pub const KEY_IPV6_ENABLED: &str = "CF_IPV6_ENABLED";
pub const KEY_PROXIED: &str = "CF_PROXIED";
pub const KEY_UPDATE_INTERVAL: &str = "CF_UPDATE_INTERVAL";
pub const KEY_LOG_LEVEL: &str = "CF_LOG_LEVEL";
pub const KEY_DRY_RUN: &str = "CF_DRY_RUN";
pub const KEY_HTTP_TIMEOUT: &str = "CF_HTTP_TIMEOUT";
pub const KEY_MAX_CONCURRENCY: &str = "CF_MAX_CONCURRENCY";
pub const KEY_IPV4_URL: &str = "CF_IPV4_URL";
pub const KEY_IPV6_URL: &str = "CF_IPV6_URL";

pub const DEFAULT_IPV4_URL: &str = "https://v4.ident.me";
pub const DEFAULT_IPV6_URL: &str = "https://v6.ident.me";

/// Largest accepted `CF_HTTP_TIMEOUT`
pub const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(3600);

/// Largest accepted `CF_UPDATE_INTERVAL`
pub const MAX_UPDATE_INTERVAL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Validated daemon configuration
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Provider API token
    /// ⚠️ NEVER log this value
    pub token: String,

    /// Record names to keep in sync, lower-cased and deduplicated, in configured order
    pub domains: Vec<String>,

    /// Reconcile A records
    pub ipv4_enabled: bool,

    /// Reconcile AAAA records
    pub ipv6_enabled: bool,

    /// Proxy flag written to every created or updated record
    pub proxied: bool,

    /// Time between the starts of two consecutive cycles
    pub update_interval: Duration,

    /// tracing max level
    pub log_level: String,

    /// Perform reads only, log the writes that would have happened
    pub dry_run: bool,

    /// Timeout applied to each outbound HTTP call
    pub http_timeout: Duration,

    /// Maximum number of (domain, family) pairs reconciled at once
    pub max_concurrency: usize,

    /// IPv4 address-echo endpoint
    pub ipv4_url: String,

    /// IPv6 address-echo endpoint
    pub ipv6_url: String,
}

// Custom Debug implementation that hides the API token
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<REDACTED>")
            .field("domains", &self.domains)
            .field("ipv4_enabled", &self.ipv4_enabled)
            .field("ipv6_enabled", &self.ipv6_enabled)
            .field("proxied", &self.proxied)
            .field("update_interval", &self.update_interval)
            .field("log_level", &self.log_level)
            .field("dry_run", &self.dry_run)
            .field("http_timeout", &self.http_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .field("ipv4_url", &self.ipv4_url)
            .field("ipv6_url", &self.ipv6_url)
            .finish()
    }
}

impl Config {
    /// Create a configuration with defaults for everything but the token and domains
    ///
    /// Domains are normalized the same way as `CF_DOMAINS`. Call
    /// [`Config::validate`] before use.
    pub fn new<I, S>(token: impl Into<String>, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            token: token.into(),
            domains: normalize_domains(domains),
            ipv4_enabled: true,
            ipv6_enabled: false,
            proxied: false,
            update_interval: Duration::from_secs(default_update_interval_secs()),
            log_level: "info".to_string(),
            dry_run: false,
            http_timeout: Duration::from_secs(default_http_timeout_secs()),
            max_concurrency: default_max_concurrency(),
            ipv4_url: DEFAULT_IPV4_URL.to_string(),
            ipv6_url: DEFAULT_IPV6_URL.to_string(),
        }
    }

    /// Enable or disable each address family
    pub fn with_families(mut self, ipv4: bool, ipv6: bool) -> Self {
        self.ipv4_enabled = ipv4;
        self.ipv6_enabled = ipv6;
        self
    }

    /// Set the proxy flag written to records
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// Set the scheduler period
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the per-cycle worker limit
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Blank values are treated as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = get(KEY_TOKEN).ok_or(ConfigError::MissingRequired(KEY_TOKEN))?;
        let domains_raw = get(KEY_DOMAINS).ok_or(ConfigError::MissingRequired(KEY_DOMAINS))?;

        let mut config = Self::new(token, domains_raw.split(','));

        if let Some(v) = get(KEY_IPV4_ENABLED) {
            config.ipv4_enabled = parse_bool(KEY_IPV4_ENABLED, &v)?;
        }
        if let Some(v) = get(KEY_IPV6_ENABLED) {
            config.ipv6_enabled = parse_bool(KEY_IPV6_ENABLED, &v)?;
        }
        if let Some(v) = get(KEY_PROXIED) {
            config.proxied = parse_bool(KEY_PROXIED, &v)?;
        }
        if let Some(v) = get(KEY_UPDATE_INTERVAL) {
            config.update_interval = Duration::from_secs(parse_positive(KEY_UPDATE_INTERVAL, &v)?);
        }
        if let Some(v) = get(KEY_LOG_LEVEL) {
            config.log_level = v.to_lowercase();
        }
        if let Some(v) = get(KEY_DRY_RUN) {
            config.dry_run = parse_bool(KEY_DRY_RUN, &v)?;
        }
        if let Some(v) = get(KEY_HTTP_TIMEOUT) {
            config.http_timeout = Duration::from_secs(parse_positive(KEY_HTTP_TIMEOUT, &v)?);
        }
        if let Some(v) = get(KEY_MAX_CONCURRENCY) {
            config.max_concurrency = parse_positive(KEY_MAX_CONCURRENCY, &v)? as usize;
        }
        if let Some(v) = get(KEY_IPV4_URL) {
            config.ipv4_url = v;
        }
        if let Some(v) = get(KEY_IPV6_URL) {
            config.ipv6_url = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingRequired(KEY_TOKEN));
        }

        if self.domains.is_empty() {
            return Err(ConfigError::MissingRequired(KEY_DOMAINS));
        }

        for domain in &self.domains {
            validate_domain_name(domain)
                .map_err(|reason| ConfigError::invalid(KEY_DOMAINS, domain.as_str(), reason))?;
        }

        if !self.ipv4_enabled && !self.ipv6_enabled {
            return Err(ConfigError::NoFamilyEnabled);
        }

        if self.update_interval.is_zero() {
            return Err(ConfigError::invalid(
                KEY_UPDATE_INTERVAL,
                "0",
                "must be a positive number of seconds",
            ));
        }

        if self.http_timeout.is_zero() {
            return Err(ConfigError::invalid(
                KEY_HTTP_TIMEOUT,
                "0",
                "must be a positive number of seconds",
            ));
        }

        if self.update_interval > MAX_UPDATE_INTERVAL {
            return Err(ConfigError::invalid(
                KEY_UPDATE_INTERVAL,
                self.update_interval.as_secs().to_string(),
                format!("must be at most {} seconds", MAX_UPDATE_INTERVAL.as_secs()),
            ));
        }

        if self.http_timeout > MAX_HTTP_TIMEOUT {
            return Err(ConfigError::invalid(
                KEY_HTTP_TIMEOUT,
                self.http_timeout.as_secs().to_string(),
                format!("must be at most {} seconds", MAX_HTTP_TIMEOUT.as_secs()),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid(
                KEY_MAX_CONCURRENCY,
                "0",
                "must be at least 1",
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::invalid(
                    KEY_LOG_LEVEL,
                    other,
                    "expected one of trace, debug, info, warn, error",
                ));
            }
        }

        for (key, url) in [(KEY_IPV4_URL, &self.ipv4_url), (KEY_IPV6_URL, &self.ipv6_url)] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ConfigError::invalid(key, url.as_str(), "must be an http(s) URL"));
            }
        }

        Ok(())
    }

    /// Enabled address families, IPv4 first
    pub fn families(&self) -> impl Iterator<Item = AddressFamily> + '_ {
        AddressFamily::ALL
            .into_iter()
            .filter(|family| self.is_enabled(*family))
    }

    /// Whether `family` is reconciled
    pub fn is_enabled(&self, family: AddressFamily) -> bool {
        match family {
            AddressFamily::V4 => self.ipv4_enabled,
            AddressFamily::V6 => self.ipv6_enabled,
        }
    }

    /// Address-echo endpoint for `family`
    pub fn echo_url(&self, family: AddressFamily) -> &str {
        match family {
            AddressFamily::V4 => &self.ipv4_url,
            AddressFamily::V6 => &self.ipv6_url,
        }
    }
}

/// Trim, lower-case, strip the root dot, drop empties and deduplicate
/// preserving first-seen order
fn normalize_domains<I, S>(domains: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for raw in domains {
        let domain = raw.as_ref().trim().trim_end_matches('.').to_lowercase();
        if !domain.is_empty() && !out.contains(&domain) {
            out.push(domain);
        }
    }
    out
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(key, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(_) => Err(ConfigError::invalid(key, value, "expected a positive integer")),
    }
}

/// Basic RFC 1035 checks; not comprehensive but catches common mistakes
fn validate_domain_name(domain: &str) -> Result<(), String> {
    if domain.len() > 253 {
        return Err(format!("too long: {} chars (max 253)", domain.len()));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err("must contain at least two labels".to_string());
    }

    for (i, label) in labels.iter().enumerate() {
        if i == 0 && *label == "*" {
            continue;
        }

        if label.is_empty() {
            return Err("empty label".to_string());
        }

        if label.len() > 63 {
            return Err(format!("label '{}' longer than 63 chars", label));
        }

        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("label '{}' contains invalid characters", label));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{}' starts or ends with a hyphen", label));
        }
    }

    Ok(())
}

fn default_update_interval_secs() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_max_concurrency() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn oversized_durations_are_rejected() {
        for (key, value) in [
            (KEY_HTTP_TIMEOUT, "18446744073709551615"),
            (KEY_HTTP_TIMEOUT, "3601"),
            (KEY_UPDATE_INTERVAL, "18446744073709551615"),
        ] {
            let err = load(&[("CF_TOKEN", "secret"), ("CF_DOMAINS", "example.com"), (key, value)])
                .unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { key: k, .. } if *k == key),
                "{} = {}: {:?}",
                key,
                value,
                err
            );
        }

        let config = load(&[("CF_TOKEN", "secret"), ("CF_DOMAINS", "example.com"), (KEY_HTTP_TIMEOUT, "3600")])
            .unwrap();
        assert_eq!(config.http_timeout, MAX_HTTP_TIMEOUT);
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("CF_TOKEN", "secret"), ("CF_DOMAINS", "example.com")]).unwrap();

        assert_eq!(config.domains, vec!["example.com"]);
        assert!(config.ipv4_enabled);
        assert!(!config.ipv6_enabled);
        assert!(!config.proxied);
        assert!(!config.dry_run);
        assert_eq!(config.update_interval, Duration::from_secs(300));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.ipv4_url, DEFAULT_IPV4_URL);
        assert_eq!(config.ipv6_url, DEFAULT_IPV6_URL);
        assert_eq!(config.families().collect::<Vec<_>>(), vec![AddressFamily::V4]);
    }

    #[test]
    fn domains_are_normalized_and_deduplicated_in_order() {
        let config = load(&[
            ("CF_TOKEN", "secret"),
            ("CF_DOMAINS", " WWW.Example.com, ,example.com,www.example.com.,vpn.example.org"),
        ])
        .unwrap();

        assert_eq!(
            config.domains,
            vec!["www.example.com", "example.com", "vpn.example.org"]
        );
    }

    #[test]
    fn missing_token_is_reported() {
        let err = load(&[("CF_DOMAINS", "example.com")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingRequired("CF_TOKEN"));

        let err = load(&[("CF_TOKEN", "   "), ("CF_DOMAINS", "example.com")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingRequired("CF_TOKEN"));
    }

    #[test]
    fn empty_domain_list_is_missing() {
        let err = load(&[("CF_TOKEN", "secret"), ("CF_DOMAINS", " , ,")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingRequired("CF_DOMAINS"));
    }

    #[test]
    fn no_family_enabled_fails_fast() {
        let err = load(&[
            ("CF_TOKEN", "secret"),
            ("CF_DOMAINS", "example.com"),
            ("CF_IPV4_ENABLED", "false"),
            ("CF_IPV6_ENABLED", "false"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::NoFamilyEnabled);
    }

    #[test]
    fn booleans_are_strict() {
        let config = load(&[
            ("CF_TOKEN", "secret"),
            ("CF_DOMAINS", "example.com"),
            ("CF_IPV6_ENABLED", "TRUE"),
            ("CF_PROXIED", "yes"),
            ("CF_DRY_RUN", "1"),
        ])
        .unwrap();
        assert!(config.ipv6_enabled);
        assert!(config.proxied);
        assert!(config.dry_run);

        let err = load(&[
            ("CF_TOKEN", "secret"),
            ("CF_DOMAINS", "example.com"),
            ("CF_PROXIED", "ture"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CF_PROXIED", .. }));
    }

    #[test]
    fn interval_must_be_positive_integer() {
        for bad in ["0", "-5", "five", "1.5"] {
            let err = load(&[
                ("CF_TOKEN", "secret"),
                ("CF_DOMAINS", "example.com"),
                ("CF_UPDATE_INTERVAL", bad),
            ])
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: "CF_UPDATE_INTERVAL", .. }),
                "{bad} accepted"
            );
        }

        let config = load(&[
            ("CF_TOKEN", "secret"),
            ("CF_DOMAINS", "example.com"),
            ("CF_UPDATE_INTERVAL", "60"),
        ])
        .unwrap();
        assert_eq!(config.update_interval, Duration::from_secs(60));
    }

    #[test]
    fn invalid_domains_are_rejected() {
        for bad in ["localhost", "-bad.example.com", "exa mple.com", "a..example.com"] {
            let err = load(&[("CF_TOKEN", "secret"), ("CF_DOMAINS", bad)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: "CF_DOMAINS", .. }),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn wildcard_domain_is_allowed() {
        let config = load(&[("CF_TOKEN", "secret"), ("CF_DOMAINS", "*.example.com")]).unwrap();
        assert_eq!(config.domains, vec!["*.example.com"]);
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = load(&[
            ("CF_TOKEN", "secret"),
            ("CF_DOMAINS", "example.com"),
            ("CF_LOG_LEVEL", "loud"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CF_LOG_LEVEL", .. }));
    }

    #[test]
    fn echo_urls_must_be_http() {
        let err = load(&[
            ("CF_TOKEN", "secret"),
            ("CF_DOMAINS", "example.com"),
            ("CF_IPV4_URL", "ftp://v4.example.net"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CF_IPV4_URL", .. }));
    }

    #[test]
    fn token_not_exposed_in_debug() {
        let config = Config::new("secret_token_12345", ["example.com"]);
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
