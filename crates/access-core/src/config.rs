//! Configuration types for access
//!
//! [`DiscoveryConfig`] is the durable setup written by `access setup` and
//! read on every discover/monitor/daemon/sync run. Credentials are threaded
//! explicitly into backends as [`ProviderCredentials`]; nothing is held in
//! process-wide state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::state::fs as state_fs;
use crate::traits::IpVersion;
use crate::validation;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "ACCESS_CONFIG_DIR";

/// Prefix for extra provider fields supplied through the environment,
/// e.g. `ACCESS_DNS_EXTRA_TENANT_ID` sets `tenant_id`
pub const EXTRA_ENV_PREFIX: &str = "ACCESS_DNS_EXTRA_";

/// Credentials handed to a backend factory
///
/// `key` and `secret` are the two fields every vendor uses in some form;
/// vendor-specific fields (zone ids, tenant, project...) live in `extra`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// API key, token, client id or access key id
    pub key: String,
    /// API secret, client secret or secret access key
    pub secret: String,
    /// Additional vendor fields
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

// Secrets must never reach logs
impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("key", &redact(&self.key))
            .field("secret", &redact(&self.secret))
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<EMPTY>" } else { "<REDACTED>" }
}

impl ProviderCredentials {
    /// Credentials with key and secret only
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Add an extra field
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Non-empty value of a field by schema name
    pub fn get(&self, field: &str) -> Option<&str> {
        let value = match field {
            "key" => Some(self.key.as_str()),
            "secret" => Some(self.secret.as_str()),
            other => self.extra.get(other).map(String::as_str),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Value of a field, or `default` when absent
    pub fn get_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get(field).unwrap_or(default)
    }

    /// Value of a mandatory field
    pub fn require(&self, provider: &str, field: &str) -> Result<&str> {
        self.get(field)
            .ok_or_else(|| Error::missing_credentials(provider, field))
    }

    /// Set a field by schema name
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        match field {
            "key" => self.key = value,
            "secret" => self.secret = value,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }
}

/// Durable discovery/sync configuration
///
/// On disk this is the JSON object written by `access setup`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Shared zone, e.g. `swarm.example.com`
    pub domain: String,
    /// Slot host prefix, e.g. `peer`
    pub host_prefix: String,
    /// Registry name of the backend
    pub dns_provider: String,
    /// Provider key
    #[serde(default)]
    pub dns_key: String,
    /// Provider secret
    #[serde(default)]
    pub dns_secret: String,
    /// Additional provider fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dns_extra: BTreeMap<String, String>,
    /// Whether the daemon also runs the sync path each cycle
    #[serde(default = "default_auto_sync")]
    pub enable_auto_sync: bool,
    /// Last time setup wrote this file
    pub last_updated: DateTime<Utc>,
    /// Discovery tuning
    #[serde(default, skip_serializing_if = "DiscoveryTuning::is_default")]
    pub tuning: DiscoveryTuning,
}

fn default_auto_sync() -> bool {
    true
}

impl std::fmt::Debug for DiscoveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryConfig")
            .field("domain", &self.domain)
            .field("host_prefix", &self.host_prefix)
            .field("dns_provider", &self.dns_provider)
            .field("dns_key", &redact(&self.dns_key))
            .field("dns_secret", &redact(&self.dns_secret))
            .field("dns_extra", &self.dns_extra.keys().collect::<Vec<_>>())
            .field("enable_auto_sync", &self.enable_auto_sync)
            .field("last_updated", &self.last_updated)
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl DiscoveryConfig {
    /// Create a configuration stamped now
    pub fn new(
        domain: impl Into<String>,
        host_prefix: impl Into<String>,
        dns_provider: impl Into<String>,
        credentials: ProviderCredentials,
    ) -> Self {
        Self {
            domain: domain.into(),
            host_prefix: host_prefix.into(),
            dns_provider: dns_provider.into(),
            dns_key: credentials.key,
            dns_secret: credentials.secret,
            dns_extra: credentials.extra,
            enable_auto_sync: default_auto_sync(),
            last_updated: Utc::now(),
            tuning: DiscoveryTuning::default(),
        }
    }

    /// Build from `ACCESS_*` environment variables (non-interactive setup)
    pub fn from_env() -> Result<Self> {
        let mut vars: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in std::env::vars() {
            if name.starts_with("ACCESS_") {
                vars.insert(name, value);
            }
        }
        Self::from_vars(|name| vars.get(name).cloned())
    }

    /// Build from an arbitrary variable lookup
    ///
    /// Recognised names: `ACCESS_DISCOVERY_DOMAIN`, `ACCESS_DISCOVERY_PREFIX`,
    /// `ACCESS_DNS_PROVIDER`, `ACCESS_DNS_KEY`, `ACCESS_DNS_SECRET`,
    /// `ACCESS_CLOUDFLARE_EMAIL`, `ACCESS_CLOUDFLARE_ZONE_ID`,
    /// `ACCESS_ENABLE_AUTO_SYNC` and any `ACCESS_DNS_EXTRA_<FIELD>`.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::config_missing(format!("{} is not set", name)))
        };

        let domain = required("ACCESS_DISCOVERY_DOMAIN")?;
        let host_prefix = lookup("ACCESS_DISCOVERY_PREFIX")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "peer".to_string());
        let provider = required("ACCESS_DNS_PROVIDER")?.to_ascii_lowercase();

        let mut credentials = ProviderCredentials::new(
            lookup("ACCESS_DNS_KEY").unwrap_or_default(),
            lookup("ACCESS_DNS_SECRET").unwrap_or_default(),
        );
        if let Some(email) = lookup("ACCESS_CLOUDFLARE_EMAIL") {
            credentials.set("email", email);
        }
        if let Some(zone) = lookup("ACCESS_CLOUDFLARE_ZONE_ID") {
            credentials.set("zone_id", zone);
        }
        for field in KNOWN_EXTRA_FIELDS {
            let name = format!("{}{}", EXTRA_ENV_PREFIX, field.to_ascii_uppercase());
            if let Some(value) = lookup(&name) {
                credentials.set(field, value);
            }
        }

        let mut config = Self::new(domain, host_prefix, provider, credentials);
        if let Some(flag) = lookup("ACCESS_ENABLE_AUTO_SYNC") {
            config.enable_auto_sync = parse_flag(&flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is complete and well-formed
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::config_missing("domain is not configured"));
        }
        if self.host_prefix.trim().is_empty() {
            return Err(Error::config_missing("host prefix is not configured"));
        }
        if self.dns_provider.trim().is_empty() {
            return Err(Error::config_missing("DNS provider is not configured"));
        }

        validation::validate_domain(&self.domain)
            .map_err(|e| Error::config(format!("domain: {}", e)))?;
        // A prefix is valid when the hostname it forms is
        validation::validate_host(&format!("{}0", self.host_prefix))
            .map_err(|e| Error::config(format!("host prefix: {}", e)))?;
        // "node1" + slot 0 would collide with "node" + slot 10
        if self.host_prefix.ends_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::config(format!(
                "host prefix '{}' must not end in a digit",
                self.host_prefix
            )));
        }

        self.tuning.validate()
    }

    /// Credentials to hand to the provider factory
    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            key: self.dns_key.clone(),
            secret: self.dns_secret.clone(),
            extra: self.dns_extra.clone(),
        }
    }

    /// Host token for a slot
    pub fn hostname(&self, slot: u32) -> String {
        format!("{}{}", self.host_prefix, slot)
    }

    /// FQDN for a slot
    pub fn slot_fqdn(&self, slot: u32) -> String {
        format!("{}.{}", self.hostname(slot), self.domain)
    }

    /// Load from a JSON file; `Ok(None)` if it does not exist
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let Some(content) = state_fs::read_optional(path).await? else {
            return Ok(None);
        };
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        Ok(Some(config))
    }

    /// Load and validate, treating an absent file as missing configuration
    pub async fn load_required(path: &Path) -> Result<Self> {
        let config = Self::load(path).await?.ok_or_else(|| {
            Error::config_missing(format!(
                "{} not found; run `access setup` first",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as owner-only JSON, stamping `last_updated`
    pub async fn save(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(self)?;
        state_fs::write_private(path, json.as_bytes()).await
    }
}

/// Extra provider fields accepted through `ACCESS_DNS_EXTRA_*`
pub const KNOWN_EXTRA_FIELDS: &[&str] = &[
    "email",
    "zone_id",
    "hosted_zone_id",
    "region",
    "tenant_id",
    "subscription_id",
    "resource_group",
    "project",
    "managed_zone",
    "refresh_token",
    "ttl",
];

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!("invalid boolean '{}'", other))),
    }
}

/// Discovery tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryTuning {
    /// Highest slot count the scan will consider
    #[serde(default = "default_max_scan_depth")]
    pub max_scan_depth: u32,

    /// TCP ports tried by the reachability probe
    #[serde(default = "default_probe_ports")]
    pub probe_ports: Vec<u16>,

    /// Timeout for each DNS lookup and connect attempt (milliseconds)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Daemon sleep while not in slot 0 (seconds)
    #[serde(default = "default_fast_interval_secs")]
    pub fast_interval_secs: u64,

    /// Daemon sleep once in slot 0 (seconds)
    #[serde(default = "default_steady_interval_secs")]
    pub steady_interval_secs: u64,

    /// Address family to publish; `None` prefers IPv6
    #[serde(default)]
    pub address_family: Option<IpVersion>,
}

impl DiscoveryTuning {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Validate ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_scan_depth == 0 {
            return Err(Error::config("max_scan_depth must be > 0"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(Error::config("probe_timeout_ms must be > 0"));
        }
        if self.fast_interval_secs == 0 || self.steady_interval_secs == 0 {
            return Err(Error::config("daemon intervals must be > 0"));
        }
        Ok(())
    }
}

impl Default for DiscoveryTuning {
    fn default() -> Self {
        Self {
            max_scan_depth: default_max_scan_depth(),
            probe_ports: default_probe_ports(),
            probe_timeout_ms: default_probe_timeout_ms(),
            fast_interval_secs: default_fast_interval_secs(),
            steady_interval_secs: default_steady_interval_secs(),
            address_family: None,
        }
    }
}

fn default_max_scan_depth() -> u32 {
    1000
}

fn default_probe_ports() -> Vec<u16> {
    vec![22, 80, 443]
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_fast_interval_secs() -> u64 {
    60
}

fn default_steady_interval_secs() -> u64 {
    300
}

/// Sync path settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Minimum time between two successful publishes of a record (seconds)
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Address family to publish; `None` prefers IPv6
    #[serde(default)]
    pub family: Option<IpVersion>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            family: None,
        }
    }
}

fn default_debounce_secs() -> u64 {
    120
}

/// Locations of the files access keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    dir: PathBuf,
}

impl ConfigPaths {
    /// Paths rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$ACCESS_CONFIG_DIR`, else `$HOME/.config/access`
    pub fn from_env() -> Result<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::new(dir));
        }
        let home = std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::config_missing(format!("neither {} nor HOME is set", CONFIG_DIR_ENV))
            })?;
        Ok(Self::new(PathBuf::from(home).join(".config").join("access")))
    }

    /// Configuration directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Discovery configuration file
    pub fn discovery(&self) -> PathBuf {
        self.dir.join("discovery.json")
    }

    /// Peer registration file
    pub fn peer_state(&self) -> PathBuf {
        self.dir.join("peer.json")
    }

    /// Sync state file
    pub fn sync_state(&self) -> PathBuf {
        self.dir.join("sync-state.json")
    }

    /// Sync run-lock file
    pub fn sync_lock(&self) -> PathBuf {
        self.dir.join("sync.lock")
    }
}
