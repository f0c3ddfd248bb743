// # DNS Provider Trait
//
// Defines the contract every DNS vendor backend implements.
//
// ## Implementations
//
// `access-providers` ships godaddy, cloudflare, digitalocean, azure, route53,
// gcloud and a no-op `test` backend.
//
// ## Usage
//
// ```rust,ignore
// use access_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     // Validates, infers A/AAAA from the literal, then upserts
//     provider.update("example.com", "peer0", "203.0.113.7", None).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::ProviderCredentials;
use crate::error::{Error, Result};
use crate::record::{RecordType, RecordUpdate};

/// Result of a DNS update operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// Record existed with a different address and was replaced
    Updated {
        /// The previous IP address
        previous_ip: Option<IpAddr>,
        /// The new IP address
        new_ip: IpAddr,
    },
    /// Record already had the requested address (no-op)
    Unchanged {
        /// The current IP address
        current_ip: IpAddr,
    },
    /// Record was created (didn't exist before)
    Created {
        /// The created IP address
        new_ip: IpAddr,
    },
    /// Dry run: the write was computed but never sent
    Simulated {
        /// Address the record held before, if any
        previous_ip: Option<IpAddr>,
        /// Address that would have been written
        new_ip: IpAddr,
    },
}

impl UpdateResult {
    /// Whether the backend issued a write
    pub fn mutated(&self) -> bool {
        matches!(
            self,
            UpdateResult::Updated { .. } | UpdateResult::Created { .. }
        )
    }

    /// Whether the record is known to hold `address()` after the call
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, UpdateResult::Simulated { .. })
    }

    /// Address the record holds after the call, or would hold for a dry run
    pub fn address(&self) -> IpAddr {
        match self {
            UpdateResult::Updated { new_ip, .. }
            | UpdateResult::Created { new_ip }
            | UpdateResult::Simulated { new_ip, .. } => *new_ip,
            UpdateResult::Unchanged { current_ip } => *current_ip,
        }
    }
}

/// Optional features a backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Can publish A records
    pub ipv4: bool,
    /// Can publish AAAA records
    pub ipv6: bool,
    /// Implements [`DnsProvider::test`]
    pub connection_test: bool,
    /// Honours dry-run mode
    pub dry_run: bool,
}

/// Static metadata describing a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Registry name, e.g. "cloudflare"
    pub name: &'static str,
    /// Backend implementation version
    pub version: &'static str,
    /// Supported features
    pub capabilities: Capabilities,
}

/// How a credential field should be collected and displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain text, safe to echo
    Text,
    /// Secret, never echoed or logged
    Secret,
}

/// One entry of a backend's credential schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigField {
    /// Field name as stored in [`ProviderCredentials`]
    pub name: &'static str,
    /// Human-readable prompt
    pub description: &'static str,
    /// Field kind
    pub kind: FieldKind,
    /// Whether the backend cannot operate without it
    pub required: bool,
    /// Value used when the field is absent
    pub default: Option<&'static str>,
}

impl ConfigField {
    /// A required field without default
    pub const fn required(name: &'static str, description: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
            default: None,
        }
    }

    /// An optional field, possibly with a default
    pub const fn optional(
        name: &'static str,
        description: &'static str,
        kind: FieldKind,
        default: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
            default,
        }
    }
}

/// Trait for DNS provider backends
///
/// # Contract
///
/// - [`DnsProvider::apply`] performs at most one upsert of the single record
///   `(host, domain, type)`. If the record already holds the address, it
///   returns [`UpdateResult::Unchanged`] without writing.
/// - Backends never retry. A failed call surfaces immediately; the next
///   scheduled cycle is the retry.
/// - Backends classify failures as `AuthenticationFailed`,
///   `TransientNetwork` or `RejectedByProvider`.
/// - Credentials live only in memory. Tokens obtained through key exchange
///   are never written to disk and never appear in logs or `Debug` output.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Static metadata; no I/O
    fn info(&self) -> ProviderInfo;

    /// Upsert a validated record
    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult>;

    /// Validate raw input, then upsert
    ///
    /// Malformed input yields [`Error::InvalidInput`] and no network call.
    async fn update(
        &self,
        domain: &str,
        host: &str,
        address: &str,
        record_type: Option<RecordType>,
    ) -> Result<UpdateResult> {
        let record = RecordUpdate::new(domain, host, address, record_type)?;
        self.apply(&record).await
    }

    /// Verify the stored credentials authenticate, without mutating records
    async fn test(&self) -> Result<()> {
        Err(Error::rejected(
            self.info().name,
            "connection test not supported by this backend",
        ))
    }
}

/// Constructs a backend from credentials and describes its schema
///
/// The registry holds one factory per provider name. Setup uses
/// [`DnsProviderFactory::required_config`] to drive prompts before any
/// backend exists.
pub trait DnsProviderFactory: Send + Sync {
    /// Static metadata of the backends this factory creates
    fn info(&self) -> ProviderInfo;

    /// Ordered credential schema
    fn required_config(&self) -> Vec<ConfigField>;

    /// Local check that every mandatory field is present
    fn validate(&self, credentials: &ProviderCredentials) -> Result<()> {
        for field in self.required_config() {
            if field.required && field.default.is_none() && credentials.get(field.name).is_none() {
                return Err(Error::missing_credentials(self.info().name, field.name));
            }
        }
        Ok(())
    }

    /// Create a backend instance; implementations call `validate` first
    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>>;
}
