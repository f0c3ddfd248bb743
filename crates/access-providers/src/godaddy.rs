//! GoDaddy DNS backend
//!
//! API reference: https://developer.godaddy.com/doc/endpoint/domains
//!
//! - Read:  `GET /v1/domains/{domain}/records/{type}/{host}`
//! - Write: `PUT /v1/domains/{domain}/records/{type}/{host}`
//!
//! The PUT replaces every record of that name and type, which is exactly the
//! single-record upsert the sync path needs.

use access_core::record::RecordUpdate;
use access_core::traits::{
    Capabilities, ConfigField, DnsProvider, DnsProviderFactory, FieldKind, ProviderInfo,
    UpdateResult,
};
use access_core::{ProviderCredentials, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::net::IpAddr;

use crate::http;

pub const NAME: &str = "godaddy";

const API_BASE: &str = "https://api.godaddy.com";

/// Lowest TTL GoDaddy accepts
const MIN_TTL: u32 = 600;

const INFO: ProviderInfo = ProviderInfo {
    name: NAME,
    version: env!("CARGO_PKG_VERSION"),
    capabilities: Capabilities {
        ipv4: true,
        ipv6: true,
        connection_test: true,
        dry_run: false,
    },
};

#[derive(Debug, Deserialize)]
struct Record {
    data: String,
}

/// GoDaddy backend
pub struct GoDaddyProvider {
    /// ⚠️ NEVER log this value
    key: String,
    /// ⚠️ NEVER log this value
    secret: String,
    ttl: u32,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GoDaddyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoDaddyProvider")
            .field("key", &"<REDACTED>")
            .field("secret", &"<REDACTED>")
            .field("ttl", &self.ttl)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GoDaddyProvider {
    pub fn new(credentials: &ProviderCredentials) -> Result<Self> {
        Ok(Self {
            key: credentials.require(NAME, "key")?.to_string(),
            secret: credentials.require(NAME, "secret")?.to_string(),
            ttl: http::record_ttl(NAME, credentials)?.max(MIN_TTL),
            base_url: API_BASE.to_string(),
            client: http::client(NAME)?,
        })
    }

    /// Point the backend at another API root
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = http::base_url(url);
        self
    }

    fn authorization(&self) -> String {
        format!("sso-key {}:{}", self.key, self.secret)
    }

    fn record_url(&self, record: &RecordUpdate) -> String {
        format!(
            "{}/v1/domains/{}/records/{}/{}",
            self.base_url,
            record.domain(),
            record.record_type(),
            record.host()
        )
    }

    async fn current(&self, record: &RecordUpdate) -> Result<Option<IpAddr>> {
        let response = self
            .client
            .get(self.record_url(record))
            .header("Authorization", self.authorization())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;

        let records: Vec<Record> = http::json(NAME, response).await?;
        Ok(records.first().and_then(|r| r.data.parse().ok()))
    }
}

#[async_trait]
impl DnsProvider for GoDaddyProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        let new_ip = record.address();
        let previous = self.current(record).await?;
        if previous == Some(new_ip) {
            tracing::debug!("{} already points to {}", record.fqdn(), new_ip);
            return Ok(UpdateResult::Unchanged { current_ip: new_ip });
        }

        tracing::info!(
            "Updating GoDaddy record {} ({}) -> {}",
            record.fqdn(),
            record.record_type(),
            new_ip
        );
        let response = self
            .client
            .put(self.record_url(record))
            .header("Authorization", self.authorization())
            .json(&json!([{ "data": new_ip.to_string(), "ttl": self.ttl }]))
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;
        http::check(NAME, response).await?;

        Ok(match previous {
            Some(previous_ip) => UpdateResult::Updated {
                previous_ip: Some(previous_ip),
                new_ip,
            },
            None => UpdateResult::Created { new_ip },
        })
    }

    async fn test(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1/domains?limit=1", self.base_url))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;
        http::check(NAME, response).await.map(|_| ())
    }
}

/// Factory for GoDaddy backends
pub struct GoDaddyFactory;

impl DnsProviderFactory for GoDaddyFactory {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    fn required_config(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("key", "GoDaddy API key", FieldKind::Text),
            ConfigField::required("secret", "GoDaddy API secret", FieldKind::Secret),
            ConfigField::optional("ttl", "Record TTL in seconds", FieldKind::Text, Some("600")),
        ]
    }

    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
        self.validate(credentials)?;
        Ok(Box::new(GoDaddyProvider::new(credentials)?))
    }
}
