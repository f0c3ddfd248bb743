//! DigitalOcean DNS backend
//!
//! API reference: https://docs.digitalocean.com/reference/api/api-reference/#tag/Domain-Records
//!
//! - Read:   `GET /v2/domains/{domain}/records?type=A&name={fqdn}`
//! - Update: `PUT /v2/domains/{domain}/records/{id}`
//! - Create: `POST /v2/domains/{domain}/records`

use access_core::record::RecordUpdate;
use access_core::traits::{
    Capabilities, ConfigField, DnsProvider, DnsProviderFactory, FieldKind, ProviderInfo,
    UpdateResult,
};
use access_core::{Error, ProviderCredentials, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::http;

pub const NAME: &str = "digitalocean";

const API_BASE: &str = "https://api.digitalocean.com/v2";

/// Lowest TTL DigitalOcean accepts
const MIN_TTL: u32 = 30;

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
struct RecordList {
    #[serde(default)]
    domain_records: Vec<DomainRecord>,
}

#[derive(Debug, Deserialize)]
struct DomainRecord {
    id: u64,
    data: String,
}

/// DigitalOcean backend
pub struct DigitalOceanProvider {
    /// ⚠️ NEVER log this value
    token: String,
    ttl: u32,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for DigitalOceanProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanProvider")
            .field("token", &"<REDACTED>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl DigitalOceanProvider {
    pub fn new(credentials: &ProviderCredentials) -> Result<Self> {
        Ok(Self {
            token: credentials.require(NAME, "key")?.to_string(),
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

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))
    }

    async fn existing(&self, record: &RecordUpdate) -> Result<Option<DomainRecord>> {
        let fqdn = record.fqdn();
        let response = self
            .send(
                self.client
                    .get(format!("{}/domains/{}/records", self.base_url, record.domain()))
                    .query(&[("type", record.record_type().as_str()), ("name", fqdn.as_str())]),
            )
            .await?;
        let list: RecordList = http::json(NAME, response).await?;
        Ok(list.domain_records.into_iter().next())
    }
}

#[async_trait]
impl DnsProvider for DigitalOceanProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        let new_ip = record.address();
        let payload = json!({
            "type": record.record_type().as_str(),
            "name": record.host(),
            "data": new_ip.to_string(),
            "ttl": self.ttl,
        });

        match self.existing(record).await? {
            Some(existing) => {
                let previous_ip = existing.data.parse().ok();
                if previous_ip == Some(new_ip) {
                    return Ok(UpdateResult::Unchanged { current_ip: new_ip });
                }
                tracing::info!("Updating DigitalOcean record {} -> {}", record.fqdn(), new_ip);
                let url = format!(
                    "{}/domains/{}/records/{}",
                    self.base_url,
                    record.domain(),
                    existing.id
                );
                let response = self.send(self.client.put(url).json(&payload)).await?;
                http::check(NAME, response).await?;
                Ok(UpdateResult::Updated {
                    previous_ip,
                    new_ip,
                })
            }
            None => {
                tracing::info!("Creating DigitalOcean record {} -> {}", record.fqdn(), new_ip);
                let url = format!("{}/domains/{}/records", self.base_url, record.domain());
                let response = self.send(self.client.post(url).json(&payload)).await?;
                http::check(NAME, response).await?;
                Ok(UpdateResult::Created { new_ip })
            }
        }
    }

    async fn test(&self) -> Result<()> {
        let response = self
            .send(self.client.get(format!("{}/account", self.base_url)))
            .await?;
        let account: serde_json::Value = http::json(NAME, response).await?;
        match account["account"]["status"].as_str() {
            Some("active") | None => Ok(()),
            Some(status) => Err(Error::rejected(NAME, format!("account status is {}", status))),
        }
    }
}

/// Factory for DigitalOcean backends
pub struct DigitalOceanFactory;

impl DnsProviderFactory for DigitalOceanFactory {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    fn required_config(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("key", "DigitalOcean personal access token", FieldKind::Secret),
            ConfigField::optional("ttl", "Record TTL in seconds", FieldKind::Text, Some("300")),
        ]
    }

    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
        self.validate(credentials)?;
        Ok(Box::new(DigitalOceanProvider::new(credentials)?))
    }
}
