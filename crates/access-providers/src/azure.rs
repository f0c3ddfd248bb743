//! Azure DNS backend
//!
//! Authenticates as a service principal (OAuth2 client credentials against
//! Microsoft Entra ID), then talks to Azure Resource Manager:
//!
//! - Read:  `GET  .../dnsZones/{zone}/{A|AAAA}/{host}?api-version=2018-05-01`
//! - Write: `PUT  .../dnsZones/{zone}/{A|AAAA}/{host}?api-version=2018-05-01`
//!
//! The PUT replaces the whole record set, so one call is one upsert.

use access_core::record::{RecordType, RecordUpdate};
use access_core::traits::{
    Capabilities, ConfigField, DnsProvider, DnsProviderFactory, FieldKind, ProviderInfo,
    UpdateResult,
};
use access_core::{ProviderCredentials, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::net::IpAddr;

use crate::http;
use crate::oauth::{self, TokenCache};

pub const NAME: &str = "azure";

const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const MANAGEMENT_BASE: &str = "https://management.azure.com";
const API_VERSION: &str = "2018-05-01";
const SCOPE: &str = "https://management.azure.com/.default";

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

/// Azure DNS backend
pub struct AzureProvider {
    /// Application (client) id
    client_id: String,
    /// ⚠️ NEVER log this value
    client_secret: String,
    tenant_id: String,
    subscription_id: String,
    resource_group: String,
    ttl: u32,
    token: TokenCache,
    login_base: String,
    management_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("token", &self.token)
            .finish()
    }
}

impl AzureProvider {
    pub fn new(credentials: &ProviderCredentials) -> Result<Self> {
        Ok(Self {
            client_id: credentials.require(NAME, "key")?.to_string(),
            client_secret: credentials.require(NAME, "secret")?.to_string(),
            tenant_id: credentials.require(NAME, "tenant_id")?.to_string(),
            subscription_id: credentials.require(NAME, "subscription_id")?.to_string(),
            resource_group: credentials.require(NAME, "resource_group")?.to_string(),
            ttl: http::record_ttl(NAME, credentials)?,
            token: TokenCache::new(),
            login_base: LOGIN_BASE.to_string(),
            management_base: MANAGEMENT_BASE.to_string(),
            client: http::client(NAME)?,
        })
    }

    /// Point the backend at other login and management roots
    pub fn with_endpoints(mut self, login: impl Into<String>, management: impl Into<String>) -> Self {
        self.login_base = http::base_url(login);
        self.management_base = http::base_url(management);
        self
    }

    async fn access_token(&self) -> Result<String> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        self.token
            .get(|| async {
                tracing::debug!("Requesting Azure access token");
                oauth::request_token(
                    &self.client,
                    NAME,
                    &url,
                    &[
                        ("grant_type", "client_credentials"),
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.as_str()),
                        ("scope", SCOPE),
                    ],
                )
                .await
            })
            .await
    }

    fn zones_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnsZones",
            self.management_base, self.subscription_id, self.resource_group
        )
    }

    fn record_set_url(&self, record: &RecordUpdate) -> String {
        format!(
            "{}/{}/{}/{}?api-version={}",
            self.zones_url(),
            record.domain(),
            record.record_type(),
            record.host(),
            API_VERSION
        )
    }

    async fn current(&self, token: &str, record: &RecordUpdate) -> Result<Option<IpAddr>> {
        let response = self
            .client
            .get(self.record_set_url(record))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = http::json(NAME, response).await?;
        Ok(record_set_address(&body, record.record_type()))
    }
}

fn record_set_address(body: &Value, record_type: RecordType) -> Option<IpAddr> {
    let (list, field) = match record_type {
        RecordType::A => ("ARecords", "ipv4Address"),
        RecordType::Aaaa => ("AAAARecords", "ipv6Address"),
    };
    body["properties"][list][0][field]
        .as_str()
        .and_then(|ip| ip.parse().ok())
}

fn record_set_body(record_type: RecordType, address: IpAddr, ttl: u32) -> Value {
    match record_type {
        RecordType::A => json!({
            "properties": { "TTL": ttl, "ARecords": [{ "ipv4Address": address.to_string() }] }
        }),
        RecordType::Aaaa => json!({
            "properties": { "TTL": ttl, "AAAARecords": [{ "ipv6Address": address.to_string() }] }
        }),
    }
}

#[async_trait]
impl DnsProvider for AzureProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        let new_ip = record.address();
        let token = self.access_token().await?;

        let previous = self.current(&token, record).await?;
        if previous == Some(new_ip) {
            return Ok(UpdateResult::Unchanged { current_ip: new_ip });
        }

        tracing::info!("Updating Azure record set {} -> {}", record.fqdn(), new_ip);
        let response = self
            .client
            .put(self.record_set_url(record))
            .bearer_auth(&token)
            .json(&record_set_body(record.record_type(), new_ip, self.ttl))
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
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}?api-version={}", self.zones_url(), API_VERSION))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;
        http::check(NAME, response).await.map(|_| ())
    }
}

/// Factory for Azure backends
pub struct AzureFactory;

impl DnsProviderFactory for AzureFactory {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    fn required_config(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("key", "Service principal application (client) ID", FieldKind::Text),
            ConfigField::required("secret", "Service principal client secret", FieldKind::Secret),
            ConfigField::required("tenant_id", "Directory (tenant) ID", FieldKind::Text),
            ConfigField::required("subscription_id", "Subscription ID", FieldKind::Text),
            ConfigField::required("resource_group", "Resource group holding the DNS zone", FieldKind::Text),
            ConfigField::optional("ttl", "Record TTL in seconds", FieldKind::Text, Some("300")),
        ]
    }

    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
        self.validate(credentials)?;
        Ok(Box::new(AzureProvider::new(credentials)?))
    }
}
