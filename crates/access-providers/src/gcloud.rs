//! Google Cloud DNS backend
//!
//! OAuth2 refresh-token grant against `oauth2.googleapis.com`, then the
//! Cloud DNS v1 resource record set API:
//!
//! - Read:   `GET   .../managedZones/{zone}/rrsets?name={fqdn}.&type={type}`
//! - Update: `PATCH .../managedZones/{zone}/rrsets/{fqdn}./{type}`
//! - Create: `POST  .../managedZones/{zone}/rrsets`

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
use crate::oauth::{self, TokenCache};

pub const NAME: &str = "gcloud";

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://dns.googleapis.com/dns/v1";

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
struct RrsetList {
    #[serde(default)]
    rrsets: Vec<Rrset>,
}

#[derive(Debug, Deserialize)]
struct Rrset {
    name: String,
    #[serde(rename = "type")]
    rtype: String,
    #[serde(default)]
    rrdatas: Vec<String>,
}

/// Google Cloud DNS backend
pub struct GcloudProvider {
    client_id: String,
    /// ⚠️ NEVER log this value
    client_secret: String,
    /// ⚠️ NEVER log this value
    refresh_token: String,
    project: String,
    managed_zone: String,
    ttl: u32,
    token: TokenCache,
    token_url: String,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GcloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcloudProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("refresh_token", &"<REDACTED>")
            .field("project", &self.project)
            .field("managed_zone", &self.managed_zone)
            .finish()
    }
}

impl GcloudProvider {
    pub fn new(credentials: &ProviderCredentials) -> Result<Self> {
        Ok(Self {
            client_id: credentials.require(NAME, "key")?.to_string(),
            client_secret: credentials.require(NAME, "secret")?.to_string(),
            refresh_token: credentials.require(NAME, "refresh_token")?.to_string(),
            project: credentials.require(NAME, "project")?.to_string(),
            managed_zone: credentials.require(NAME, "managed_zone")?.to_string(),
            ttl: http::record_ttl(NAME, credentials)?,
            token: TokenCache::new(),
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
            client: http::client(NAME)?,
        })
    }

    /// Point the backend at another token endpoint and API root
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = http::base_url(api_base);
        self
    }

    async fn access_token(&self) -> Result<String> {
        self.token
            .get(|| async {
                tracing::debug!("Refreshing Google Cloud access token");
                oauth::request_token(
                    &self.client,
                    NAME,
                    &self.token_url,
                    &[
                        ("grant_type", "refresh_token"),
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.as_str()),
                        ("refresh_token", self.refresh_token.as_str()),
                    ],
                )
                .await
            })
            .await
    }

    fn zone_url(&self) -> String {
        format!(
            "{}/projects/{}/managedZones/{}",
            self.api_base, self.project, self.managed_zone
        )
    }

    async fn current(&self, token: &str, name: &str, rtype: &str) -> Result<Option<IpAddr>> {
        let response = self
            .client
            .get(format!("{}/rrsets", self.zone_url()))
            .query(&[("name", name), ("type", rtype)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;
        let list: RrsetList = http::json(NAME, response).await?;

        Ok(list
            .rrsets
            .iter()
            .find(|set| set.name.eq_ignore_ascii_case(name) && set.rtype == rtype)
            .and_then(|set| set.rrdatas.first())
            .and_then(|data| data.parse().ok()))
    }
}

#[async_trait]
impl DnsProvider for GcloudProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        let new_ip = record.address();
        let name = format!("{}.", record.fqdn());
        let rtype = record.record_type().as_str();
        let token = self.access_token().await?;

        let previous = self.current(&token, &name, rtype).await?;
        if previous == Some(new_ip) {
            return Ok(UpdateResult::Unchanged { current_ip: new_ip });
        }

        let body = json!({
            "name": name,
            "type": rtype,
            "ttl": self.ttl,
            "rrdatas": [new_ip.to_string()],
        });
        let request = match previous {
            Some(_) => self
                .client
                .patch(format!("{}/rrsets/{}/{}", self.zone_url(), name, rtype)),
            None => self.client.post(format!("{}/rrsets", self.zone_url())),
        };

        tracing::info!("Publishing Cloud DNS record {} -> {}", record.fqdn(), new_ip);
        let response = request
            .bearer_auth(&token)
            .json(&body)
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
            .get(self.zone_url())
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;
        http::check(NAME, response).await.map(|_| ())
    }
}

/// Factory for Google Cloud DNS backends
pub struct GcloudFactory;

impl DnsProviderFactory for GcloudFactory {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    fn required_config(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("key", "OAuth client ID", FieldKind::Text),
            ConfigField::required("secret", "OAuth client secret", FieldKind::Secret),
            ConfigField::required("refresh_token", "OAuth refresh token", FieldKind::Secret),
            ConfigField::required("project", "Google Cloud project ID", FieldKind::Text),
            ConfigField::required("managed_zone", "Cloud DNS managed zone name", FieldKind::Text),
            ConfigField::optional("ttl", "Record TTL in seconds", FieldKind::Text, Some("300")),
        ]
    }

    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
        self.validate(credentials)?;
        Ok(Box::new(GcloudProvider::new(credentials)?))
    }
}
