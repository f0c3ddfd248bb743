// # Cloudflare DNS Backend
//
// ## Behaviour
//
// - One record per call: list by name and type, then PUT the existing
//   record or POST a new one. No request is made when the record already
//   holds the address.
// - Zone id is taken from the credentials (`zone_id`) or looked up by
//   walking the record's domain upward until a zone matches.
// - Failures surface immediately; there is no retry here. The next
//   scheduled cycle is the retry.
//
// ## Authentication
//
// - API token: `Authorization: Bearer <key>`
// - Global API key: `X-Auth-Email: <email>` + `X-Auth-Key: <key>`, chosen
//   whenever `email` is set.
//
// ## Dry-Run Mode
//
// With `ACCESS_MODE=dry-run` all GET requests are made and the intended
// write is logged, but no record is modified.
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`

use access_core::record::RecordUpdate;
use access_core::traits::{
    Capabilities, ConfigField, DnsProvider, DnsProviderFactory, FieldKind, ProviderInfo,
    UpdateResult,
};
use access_core::{Error, ProviderCredentials, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::net::IpAddr;

use crate::http;

pub const NAME: &str = "cloudflare";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Environment variable selecting dry-run mode
pub const MODE_ENV: &str = "ACCESS_MODE";

const INFO: ProviderInfo = ProviderInfo {
    name: NAME,
    version: env!("CARGO_PKG_VERSION"),
    capabilities: Capabilities {
        ipv4: true,
        ipv6: true,
        connection_test: true,
        dry_run: true,
    },
};

/// How requests authenticate
enum Auth {
    Token(String),
    GlobalKey { email: String, key: String },
}

/// Cloudflare DNS backend
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API key.
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    auth: Auth,

    /// Zone ID (optional, looked up from the record's domain otherwise)
    zone_id: Option<String>,

    ttl: u32,

    /// Dry-run mode: if true, perform GET requests but skip writes
    dry_run: bool,

    base_url: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match self.auth {
            Auth::Token(_) => "token <REDACTED>",
            Auth::GlobalKey { .. } => "global key <REDACTED>",
        };
        f.debug_struct("CloudflareProvider")
            .field("auth", &auth)
            .field("zone_id", &self.zone_id)
            .field("ttl", &self.ttl)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a backend from credentials
    ///
    /// `key` is an API token, or the global API key when `email` is set.
    pub fn new(credentials: &ProviderCredentials, dry_run: bool) -> Result<Self> {
        let key = credentials.require(NAME, "key")?.to_string();
        let auth = match credentials.get("email") {
            Some(email) => Auth::GlobalKey {
                email: email.to_string(),
                key,
            },
            None => Auth::Token(key),
        };

        Ok(Self {
            auth,
            zone_id: credentials.get("zone_id").map(str::to_string),
            ttl: http::record_ttl(NAME, credentials)?,
            dry_run,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client: http::client(NAME)?,
        })
    }

    /// Point the backend at another API root
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = http::base_url(url);
        self
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::Token(token) => request.bearer_auth(token),
            Auth::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    /// Send a request and unwrap Cloudflare's `{success, errors, result}`
    /// envelope
    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = self
            .authorized(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| http::send_error(NAME, e))?;

        let body: Value = http::json(NAME, response).await?;
        if body["success"].as_bool() == Some(false) {
            return Err(Error::rejected(NAME, envelope_errors(&body)));
        }
        Ok(body["result"].clone())
    }

    /// Get the zone ID for a domain
    ///
    /// Tries `swarm.example.com`, then `example.com`, and so on, stopping
    /// at two labels.
    async fn get_zone_id(&self, domain: &str) -> Result<String> {
        if let Some(zone_id) = &self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            return Ok(zone_id.clone());
        }

        for candidate in zone_candidates(domain) {
            tracing::debug!("Looking up zone ID for {}", candidate);
            let result = self
                .call(
                    self.client
                        .get(format!("{}/zones", self.base_url))
                        .query(&[("name", candidate)]),
                )
                .await?;

            if let Some(id) = result[0]["id"].as_str() {
                tracing::debug!("Found zone ID: {}", id);
                return Ok(id.to_string());
            }
        }

        Err(Error::rejected(
            NAME,
            format!("no zone found for {} (set zone_id explicitly)", domain),
        ))
    }

    /// Existing record id and content for one name and type
    async fn get_record(
        &self,
        zone_id: &str,
        record: &RecordUpdate,
    ) -> Result<Option<(String, Option<IpAddr>)>> {
        let fqdn = record.fqdn();
        let result = self
            .call(
                self.client
                    .get(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
                    .query(&[("name", fqdn.as_str()), ("type", record.record_type().as_str())]),
            )
            .await?;

        let Some(existing) = result.as_array().and_then(|records| records.first()) else {
            return Ok(None);
        };
        let id = existing["id"]
            .as_str()
            .ok_or_else(|| Error::rejected(NAME, "record without id in response"))?;
        let content = existing["content"].as_str().and_then(|c| c.parse().ok());
        Ok(Some((id.to_string(), content)))
    }
}

fn zone_candidates(domain: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut rest = domain;
    while rest.contains('.') {
        candidates.push(rest);
        match rest.split_once('.') {
            Some((_, parent)) => rest = parent,
            None => break,
        }
    }
    candidates
}

fn envelope_errors(body: &Value) -> String {
    let messages: Vec<String> = body["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|e| format!("{} ({})", e["message"].as_str().unwrap_or("?"), e["code"]))
                .collect()
        })
        .unwrap_or_default();
    if messages.is_empty() {
        "request unsuccessful".to_string()
    } else {
        messages.join("; ")
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        let new_ip = record.address();
        let fqdn = record.fqdn();

        tracing::info!(
            "Updating Cloudflare DNS record: {} -> {} ({}) [mode: {}]",
            fqdn,
            new_ip,
            record.record_type(),
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let zone_id = self.get_zone_id(record.domain()).await?;
        let existing = self.get_record(&zone_id, record).await?;

        let payload = json!({
            "type": record.record_type().as_str(),
            "name": fqdn,
            "content": new_ip.to_string(),
            "ttl": self.ttl,
            "proxied": false,
        });

        match existing {
            Some((_, Some(current_ip))) if current_ip == new_ip => {
                tracing::info!("DNS record already has correct IP: {} -> {}", fqdn, new_ip);
                Ok(UpdateResult::Unchanged { current_ip })
            }
            Some((record_id, previous_ip)) => {
                let url = format!(
                    "{}/zones/{}/dns_records/{}",
                    self.base_url, zone_id, record_id
                );
                if self.dry_run {
                    tracing::info!("[DRY-RUN] Would PUT {} with payload: {}", url, payload);
                    return Ok(UpdateResult::Simulated {
                        previous_ip,
                        new_ip,
                    });
                }
                self.call(self.client.put(&url).json(&payload)).await?;
                tracing::info!("DNS record updated successfully: {} -> {}", fqdn, new_ip);
                Ok(UpdateResult::Updated {
                    previous_ip,
                    new_ip,
                })
            }
            None => {
                let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
                if self.dry_run {
                    tracing::info!("[DRY-RUN] Would POST {} with payload: {}", url, payload);
                    return Ok(UpdateResult::Simulated {
                        previous_ip: None,
                        new_ip,
                    });
                }
                self.call(self.client.post(&url).json(&payload)).await?;
                tracing::info!("DNS record created: {} -> {}", fqdn, new_ip);
                Ok(UpdateResult::Created { new_ip })
            }
        }
    }

    async fn test(&self) -> Result<()> {
        let url = match self.auth {
            Auth::Token(_) => format!("{}/user/tokens/verify", self.base_url),
            Auth::GlobalKey { .. } => format!("{}/user", self.base_url),
        };
        self.call(self.client.get(url)).await.map(|_| ())
    }
}

/// Factory for Cloudflare backends
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    fn required_config(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required(
                "key",
                "Cloudflare API token (or global API key when email is set)",
                FieldKind::Secret,
            ),
            ConfigField::optional("email", "Account email for the global API key", FieldKind::Text, None),
            ConfigField::optional("zone_id", "Zone ID (looked up when empty)", FieldKind::Text, None),
            ConfigField::optional("ttl", "Record TTL in seconds", FieldKind::Text, Some("300")),
        ]
    }

    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
        self.validate(credentials)?;

        // Check for dry-run mode environment variable
        let dry_run = std::env::var(MODE_ENV)
            .map(|mode| mode.eq_ignore_ascii_case("dry-run"))
            .unwrap_or(false);

        if dry_run {
            tracing::warn!("Cloudflare backend running in DRY-RUN mode - no changes will be made");
        }

        Ok(Box::new(CloudflareProvider::new(credentials, dry_run)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockServer;

    const ZONES: &str = r#"{"success":true,"errors":[],"result":[{"id":"zone-1"}]}"#;
    const NO_ZONES: &str = r#"{"success":true,"errors":[],"result":[]}"#;
    const NO_RECORDS: &str = r#"{"success":true,"errors":[],"result":[]}"#;
    const WRITTEN: &str = r#"{"success":true,"errors":[],"result":{"id":"rec-9"}}"#;

    fn provider(server: &MockServer, credentials: ProviderCredentials, dry_run: bool) -> CloudflareProvider {
        CloudflareProvider::new(&credentials, dry_run)
            .unwrap()
            .with_base_url(&server.url)
    }

    #[tokio::test]
    async fn creates_missing_record_after_zone_walk() {
        let server = MockServer::start(vec![(200, NO_ZONES), (200, ZONES), (200, NO_RECORDS), (200, WRITTEN)]).await;
        let cf = provider(&server, ProviderCredentials::new("cf-token", ""), false);

        let result = cf
            .update("swarm.example.com", "peer0", "203.0.113.20", None)
            .await
            .unwrap();

        assert!(matches!(result, UpdateResult::Created { .. }));
        let requests = server.requests();
        assert_eq!(requests[0].path, "/zones?name=swarm.example.com");
        assert_eq!(requests[1].path, "/zones?name=example.com");
        assert_eq!(
            requests[2].path,
            "/zones/zone-1/dns_records?name=peer0.swarm.example.com&type=A"
        );
        assert_eq!(requests[3].method, "POST");
        assert_eq!(requests[3].header("authorization"), Some("Bearer cf-token"));
        let body: Value = serde_json::from_str(&requests[3].body).unwrap();
        assert_eq!(body["content"], "203.0.113.20");
        assert_eq!(body["proxied"], false);
    }

    #[tokio::test]
    async fn equal_record_is_unchanged() {
        let server = MockServer::start(vec![(
            200,
            r#"{"success":true,"result":[{"id":"rec-1","content":"2001:db8::20"}]}"#,
        )])
        .await;
        let creds = ProviderCredentials::new("cf-token", "").with_extra("zone_id", "zone-1");
        let cf = provider(&server, creds, false);

        let result = cf
            .update("example.com", "peer0", "2001:db8::20", None)
            .await
            .unwrap();

        assert!(!result.mutated());
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn changed_record_is_put_with_global_key() {
        let server = MockServer::start(vec![
            (200, r#"{"success":true,"result":[{"id":"rec-1","content":"203.0.113.1"}]}"#),
            (200, WRITTEN),
        ])
        .await;
        let creds = ProviderCredentials::new("global-key", "")
            .with_extra("email", "ops@example.com")
            .with_extra("zone_id", "zone-1");
        let cf = provider(&server, creds, false);

        let result = cf
            .update("example.com", "peer0", "203.0.113.2", None)
            .await
            .unwrap();

        assert_eq!(
            result,
            UpdateResult::Updated {
                previous_ip: Some("203.0.113.1".parse().unwrap()),
                new_ip: "203.0.113.2".parse().unwrap(),
            }
        );
        let put = &server.requests()[1];
        assert_eq!(put.method, "PUT");
        assert_eq!(put.path, "/zones/zone-1/dns_records/rec-1");
        assert_eq!(put.header("x-auth-email"), Some("ops@example.com"));
        assert_eq!(put.header("x-auth-key"), Some("global-key"));
        assert_eq!(put.header("authorization"), None);
    }

    #[tokio::test]
    async fn dry_run_reads_but_never_writes() {
        let server = MockServer::start(vec![(200, NO_RECORDS)]).await;
        let creds = ProviderCredentials::new("cf-token", "").with_extra("zone_id", "zone-1");
        let cf = provider(&server, creds, true);

        let result = cf
            .update("example.com", "peer0", "203.0.113.3", None)
            .await
            .unwrap();

        assert_eq!(
            result,
            UpdateResult::Simulated {
                previous_ip: None,
                new_ip: "203.0.113.3".parse().unwrap(),
            }
        );
        assert!(!result.is_confirmed());
        assert!(!result.mutated());
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_rejection() {
        let server = MockServer::start(vec![(
            200,
            r#"{"success":false,"errors":[{"code":9109,"message":"Invalid access token"}],"result":null}"#,
        )])
        .await;
        let creds = ProviderCredentials::new("cf-token", "").with_extra("zone_id", "zone-1");
        let cf = provider(&server, creds, false);

        let err = cf
            .update("example.com", "peer0", "203.0.113.3", None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RejectedByProvider { ref message, .. } if message.contains("9109")));
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start(vec![(429, r#"{"success":false}"#)]).await;
        let creds = ProviderCredentials::new("cf-token", "").with_extra("zone_id", "zone-1");

        let err = provider(&server, creds, false)
            .update("example.com", "peer0", "203.0.113.3", None)
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn token_verification() {
        let server = MockServer::start(vec![(200, r#"{"success":true,"result":{"status":"active"}}"#)]).await;
        let cf = provider(&server, ProviderCredentials::new("cf-token", ""), false);

        cf.test().await.unwrap();
        assert_eq!(server.requests()[0].path, "/user/tokens/verify");
    }

    #[test]
    fn zone_walk_stops_at_two_labels() {
        assert_eq!(
            zone_candidates("a.swarm.example.com"),
            vec!["a.swarm.example.com", "swarm.example.com", "example.com"]
        );
        assert_eq!(zone_candidates("example.com"), vec!["example.com"]);
    }

    #[test]
    fn test_factory_missing_token() {
        let err = CloudflareFactory
            .create(&ProviderCredentials::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingCredentials { ref field, .. } if field == "key"));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let cf = CloudflareProvider::new(&ProviderCredentials::new("secret_token_12345", ""), false).unwrap();

        let debug_str = format!("{:?}", cf);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(debug_str.contains("CloudflareProvider"));
    }
}
