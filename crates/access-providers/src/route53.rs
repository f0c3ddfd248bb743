//! Amazon Route 53 backend
//!
//! Requests are signed with SigV4 (`route53`, `us-east-1`: the API is
//! global). Route 53 speaks XML; the few elements we need are pulled out
//! with plain tag matching.
//!
//! - Read:  `GET  /2013-04-01/hostedzone/{id}/rrset?name=..&type=..&maxitems=1`
//! - Write: `POST /2013-04-01/hostedzone/{id}/rrset` with an `UPSERT` change

use access_core::record::RecordUpdate;
use access_core::traits::{
    Capabilities, ConfigField, DnsProvider, DnsProviderFactory, FieldKind, ProviderInfo,
    UpdateResult,
};
use access_core::{Error, ProviderCredentials, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;

use crate::http;
use crate::sigv4::{self, Signer};

pub const NAME: &str = "route53";

const API_BASE: &str = "https://route53.amazonaws.com";
const API_VERSION: &str = "2013-04-01";
const SIGNING_REGION: &str = "us-east-1";
const SERVICE: &str = "route53";
const XMLNS: &str = "https://route53.amazonaws.com/doc/2013-04-01/";

/// Error codes Route 53 uses for throttling and in-flight conflicts
const RETRYABLE_CODES: &[&str] = &["Throttling", "PriorRequestNotComplete"];

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

/// Route 53 backend
pub struct Route53Provider {
    signer: Signer,
    hosted_zone_id: String,
    ttl: u32,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for Route53Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route53Provider")
            .field("signer", &self.signer)
            .field("hosted_zone_id", &self.hosted_zone_id)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Route53Provider {
    pub fn new(credentials: &ProviderCredentials) -> Result<Self> {
        let hosted_zone_id = credentials.require(NAME, "hosted_zone_id")?;
        Ok(Self {
            signer: Signer::new(
                credentials.require(NAME, "key")?,
                credentials.require(NAME, "secret")?,
                SIGNING_REGION,
                SERVICE,
            ),
            // Accept both "Z123" and "/hostedzone/Z123"
            hosted_zone_id: hosted_zone_id.trim_start_matches("/hostedzone/").to_string(),
            ttl: http::record_ttl(NAME, credentials)?,
            base_url: API_BASE.to_string(),
            client: http::client(NAME)?,
        })
    }

    /// Point the backend at another API root
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = http::base_url(url);
        self
    }

    fn host(&self) -> &str {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }

    /// Sign and send one request, returning the XML body of a success
    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<String> {
        let payload = body.unwrap_or_default();
        let content_type = [("content-type", "text/xml")];
        let signed_extra: &[(&str, &str)] = if payload.is_empty() { &[] } else { &content_type };

        let signed = self.signer.sign(
            &sigv4::Request {
                method: method.as_str(),
                host: self.host(),
                path,
                query,
                headers: signed_extra,
                payload: payload.as_bytes(),
            },
            Utc::now(),
        );

        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .query(query)
            .header("Authorization", signed.authorization)
            .header("X-Amz-Date", signed.amz_date);
        if !payload.is_empty() {
            request = request.header("Content-Type", "text/xml").body(payload);
        }

        let response = request.send().await.map_err(|e| http::send_error(NAME, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| http::send_error(NAME, e))?;
        if status.is_success() {
            return Ok(text);
        }

        let code = first_tag(&text, "Code").unwrap_or_default();
        let message = first_tag(&text, "Message").unwrap_or(&text);
        if RETRYABLE_CODES.contains(&code) {
            return Err(Error::transient(NAME, format!("{}: {}", code, message)));
        }
        Err(http::status_error(NAME, status, message))
    }

    async fn current(&self, record: &RecordUpdate) -> Result<Option<IpAddr>> {
        let name = format!("{}.", record.fqdn());
        let path = format!("/{}/hostedzone/{}/rrset", API_VERSION, self.hosted_zone_id);
        let xml = self
            .call(
                reqwest::Method::GET,
                &path,
                &[
                    ("name", name.as_str()),
                    ("type", record.record_type().as_str()),
                    ("maxitems", "1"),
                ],
                None,
            )
            .await?;

        Ok(find_record_value(&xml, &name, record.record_type().as_str()))
    }
}

fn change_batch(record: &RecordUpdate, ttl: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ChangeResourceRecordSetsRequest xmlns="{xmlns}">
  <ChangeBatch>
    <Comment>access dynamic DNS update</Comment>
    <Changes>
      <Change>
        <Action>UPSERT</Action>
        <ResourceRecordSet>
          <Name>{name}.</Name>
          <Type>{rtype}</Type>
          <TTL>{ttl}</TTL>
          <ResourceRecords>
            <ResourceRecord>
              <Value>{value}</Value>
            </ResourceRecord>
          </ResourceRecords>
        </ResourceRecordSet>
      </Change>
    </Changes>
  </ChangeBatch>
</ChangeResourceRecordSetsRequest>
"#,
        xmlns = XMLNS,
        name = record.fqdn(),
        rtype = record.record_type(),
        ttl = ttl,
        value = record.address(),
    )
}

/// Text of the first `<tag>...</tag>` element
fn first_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    blocks(xml, tag).next()
}

/// Texts of every `<tag>...</tag>` element, in document order
fn blocks<'a>(xml: &'a str, tag: &str) -> impl Iterator<Item = &'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut rest = xml;
    std::iter::from_fn(move || {
        let start = rest.find(&open)? + open.len();
        let end = rest[start..].find(&close)? + start;
        let inner = &rest[start..end];
        rest = &rest[end + close.len()..];
        Some(inner.trim())
    })
}

/// First value of the record set matching `name` and `rtype` exactly
///
/// `ListResourceRecordSets` starts at `name` but may return later names when
/// the record does not exist, so the match is checked here.
fn find_record_value(xml: &str, name: &str, rtype: &str) -> Option<IpAddr> {
    blocks(xml, "ResourceRecordSet")
        .find(|set| {
            first_tag(set, "Name").is_some_and(|n| n.eq_ignore_ascii_case(name))
                && first_tag(set, "Type") == Some(rtype)
        })
        .and_then(|set| first_tag(set, "Value"))
        .and_then(|value| value.parse().ok())
}

#[async_trait]
impl DnsProvider for Route53Provider {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    async fn apply(&self, record: &RecordUpdate) -> Result<UpdateResult> {
        let new_ip = record.address();
        let previous = self.current(record).await?;
        if previous == Some(new_ip) {
            return Ok(UpdateResult::Unchanged { current_ip: new_ip });
        }

        tracing::info!("Upserting Route 53 record {} -> {}", record.fqdn(), new_ip);
        let path = format!("/{}/hostedzone/{}/rrset", API_VERSION, self.hosted_zone_id);
        let xml = self
            .call(
                reqwest::Method::POST,
                &path,
                &[],
                Some(change_batch(record, self.ttl)),
            )
            .await?;
        if let Some(change_id) = first_tag(&xml, "Id") {
            tracing::debug!("Route 53 change submitted: {}", change_id);
        }

        Ok(match previous {
            Some(previous_ip) => UpdateResult::Updated {
                previous_ip: Some(previous_ip),
                new_ip,
            },
            None => UpdateResult::Created { new_ip },
        })
    }

    async fn test(&self) -> Result<()> {
        let path = format!("/{}/hostedzone/{}", API_VERSION, self.hosted_zone_id);
        self.call(reqwest::Method::GET, &path, &[], None)
            .await
            .map(|_| ())
    }
}

/// Factory for Route 53 backends
pub struct Route53Factory;

impl DnsProviderFactory for Route53Factory {
    fn info(&self) -> ProviderInfo {
        INFO
    }

    fn required_config(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("key", "AWS access key ID", FieldKind::Text),
            ConfigField::required("secret", "AWS secret access key", FieldKind::Secret),
            ConfigField::required("hosted_zone_id", "Route 53 hosted zone ID", FieldKind::Text),
            ConfigField::optional("ttl", "Record TTL in seconds", FieldKind::Text, Some("300")),
        ]
    }

    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn DnsProvider>> {
        self.validate(credentials)?;
        Ok(Box::new(Route53Provider::new(credentials)?))
    }
}
