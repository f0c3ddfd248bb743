// # HTTP IP Source
//
// Asks an external echo service which address our traffic arrives from.
//
// ## Purpose
//
// This is the **fallback source** for hosts behind NAT, where no interface
// carries the public address. The resolver chain tries interface addresses
// first and only then this source.
//
// ## Behaviour
//
// Services are tried in order until one answers with a literal of the
// requested family. Each request is bounded by a 10 s timeout. Unreachable
// services are not errors; the source then reports no address.

use access_core::traits::{IpSource, IpVersion};
use access_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Overall timeout for one echo request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Echo services answering over IPv4 only
const IPV4_SERVICES: &[&str] = &["https://api.ipify.org", "https://ipv4.icanhazip.com"];

/// Echo services answering over IPv6 only
const IPV6_SERVICES: &[&str] = &["https://api6.ipify.org", "https://ipv6.icanhazip.com"];

/// Echo services answering over either family
const ANY_SERVICES: &[&str] = &["https://api64.ipify.org", "https://icanhazip.com"];

/// HTTP echo-service IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// Overrides the built-in service lists when set
    urls: Option<Vec<String>>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Source using the built-in services
    pub fn new() -> Self {
        Self {
            urls: None,
            client: build_client(),
        }
    }

    /// Source querying `urls` in order, whatever the requested family
    pub fn with_urls(urls: Vec<String>) -> Self {
        Self {
            urls: Some(urls),
            client: build_client(),
        }
    }

    fn services(&self, family: Option<IpVersion>) -> Vec<String> {
        if let Some(urls) = &self.urls {
            return urls.clone();
        }
        let list = match family {
            Some(IpVersion::V4) => IPV4_SERVICES,
            Some(IpVersion::V6) => IPV6_SERVICES,
            None => ANY_SERVICES,
        };
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Fetch the address one service reports
    async fn fetch_ip(&self, url: &str) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transient("http", format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::transient(
                "http",
                format!("{} answered HTTP {}", url, response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transient("http", format!("Failed to read response: {}", e)))?;

        parse_body(&body)
    }
}

impl Default for HttpIpSource {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("access/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Parse an echo-service body: a bare address literal, maybe with whitespace
pub fn parse_body(body: &str) -> Result<IpAddr> {
    let text = body.trim();
    text.parse()
        .map_err(|_| Error::rejected("http", format!("Invalid IP address: {:?}", text)))
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self, family: Option<IpVersion>) -> Result<Option<IpAddr>> {
        for url in self.services(family) {
            match self.fetch_ip(&url).await {
                Ok(ip) if family.is_none_or(|f| f.matches(&ip)) => {
                    tracing::debug!("{} reports {}", url, ip);
                    return Ok(Some(ip));
                }
                Ok(ip) => {
                    tracing::debug!("{} reports {} of the wrong family", url, ip);
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                }
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
