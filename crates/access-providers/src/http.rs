//! HTTP plumbing shared by every backend
//!
//! One client configuration (5 s connect, 15 s overall) and one mapping
//! from HTTP outcomes to the core failure taxonomy:
//!
//! | Outcome                         | Error                 |
//! |---------------------------------|-----------------------|
//! | connect failure, timeout        | `TransientNetwork`    |
//! | 401, 403                        | `AuthenticationFailed`|
//! | 408, 429, 5xx                   | `TransientNetwork`    |
//! | any other non-success status    | `RejectedByProvider`  |

use access_core::{Error, ProviderCredentials, Result};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// TCP connect timeout for vendor APIs
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall request timeout for vendor APIs
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Record TTL when the credentials do not set one
pub const DEFAULT_TTL: u32 = 300;

/// Longest slice of a vendor error body kept in messages
const MAX_BODY_IN_ERROR: usize = 200;

/// Build the client every backend uses
pub fn client(provider: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("access/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Other(format!("{}: failed to build HTTP client: {}", provider, e)))
}

/// Error for a request that never produced a response
pub fn send_error(provider: &str, err: reqwest::Error) -> Error {
    let what = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    Error::transient(provider, format!("{}: {}", what, err))
}

/// Error for a non-success status
pub fn status_error(provider: &str, status: StatusCode, body: &str) -> Error {
    let body = truncate(body.trim());
    match status.as_u16() {
        401 | 403 => Error::auth(provider, format!("HTTP {}: {}", status, body)),
        408 | 429 => Error::transient(provider, format!("HTTP {} (retry later): {}", status, body)),
        500..=599 => Error::transient(provider, format!("server error HTTP {}: {}", status, body)),
        _ => Error::rejected(provider, format!("HTTP {}: {}", status, body)),
    }
}

/// Pass successful responses through, map everything else
pub async fn check(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(provider, status, &body))
}

/// Check the status, then decode a JSON body
pub async fn json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T> {
    let response = check(provider, response).await?;
    let text = response
        .text()
        .await
        .map_err(|e| Error::transient(provider, format!("failed to read response: {}", e)))?;
    serde_json::from_str(&text)
        .map_err(|e| Error::rejected(provider, format!("unexpected response body: {}", e)))
}

/// Record TTL from the optional `ttl` credential field
pub fn record_ttl(provider: &str, credentials: &ProviderCredentials) -> Result<u32> {
    match credentials.get("ttl") {
        None => Ok(DEFAULT_TTL),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|ttl| *ttl > 0)
            .ok_or_else(|| Error::config(format!("{}: invalid ttl '{}'", provider, raw))),
    }
}

/// Strip a trailing slash so paths can be appended with `format!`
pub fn base_url(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_BODY_IN_ERROR {
        return body.to_string();
    }
    let mut end = MAX_BODY_IN_ERROR;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        let auth = status_error("x", StatusCode::FORBIDDEN, "denied");
        assert!(matches!(auth, Error::AuthenticationFailed { .. }));

        assert!(status_error("x", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(status_error("x", StatusCode::BAD_GATEWAY, "").is_transient());

        let rejected = status_error("x", StatusCode::UNPROCESSABLE_ENTITY, "bad record");
        assert!(matches!(rejected, Error::RejectedByProvider { ref message, .. } if message.contains("bad record")));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "é".repeat(300);
        let err = status_error("x", StatusCode::BAD_REQUEST, &body);
        let Error::RejectedByProvider { message, .. } = err else {
            panic!("expected rejection");
        };
        assert!(message.ends_with("..."));
        assert!(message.len() < 260);
    }

    #[test]
    fn ttl_defaults_and_validates() {
        let creds = ProviderCredentials::new("k", "s");
        assert_eq!(record_ttl("x", &creds).unwrap(), DEFAULT_TTL);

        let creds = creds.with_extra("ttl", "600");
        assert_eq!(record_ttl("x", &creds).unwrap(), 600);

        let bad = ProviderCredentials::new("k", "s").with_extra("ttl", "soon");
        assert!(matches!(record_ttl("x", &bad), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        // Reserve a port, then close it so the connect is refused
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client("x")
            .unwrap()
            .get(format!("http://{}/", addr))
            .send()
            .await
            .map_err(|e| send_error("x", e))
            .unwrap_err();
        assert!(err.is_transient());
    }
}
