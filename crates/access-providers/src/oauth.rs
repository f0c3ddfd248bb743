//! OAuth2 token exchange for Azure and Google Cloud
//!
//! Access tokens live only inside the backend instance. They are cached
//! until shortly before expiry and never written anywhere.

use access_core::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::http;

/// Tokens are refreshed this long before the vendor says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Bearer token and its lifetime as issued
pub struct AccessToken {
    pub value: String,
    pub expires_in: Duration,
}

struct Cached {
    value: String,
    refresh_at: Instant,
}

/// Single-entry token cache
#[derive(Default)]
pub struct TokenCache {
    slot: Mutex<Option<Cached>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token, or a fresh one from `fetch`
    pub async fn get<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }

        let token = fetch().await?;
        let lifetime = token.expires_in.saturating_sub(EXPIRY_MARGIN);
        *slot = Some(Cached {
            value: token.value.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.value)
    }
}

// Tokens must never reach logs
impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

/// POST a form to a token endpoint
///
/// Token endpoints answer bad client credentials or a revoked refresh token
/// with 400, so 400 counts as an authentication failure here.
pub async fn request_token(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken> {
    let response = client
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| http::send_error(provider, e))?;

    let status = response.status();
    if status.as_u16() == 400 {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let reason = body["error_description"]
            .as_str()
            .or_else(|| body["error"].as_str())
            .unwrap_or("token request rejected");
        return Err(Error::auth(provider, reason.to_string()));
    }

    let body: Value = http::json(provider, response).await?;
    parse_token(provider, &body)
}

fn parse_token(provider: &str, body: &Value) -> Result<AccessToken> {
    let value = body["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::auth(provider, "token response carried no access_token"))?;

    // Some endpoints send expires_in as a string
    let expires_in = body["expires_in"]
        .as_u64()
        .or_else(|| body["expires_in"].as_str().and_then(|s| s.parse().ok()))
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LIFETIME);

    Ok(AccessToken {
        value: value.to_string(),
        expires_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockServer;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn cache_reuses_live_token() {
        let cache = TokenCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken {
                value: "t1".into(),
                expires_in: Duration::from_secs(3600),
            })
        };

        assert_eq!(cache.get(fetch).await.unwrap(), "t1");
        assert_eq!(cache.get(fetch).await.unwrap(), "t1");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_lived_token_is_refetched() {
        let cache = TokenCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = || async move {
            let n = fetches.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken {
                value: format!("t{}", n),
                // Inside the refresh margin: stale immediately
                expires_in: Duration::from_secs(30),
            })
        };

        assert_eq!(cache.get(fetch).await.unwrap(), "t0");
        assert_eq!(cache.get(fetch).await.unwrap(), "t1");
    }

    #[test]
    fn expires_in_accepts_string() {
        let token = parse_token("x", &json!({"access_token": "abc", "expires_in": "120"})).unwrap();
        assert_eq!(token.expires_in, Duration::from_secs(120));

        assert!(parse_token("x", &json!({"token_type": "Bearer"})).is_err());
    }

    #[tokio::test]
    async fn invalid_grant_is_authentication_failure() {
        let server = MockServer::start(vec![(
            400,
            r#"{"error":"invalid_grant","error_description":"Token has been revoked"}"#,
        )])
        .await;
        let client = http::client("x").unwrap();

        let err = request_token(&client, "x", &format!("{}/token", server.url), &[("a", "b")])
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::AuthenticationFailed { ref message, .. } if message.contains("revoked")));
        assert_eq!(server.requests()[0].body, "a=b");
    }
}
