use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use nocturne_api::{AuthError, SessionService, TokenPair};
use nocturne_core::SessionConfig;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    /// Access token lifetime in seconds.
    expires_in: u64,
    refresh_expires_in: Option<u64>,
}

/// Calls the identity service's session-refresh endpoint.
///
/// One attempt per call; the caller decides what a failure means.
#[derive(Debug, Clone)]
pub struct HttpSessionService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSessionService {
    pub fn from_config(cfg: &SessionConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/{}",
            cfg.auth_service_url.trim_end_matches('/'),
            cfg.refresh_path.trim_start_matches('/')
        );
        Ok(Self { client, endpoint })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn refresh_session(
        &self,
        refresh_token: &str,
        ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Result<Option<TokenPair>, AuthError> {
        let body = RefreshRequest {
            refresh_token,
            ip_address: ip.map(|ip| ip.to_string()),
            user_agent,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Connection(format!("session refresh request failed: {e}")))?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::NOT_FOUND
        ) {
            tracing::debug!(%status, "identity service declined refresh token");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::Connection(format!(
                "session refresh failed: {status}"
            )));
        }

        let parsed: RefreshResponse = resp.json().await.map_err(|e| {
            AuthError::Connection(format!("invalid session refresh response: {e}"))
        })?;

        let now = SystemTime::now();
        let access_expires_at = expiry_after(now, parsed.expires_in)?;
        let refresh_expires_at = parsed
            .refresh_expires_in
            .map(|secs| expiry_after(now, secs))
            .transpose()?;

        Ok(Some(TokenPair {
            access_token: SecretString::from(parsed.access_token),
            refresh_token: SecretString::from(parsed.refresh_token),
            access_expires_at,
            refresh_expires_at,
        }))
    }
}

fn expiry_after(now: SystemTime, secs: u64) -> Result<SystemTime, AuthError> {
    now.checked_add(Duration::from_secs(secs)).ok_or_else(|| {
        AuthError::Connection(format!("invalid expiry in session refresh response: {secs}s"))
    })
}
