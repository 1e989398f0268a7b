#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use nocturne_api::{AuthError, AuthRequest, SessionService, TokenPair};
use nocturne_auth::{JwtIssuer, JwtPolicy};
use nocturne_connectors::{InMemoryRevocationCache, MapSecretStore};
use nocturne_core::AuthConfig;
use nocturne_runtime::AuthRuntime;
use secrecy::SecretString;
use serde_json::{Map, Value, json};

pub const SIGNING_SECRET: &str = "test-signing-secret";
pub const LEGACY_SECRET: &str = "test-api-secret";
pub const ACCESS_COOKIE: &str = ".Nocturne.AccessToken";
pub const REFRESH_COOKIE: &str = ".Nocturne.RefreshToken";
pub const FLAG_COOKIE: &str = "IsAuthenticated";

pub fn config() -> AuthConfig {
    AuthConfig::default()
}

pub fn secrets() -> MapSecretStore {
    MapSecretStore::new()
        .with("NOCTURNE_JWT_SIGNING_KEY", SIGNING_SECRET)
        .with("API_SECRET", LEGACY_SECRET)
}

pub fn policy() -> JwtPolicy {
    let cfg = config();
    JwtPolicy {
        issuer: cfg.jwt.issuer,
        audience: cfg.jwt.audience,
        leeway_seconds: cfg.jwt.leeway_seconds,
    }
}

pub fn object(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

/// Token signed with the service signing secret.
pub fn signed(claims: Value) -> String {
    JwtIssuer::hs256(&SecretString::from(SIGNING_SECRET.to_string()), &policy())
        .unwrap()
        .mint(object(claims), Duration::from_secs(900))
        .unwrap()
}

pub fn expired(claims: Value) -> String {
    JwtIssuer::hs256(&SecretString::from(SIGNING_SECRET.to_string()), &policy())
        .unwrap()
        .mint_at(
            object(claims),
            SystemTime::now() - Duration::from_secs(7200),
            Duration::from_secs(600),
        )
        .unwrap()
}

/// Token signed with the legacy API secret, no iss/aud.
pub fn legacy(claims: Value) -> String {
    JwtIssuer::hs256(
        &SecretString::from(LEGACY_SECRET.to_string()),
        &JwtPolicy::default(),
    )
    .unwrap()
    .mint(object(claims), Duration::from_secs(900))
    .unwrap()
}

pub fn session_claims(sub: &str) -> Value {
    json!({"sub": sub, "name": "Session User", "roles": ["readable"]})
}

pub enum RefreshBehaviour {
    Issue { access: String },
    IssueExpiring { access: String, expires_in: Duration },
    Decline,
    Fail,
}

/// Session service double that counts calls.
pub struct StubSessions {
    pub calls: AtomicUsize,
    pub last_ip: Mutex<Option<IpAddr>>,
    behaviour: RefreshBehaviour,
}

impl StubSessions {
    pub fn new(behaviour: RefreshBehaviour) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last_ip: Mutex::new(None),
            behaviour,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionService for StubSessions {
    async fn refresh_session(
        &self,
        _refresh_token: &str,
        ip: Option<IpAddr>,
        _user_agent: Option<&str>,
    ) -> Result<Option<TokenPair>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_ip.lock().unwrap() = ip;
        match &self.behaviour {
            RefreshBehaviour::Issue { access } => Ok(Some(pair(access, Duration::from_secs(900)))),
            RefreshBehaviour::IssueExpiring { access, expires_in } => {
                Ok(Some(pair(access, *expires_in)))
            }
            RefreshBehaviour::Decline => Ok(None),
            RefreshBehaviour::Fail => Err(AuthError::Connection("identity service down".to_string())),
        }
    }
}

fn pair(access: &str, expires_in: Duration) -> TokenPair {
    TokenPair {
        access_token: SecretString::from(access.to_string()),
        refresh_token: SecretString::from("rotated-refresh".to_string()),
        access_expires_at: SystemTime::now() + expires_in,
        refresh_expires_at: None,
    }
}

pub fn runtime_with(
    cfg: &AuthConfig,
    sessions: Arc<StubSessions>,
    revocations: Arc<InMemoryRevocationCache>,
) -> AuthRuntime {
    AuthRuntime::from_config(cfg, &secrets(), revocations, sessions).unwrap()
}

pub fn runtime(sessions: Arc<StubSessions>) -> AuthRuntime {
    runtime_with(&config(), sessions, Arc::new(InMemoryRevocationCache::new()))
}

pub fn request(headers: &[(&'static str, String)]) -> AuthRequest {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(*name, HeaderValue::from_str(value).unwrap());
    }
    AuthRequest::new(map)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("authorization", format!("Bearer {token}"))
}

pub fn cookies(pairs: &[(&str, &str)]) -> (&'static str, String) {
    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ");
    ("cookie", joined)
}

pub fn set_cookie_for<'a>(cookies: &'a [String], name: &str) -> Option<&'a String> {
    cookies.iter().find(|c| c.starts_with(&format!("{name}=")))
}

pub fn is_removal(cookie: &str) -> bool {
    cookie.contains("Max-Age=0")
}

/// `Max-Age` attribute of a `Set-Cookie` value.
pub fn max_age(cookie: &str) -> Option<u64> {
    cookie
        .split("; ")
        .find_map(|attr| attr.strip_prefix("Max-Age="))
        .and_then(|v| v.parse().ok())
}
