use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use nocturne_api::{AuthError, SameSite, SecretStore};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "auth.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub features: FeatureFlags,
    pub jwt: JwtConfig,
    pub legacy_jwt: LegacyJwtConfig,
    pub cookies: CookieConfig,
    pub session: SessionConfig,
    pub revocation: RevocationConfig,
    pub lockdown: LockdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub oidc_enabled: bool,
    pub local_identity_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            oidc_enabled: true,
            local_identity_enabled: false,
        }
    }
}

impl FeatureFlags {
    /// Session cookies are only issued when some interactive login exists.
    #[must_use]
    pub fn session_cookies_enabled(&self) -> bool {
        self.oidc_enabled || self.local_identity_enabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_seconds: u64,
    pub secret_ref: Option<String>,
    pub secret: Option<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: Some("nocturne".to_string()),
            audience: Some("nocturne-api".to_string()),
            leeway_seconds: 60,
            secret_ref: Some("NOCTURNE_JWT_SIGNING_KEY".to_string()),
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyJwtConfig {
    /// Environment variables tried in order before `secret`.
    pub secret_env: Vec<String>,
    pub secret: Option<String>,
}

impl Default for LegacyJwtConfig {
    fn default() -> Self {
        Self {
            secret_env: vec!["JWT_SECRET".to_string(), "API_SECRET".to_string()],
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub access_token_name: String,
    pub refresh_token_name: String,
    pub is_authenticated_name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub refresh_token_lifetime_seconds: u64,
}

/// Upper bound for `cookies.refresh_token_lifetime_seconds`: 400 days, the
/// longest cookie lifetime browsers honour.
pub const MAX_REFRESH_TOKEN_LIFETIME_SECONDS: u64 = 400 * 24 * 60 * 60;

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_token_name: ".Nocturne.AccessToken".to_string(),
            refresh_token_name: ".Nocturne.RefreshToken".to_string(),
            is_authenticated_name: "IsAuthenticated".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            refresh_token_lifetime_seconds: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub auth_service_url: String,
    pub refresh_path: String,
    pub request_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_service_url: "http://127.0.0.1:1612".to_string(),
            refresh_path: "/api/auth/session/refresh".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationFailurePolicy {
    #[default]
    FailClosed,
    FailOpen,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationConfig {
    pub on_error: RevocationFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockdownConfig {
    pub enabled: bool,
    pub reject_on_credential_failure: bool,
    /// Exact paths, or prefixes when the entry ends with `*`.
    pub public_paths: Vec<String>,
}

impl Default for LockdownConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reject_on_credential_failure: false,
            public_paths: vec![
                "/api/v1/status".to_string(),
                "/api/auth/*".to_string(),
                "/health".to_string(),
            ],
        }
    }
}

pub fn validate_config(cfg: &AuthConfig) -> Result<(), AuthError> {
    let c = &cfg.cookies;
    let names = [
        ("access_token_name", &c.access_token_name),
        ("refresh_token_name", &c.refresh_token_name),
        ("is_authenticated_name", &c.is_authenticated_name),
    ];

    let mut seen = BTreeSet::new();
    for (key, name) in names {
        if name.trim().is_empty() {
            return Err(AuthError::Validation(format!("cookies.{key} is empty")));
        }
        if name.contains(['=', ';', ' ']) {
            return Err(AuthError::Validation(format!(
                "cookies.{key} contains characters not allowed in a cookie name"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(AuthError::Validation(format!(
                "cookies.{key} duplicates another cookie name: {name}"
            )));
        }
    }

    if c.same_site == SameSite::None && !c.secure {
        return Err(AuthError::Validation(
            "cookies.same_site = \"none\" requires cookies.secure = true".to_string(),
        ));
    }
    if c.refresh_token_lifetime_seconds == 0 {
        return Err(AuthError::Validation(
            "cookies.refresh_token_lifetime_seconds must be positive".to_string(),
        ));
    }
    if c.refresh_token_lifetime_seconds > MAX_REFRESH_TOKEN_LIFETIME_SECONDS {
        return Err(AuthError::Validation(format!(
            "cookies.refresh_token_lifetime_seconds must not exceed {MAX_REFRESH_TOKEN_LIFETIME_SECONDS}"
        )));
    }

    if cfg.features.session_cookies_enabled() && cfg.session.auth_service_url.trim().is_empty() {
        return Err(AuthError::Validation(
            "session.auth_service_url is required when session cookies are enabled".to_string(),
        ));
    }

    for path in &cfg.lockdown.public_paths {
        if !path.starts_with('/') {
            return Err(AuthError::Validation(format!(
                "lockdown.public_paths entry {path} must start with /"
            )));
        }
    }

    Ok(())
}

/// Signing secret for self-issued tokens: `jwt.secret_ref` from the store,
/// then the inline `jwt.secret`.
#[must_use]
pub fn resolve_signing_secret(cfg: &JwtConfig, secrets: &dyn SecretStore) -> Option<SecretString> {
    cfg.secret_ref
        .as_deref()
        .and_then(|name| secrets.get(name).ok())
        .or_else(|| cfg.secret.clone())
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
}

/// Legacy secret: each `secret_env` entry in order, then `secret`.
#[must_use]
pub fn resolve_legacy_secret(
    cfg: &LegacyJwtConfig,
    secrets: &dyn SecretStore,
) -> Option<SecretString> {
    for name in &cfg.secret_env {
        match secrets.get(name) {
            Ok(value) if !value.trim().is_empty() => {
                tracing::debug!(source = %name, "legacy JWT secret resolved");
                return Some(SecretString::from(value));
            }
            _ => {}
        }
    }

    cfg.secret
        .clone()
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("nocturne")
    } else {
        PathBuf::from(".nocturne")
    }
}

pub fn load_config_from_dir(dir: &Path) -> Result<AuthConfig, AuthError> {
    load_config_from_file(&dir.join(CONFIG_FILE_NAME))
}

pub fn load_config_from_file(path: &Path) -> Result<AuthConfig, AuthError> {
    let content = fs::read_to_string(path)
        .map_err(|e| AuthError::NotFound(format!("failed to read {}: {e}", path.display())))?;
    parse_config(&content)
        .map_err(|e| AuthError::Validation(format!("invalid config in {}: {e}", path.display())))
}

pub fn parse_config(content: &str) -> Result<AuthConfig, AuthError> {
    let cfg: AuthConfig =
        toml::from_str(content).map_err(|e| AuthError::Validation(format!("invalid TOML: {e}")))?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn default_config_toml() -> &'static str {
    include_str!("../../../docs/nocturne-cli/examples/auth.toml.example")
}

/// Writes the default `auth.toml` unless one already exists.
pub fn write_default_config_file(dir: &Path) -> Result<PathBuf, AuthError> {
    fs::create_dir_all(dir)
        .map_err(|e| AuthError::Internal(format!("failed to create {}: {e}", dir.display())))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        fs::write(&path, default_config_toml()).map_err(|e| {
            AuthError::Internal(format!("failed to write {}: {e}", path.display()))
        })?;
    }
    Ok(path)
}
