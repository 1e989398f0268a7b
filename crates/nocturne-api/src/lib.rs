//! nocturne-api
//!
//! Shared vocabulary for request authentication: the resolved identity
//! ([`AuthContext`]), the handler contract ([`AuthHandler`] / [`AuthResult`]),
//! and the collaborator seams the handlers are wired to (token validation,
//! revocation lookup, session refresh, secret lookup).

#![forbid(unsafe_code)]

mod context;
mod request;

use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use context::{AuthContext, AuthContextBuilder, AuthType, SubjectId};
pub use request::AuthRequest;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Outcome of one handler's attempt at a request.
#[derive(Debug, Clone)]
pub enum AuthResult {
    /// The handler's credential was present and valid.
    Success(AuthContext),
    /// The handler's credential was present but invalid. Halts the chain.
    Failure(String),
    /// The handler's credential was absent or not in a shape it understands.
    Skip,
}

impl AuthResult {
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        AuthResult::Failure(reason.into())
    }

    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, AuthResult::Skip)
    }

    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthResult::Success(_) => "success",
            AuthResult::Failure(_) => "failure",
            AuthResult::Skip => "skip",
        }
    }
}

/// One credential scheme in the resolver chain.
///
/// Lower priorities run first. Implementations must turn every internal
/// error into [`AuthResult::Skip`] or [`AuthResult::Failure`].
#[async_trait]
pub trait AuthHandler: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    async fn authenticate(&self, request: &mut AuthRequest) -> AuthResult;
}

/// Claim set of a JWT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    #[must_use]
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Builds claims from a JSON value; non-objects give an empty set.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// String claim, ignoring blanks.
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn sub(&self) -> Option<&str> {
        self.str("sub")
    }

    #[must_use]
    pub fn jti(&self) -> Option<&str> {
        self.str("jti")
    }

    #[must_use]
    pub fn exp(&self) -> Option<i64> {
        self.get("exp").and_then(Value::as_i64)
    }

    /// `exp` as a point in time.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        let exp = u64::try_from(self.exp()?).ok()?;
        Some(UNIX_EPOCH + Duration::from_secs(exp))
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorCode {
    Expired,
    InvalidSignature,
    InvalidIssuer,
    InvalidAudience,
    Malformed,
    MissingClaim,
    Invalid,
}

/// Why a token failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TokenRejection {
    pub code: ValidationErrorCode,
    pub message: String,
}

impl TokenRejection {
    #[must_use]
    pub fn new(code: ValidationErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.code == ValidationErrorCode::Expired
    }
}

/// Cryptographic validation of access tokens. Immutable once built, shared
/// across requests.
pub trait TokenValidator: Send + Sync {
    /// # Errors
    /// Returns a [`TokenRejection`] describing the first failed check.
    fn validate_access_token(&self, token: &str) -> Result<Claims, TokenRejection>;
}

/// Lookup of revoked token ids (`jti`).
#[async_trait]
pub trait RevocationCache: Send + Sync {
    async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError>;
    async fn revoke(&self, jti: &str, until: SystemTime) -> Result<(), AuthError>;
}

/// Token pair issued by a successful session refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub access_expires_at: SystemTime,
    pub refresh_expires_at: Option<SystemTime>,
}

/// External identity service that exchanges refresh tokens.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// `Ok(None)` means the refresh token was not accepted.
    async fn refresh_session(
        &self,
        refresh_token: &str,
        ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Result<Option<TokenPair>, AuthError>;
}

pub trait SecretStore: Send + Sync {
    fn get(&self, secret_ref: &str) -> Result<String, AuthError>;
}

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}
