//! HS256 validation and minting of self-issued JWTs.

use crate::{Error, Result};

use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use nocturne_api::{Claims, TokenRejection, TokenValidator, ValidationErrorCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Claims a token must satisfy beyond its signature.
#[derive(Debug, Clone)]
pub struct JwtPolicy {
    /// Expected issuer (`iss`). `None` skips the check.
    pub issuer: Option<String>,

    /// Expected audience (`aud`). `None` skips the check.
    pub audience: Option<String>,

    /// Clock skew/leeway in seconds.
    pub leeway_seconds: u64,
}

impl Default for JwtPolicy {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            leeway_seconds: 60,
        }
    }
}

/// True when `token` has exactly two `.` delimiters, i.e. the shape of a
/// signed JWT. Says nothing about validity.
pub fn is_jwt_shaped(token: &str) -> bool {
    !token.is_empty() && token.bytes().filter(|b| *b == b'.').count() == 2
}

/// Decode the payload segment without checking the signature.
///
/// Only for deciding which validator a token belongs to; never trust the
/// result.
pub fn peek_claims(token: &str) -> Option<Claims> {
    if !is_jwt_shaped(token) {
        return None;
    }
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(Claims::new(map)),
        _ => None,
    }
}

/// Validates HS256 tokens against one secret and policy.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("iss", &self.validation.iss)
            .field("aud", &self.validation.aud)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl JwtValidator {
    /// Build a validator for `secret`.
    pub fn hs256(secret: &SecretString, policy: &JwtPolicy) -> Result<Self> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(Error::InvalidKey("HS256 secret is empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = policy.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &policy.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        match &policy.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Full validation: structure, signature, expiry, issuer and audience.
    pub fn validate(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        if !is_jwt_shaped(token) {
            return Err(TokenRejection::new(
                ValidationErrorCode::Malformed,
                "token is not a signed JWT",
            ));
        }

        jsonwebtoken::decode::<Value>(token, &self.key, &self.validation)
            .map(|data| Claims::from_value(data.claims))
            .map_err(|e| rejection(&e))
    }
}

impl TokenValidator for JwtValidator {
    fn validate_access_token(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        self.validate(token)
    }
}

fn rejection(err: &jsonwebtoken::errors::Error) -> TokenRejection {
    let (code, message) = match err.kind() {
        ErrorKind::ExpiredSignature => (ValidationErrorCode::Expired, "token has expired".to_string()),
        ErrorKind::InvalidSignature => (
            ValidationErrorCode::InvalidSignature,
            "token signature is invalid".to_string(),
        ),
        ErrorKind::InvalidIssuer => (
            ValidationErrorCode::InvalidIssuer,
            "token issuer is not accepted".to_string(),
        ),
        ErrorKind::InvalidAudience => (
            ValidationErrorCode::InvalidAudience,
            "token audience is not accepted".to_string(),
        ),
        ErrorKind::MissingRequiredClaim(claim) => (
            ValidationErrorCode::MissingClaim,
            format!("token is missing required claim {claim}"),
        ),
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => (ValidationErrorCode::Malformed, "token is malformed".to_string()),
        ErrorKind::ImmatureSignature => {
            (ValidationErrorCode::Invalid, "token is not yet valid".to_string())
        }
        _ => (ValidationErrorCode::Invalid, format!("token rejected: {err}")),
    };
    TokenRejection::new(code, message)
}

/// Signs HS256 tokens. Used for self-issued tokens and tooling.
#[derive(Clone)]
pub struct JwtIssuer {
    key: EncodingKey,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwtIssuer {
    pub fn hs256(secret: &SecretString, policy: &JwtPolicy) -> Result<Self> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(Error::InvalidKey("HS256 secret is empty".to_string()));
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            issuer: policy.issuer.clone(),
            audience: policy.audience.clone(),
        })
    }

    /// Sign `claims`, filling in `iat`, `exp` (now + `ttl`) and the policy's
    /// `iss`/`aud` where the caller did not set them.
    pub fn mint(&self, claims: Map<String, Value>, ttl: Duration) -> Result<String> {
        self.mint_at(claims, SystemTime::now(), ttl)
    }

    /// As [`JwtIssuer::mint`], with an explicit issue time.
    pub fn mint_at(
        &self,
        mut claims: Map<String, Value>,
        issued_at: SystemTime,
        ttl: Duration,
    ) -> Result<String> {
        let iat = issued_at
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::InvalidJwt(format!("issue time before epoch: {e}")))?
            .as_secs();

        let exp = iat
            .checked_add(ttl.as_secs())
            .ok_or_else(|| Error::InvalidJwt(format!("ttl of {}s is out of range", ttl.as_secs())))?;

        claims.entry("iat").or_insert_with(|| Value::from(iat));
        claims.entry("exp").or_insert_with(|| Value::from(exp));
        if let Some(iss) = &self.issuer {
            claims
                .entry("iss")
                .or_insert_with(|| Value::from(iss.as_str()));
        }
        if let Some(aud) = &self.audience {
            claims
                .entry("aud")
                .or_insert_with(|| Value::from(aud.as_str()));
        }

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &Value::Object(claims),
            &self.key,
        )?)
    }
}
