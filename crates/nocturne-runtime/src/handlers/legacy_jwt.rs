use async_trait::async_trait;
use nocturne_api::{AuthContext, AuthHandler, AuthRequest, AuthResult, AuthType, SubjectId};
use nocturne_auth::claims::{display_name, flag, scope_set, string_set};
use nocturne_auth::{JwtPolicy, JwtValidator, is_jwt_shaped};
use secrecy::SecretString;
use tracing::{debug, warn};

use super::LEGACY_JWT_PRIORITY;

const INVALID_TOKEN: &str = "Invalid token";

/// Bearer JWTs from before OAuth scopes existed, signed with the shared API
/// secret and carrying no issuer or audience.
pub struct LegacyJwtHandler {
    validator: Option<JwtValidator>,
}

impl LegacyJwtHandler {
    /// A handler with no secret is permanently disabled.
    #[must_use]
    pub fn new(secret: Option<&SecretString>, leeway_seconds: u64) -> Self {
        let policy = JwtPolicy {
            issuer: None,
            audience: None,
            leeway_seconds,
        };
        let validator = match secret.map(|s| JwtValidator::hs256(s, &policy)) {
            Some(Ok(v)) => Some(v),
            Some(Err(e)) => {
                warn!(error = %e, "legacy JWT secret unusable, legacy bearer tokens disabled");
                None
            }
            None => {
                warn!("no legacy JWT secret configured, legacy bearer tokens disabled");
                None
            }
        };
        Self { validator }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.validator.is_some()
    }
}

#[async_trait]
impl AuthHandler for LegacyJwtHandler {
    fn name(&self) -> &str {
        "legacy_jwt"
    }

    fn priority(&self) -> i32 {
        LEGACY_JWT_PRIORITY
    }

    async fn authenticate(&self, request: &mut AuthRequest) -> AuthResult {
        let Some(validator) = &self.validator else {
            return AuthResult::Skip;
        };
        let Some(token) = request.bearer_token() else {
            return AuthResult::Skip;
        };
        if !is_jwt_shaped(token) {
            return AuthResult::Skip;
        }

        let claims = match validator.validate(token) {
            Ok(claims) => claims,
            Err(rejection) => {
                debug!(reason = %rejection, "legacy token rejected");
                return AuthResult::failure(INVALID_TOKEN);
            }
        };

        let Some(subject) = claims.sub() else {
            return AuthResult::failure("Token missing subject claim");
        };

        let built = AuthContext::builder(AuthType::LegacyJwt)
            .subject_id(SubjectId::parse(subject))
            .subject_name(display_name(&claims))
            .email(claims.str("email").map(str::to_string))
            .permissions(string_set(claims.get("permissions")))
            .roles(string_set(claims.get("roles")))
            .scopes(scope_set(claims.get("scope")))
            .expires_at(claims.expires_at())
            .limit_to_24_hours(flag(claims.get("limit_to_24_hours")))
            .raw_token(token.to_string())
            .build();

        match built {
            Ok(ctx) => AuthResult::Success(ctx),
            Err(e) => {
                debug!(error = %e, "legacy token produced no identity");
                AuthResult::failure(INVALID_TOKEN)
            }
        }
    }
}
