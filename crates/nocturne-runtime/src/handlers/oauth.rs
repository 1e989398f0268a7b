use std::sync::Arc;

use async_trait::async_trait;
use nocturne_api::{AuthHandler, AuthRequest, AuthResult, AuthType, RevocationCache, TokenValidator};
use nocturne_auth::claims::context_from_claims;
use nocturne_auth::{is_jwt_shaped, peek_claims};
use nocturne_core::RevocationFailurePolicy;
use tracing::{debug, warn};

use super::OAUTH_ACCESS_TOKEN_PRIORITY;

/// Self-issued OAuth bearer tokens, recognised by a `scope` or `client_id`
/// claim and checked against the revocation cache.
pub struct OAuthAccessTokenHandler {
    validator: Arc<dyn TokenValidator>,
    revocations: Arc<dyn RevocationCache>,
    on_revocation_error: RevocationFailurePolicy,
}

impl OAuthAccessTokenHandler {
    #[must_use]
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        revocations: Arc<dyn RevocationCache>,
        on_revocation_error: RevocationFailurePolicy,
    ) -> Self {
        Self {
            validator,
            revocations,
            on_revocation_error,
        }
    }
}

#[async_trait]
impl AuthHandler for OAuthAccessTokenHandler {
    fn name(&self) -> &str {
        "oauth_access_token"
    }

    fn priority(&self) -> i32 {
        OAUTH_ACCESS_TOKEN_PRIORITY
    }

    async fn authenticate(&self, request: &mut AuthRequest) -> AuthResult {
        let Some(token) = request.bearer_token() else {
            return AuthResult::Skip;
        };
        if !is_jwt_shaped(token) {
            return AuthResult::Skip;
        }

        // Routing only: the trust decision is the full validation below.
        let is_oauth = peek_claims(token)
            .is_some_and(|claims| claims.contains("scope") || claims.contains("client_id"));
        if !is_oauth {
            return AuthResult::Skip;
        }

        let claims = match self.validator.validate_access_token(token) {
            Ok(claims) => claims,
            Err(rejection) => return AuthResult::Failure(rejection.message),
        };

        if let Some(jti) = claims.jti() {
            match self.revocations.is_revoked(jti).await {
                Ok(true) => return AuthResult::failure("Token has been revoked"),
                Ok(false) => {}
                Err(e) => match self.on_revocation_error {
                    RevocationFailurePolicy::FailClosed => {
                        warn!(error = %e, "revocation lookup failed, rejecting token");
                        return AuthResult::failure("Token status could not be verified");
                    }
                    RevocationFailurePolicy::FailOpen => {
                        warn!(error = %e, "revocation lookup failed, accepting token");
                    }
                },
            }
        } else {
            debug!("OAuth token has no jti, revocation check skipped");
        }

        match context_from_claims(AuthType::OAuthAccessToken, &claims, token) {
            Ok(ctx) => AuthResult::Success(ctx),
            Err(e) => AuthResult::Failure(e.to_string()),
        }
    }
}
