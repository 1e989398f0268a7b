//! nocturne-runtime
//!
//! Assembles the credential handlers into a [`HandlerChain`], runs it per
//! request, and applies the [`LockdownGate`] to the outcome.
//!
//! Handlers run one after another inside the request's own task. Dropping the
//! resolving future cancels any in-flight refresh or revocation lookup.

#![forbid(unsafe_code)]

mod chain;
pub mod handlers;
mod lockdown;
pub mod middleware;
mod refresh;

use std::sync::Arc;

use nocturne_api::{
    AuthContext, AuthError, AuthHandler, AuthRequest, RevocationCache, SecretStore,
    SessionService, TokenValidator,
};
use nocturne_auth::{JwtPolicy, JwtValidator};
use nocturne_core::{AuthConfig, resolve_legacy_secret, resolve_signing_secret, validate_config};

pub use chain::{HandlerChain, Resolution};
pub use handlers::{LegacyJwtHandler, OAuthAccessTokenHandler, SessionCookieHandler};
pub use lockdown::{GateDecision, LockdownGate, UnauthorizedBody};
pub use middleware::{CurrentUser, MaybeUser, auth_middleware};
pub use refresh::{SessionCookies, SessionRefresher};

/// Request authentication for one service: the handler chain plus the gate.
#[derive(Debug, Clone)]
pub struct AuthRuntime {
    chain: HandlerChain,
    gate: LockdownGate,
}

impl AuthRuntime {
    #[must_use]
    pub fn new(chain: HandlerChain, gate: LockdownGate) -> Self {
        Self { chain, gate }
    }

    /// Build the standard chain (session cookie, OAuth, legacy JWT) from
    /// configuration and collaborators.
    pub fn from_config(
        cfg: &AuthConfig,
        secrets: &dyn SecretStore,
        revocations: Arc<dyn RevocationCache>,
        sessions: Arc<dyn SessionService>,
    ) -> Result<Self, AuthError> {
        validate_config(cfg)?;

        let signing_secret = resolve_signing_secret(&cfg.jwt, secrets).ok_or_else(|| {
            AuthError::Config(
                "no JWT signing secret: set jwt.secret_ref or jwt.secret".to_string(),
            )
        })?;
        let policy = JwtPolicy {
            issuer: cfg.jwt.issuer.clone(),
            audience: cfg.jwt.audience.clone(),
            leeway_seconds: cfg.jwt.leeway_seconds,
        };
        let validator: Arc<dyn TokenValidator> = Arc::new(
            JwtValidator::hs256(&signing_secret, &policy)
                .map_err(|e| AuthError::Config(e.to_string()))?,
        );

        let refresher = SessionRefresher::new(
            sessions,
            validator.clone(),
            SessionCookies::new(cfg.cookies.clone()),
        );

        let legacy_secret = resolve_legacy_secret(&cfg.legacy_jwt, secrets);

        let handlers: Vec<Arc<dyn AuthHandler>> = vec![
            Arc::new(SessionCookieHandler::new(
                cfg.features.session_cookies_enabled(),
                validator.clone(),
                refresher,
            )),
            Arc::new(OAuthAccessTokenHandler::new(
                validator,
                revocations,
                cfg.revocation.on_error,
            )),
            Arc::new(LegacyJwtHandler::new(
                legacy_secret.as_ref(),
                cfg.jwt.leeway_seconds,
            )),
        ];

        let chain = HandlerChain::new(handlers);
        tracing::info!(handlers = ?chain.registrations(), "auth handler chain ready");

        Ok(Self::new(chain, LockdownGate::from_config(&cfg.lockdown)))
    }

    #[must_use]
    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    #[must_use]
    pub fn gate(&self) -> &LockdownGate {
        &self.gate
    }

    pub async fn resolve(&self, request: &mut AuthRequest) -> Option<AuthContext> {
        self.chain.resolve(request).await
    }

    pub async fn resolve_outcome(&self, request: &mut AuthRequest) -> Resolution {
        self.chain.resolve_outcome(request).await
    }
}
