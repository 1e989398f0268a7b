use std::sync::Arc;

use async_trait::async_trait;
use nocturne_api::{AuthHandler, AuthRequest, AuthResult, AuthType, TokenValidator};
use nocturne_auth::claims::context_from_claims;
use tracing::debug;

use super::SESSION_COOKIE_PRIORITY;
use crate::refresh::SessionRefresher;

/// Browser session carried in an access-token cookie, with a refresh-token
/// cookie to renew it.
///
/// Never returns `Failure`: a dead session clears its cookies and skips, so a
/// bearer token on the same request still gets its turn.
pub struct SessionCookieHandler {
    enabled: bool,
    validator: Arc<dyn TokenValidator>,
    refresher: SessionRefresher,
}

impl SessionCookieHandler {
    #[must_use]
    pub fn new(
        enabled: bool,
        validator: Arc<dyn TokenValidator>,
        refresher: SessionRefresher,
    ) -> Self {
        Self {
            enabled,
            validator,
            refresher,
        }
    }

    async fn refresh_or_skip(&self, request: &mut AuthRequest, refresh_token: &str) -> AuthResult {
        match self.refresher.refresh(request, refresh_token).await {
            Some(ctx) => AuthResult::Success(ctx),
            None => AuthResult::Skip,
        }
    }
}

#[async_trait]
impl AuthHandler for SessionCookieHandler {
    fn name(&self) -> &str {
        "session_cookie"
    }

    fn priority(&self) -> i32 {
        SESSION_COOKIE_PRIORITY
    }

    async fn authenticate(&self, request: &mut AuthRequest) -> AuthResult {
        if !self.enabled {
            return AuthResult::Skip;
        }

        let cookies = self.refresher.cookies();
        let access = request.cookie(cookies.access_name()).map(str::to_string);
        let refresh = request.cookie(cookies.refresh_name()).map(str::to_string);

        let Some(access) = access else {
            return match refresh {
                Some(refresh) => {
                    debug!("no access cookie, refreshing session");
                    self.refresh_or_skip(request, &refresh).await
                }
                None => AuthResult::Skip,
            };
        };

        let invalid = match self.validator.validate_access_token(&access) {
            Ok(claims) => match context_from_claims(AuthType::SessionCookie, &claims, &access) {
                Ok(ctx) => return AuthResult::Success(ctx),
                Err(e) => e.to_string(),
            },
            Err(rejection) => rejection.to_string(),
        };
        debug!(reason = %invalid, "session access cookie not usable");

        match refresh {
            Some(refresh) => self.refresh_or_skip(request, &refresh).await,
            None => {
                self.refresher.cookies().clear(request);
                AuthResult::Skip
            }
        }
    }
}
