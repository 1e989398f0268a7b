use std::sync::Arc;
use std::time::{Duration, SystemTime};

use nocturne_api::{
    AuthContext, AuthRequest, AuthType, SessionService, TokenPair, TokenValidator,
};
use nocturne_auth::claims::context_from_claims;
use nocturne_auth::{CookieOptions, build_clear_cookie, build_set_cookie};
use nocturne_core::CookieConfig;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

/// Writes and clears the three session cookies with one set of attributes.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    cfg: CookieConfig,
}

impl SessionCookies {
    #[must_use]
    pub fn new(cfg: CookieConfig) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub fn access_name(&self) -> &str {
        &self.cfg.access_token_name
    }

    #[must_use]
    pub fn refresh_name(&self) -> &str {
        &self.cfg.refresh_token_name
    }

    fn options(&self, name: &str, http_only: bool, expires: Option<SystemTime>) -> CookieOptions {
        CookieOptions {
            name: name.to_string(),
            path: self.cfg.path.clone(),
            domain: self.cfg.domain.clone(),
            secure: self.cfg.secure,
            http_only,
            same_site: self.cfg.same_site,
            expires,
        }
    }

    /// Queue the access, refresh and indicator cookies for `pair`.
    ///
    /// The refresh cookie is HttpOnly whatever the configuration says; the
    /// indicator cookie never is.
    pub fn write_session(
        &self,
        request: &mut AuthRequest,
        pair: &TokenPair,
    ) -> nocturne_auth::Result<()> {
        let refresh_expires = SystemTime::now()
            .checked_add(Duration::from_secs(self.cfg.refresh_token_lifetime_seconds))
            .ok_or_else(|| {
                nocturne_auth::Error::InvalidCookie(
                    "refresh token lifetime out of range".to_string(),
                )
            })?;

        let access = build_set_cookie(
            pair.access_token.expose_secret(),
            &self.options(
                &self.cfg.access_token_name,
                self.cfg.http_only,
                Some(pair.access_expires_at),
            ),
        )?;
        let refresh = build_set_cookie(
            pair.refresh_token.expose_secret(),
            &self.options(&self.cfg.refresh_token_name, true, Some(refresh_expires)),
        )?;
        let flag = build_set_cookie(
            "true",
            &self.options(&self.cfg.is_authenticated_name, false, Some(refresh_expires)),
        )?;

        request.set_cookie(access);
        request.set_cookie(refresh);
        request.set_cookie(flag);
        Ok(())
    }

    /// Queue removal of all three cookies, using the attributes they were
    /// set with.
    pub fn clear(&self, request: &mut AuthRequest) {
        let targets = [
            (&self.cfg.access_token_name, self.cfg.http_only),
            (&self.cfg.refresh_token_name, true),
            (&self.cfg.is_authenticated_name, false),
        ];
        for (name, http_only) in targets {
            match build_clear_cookie(&self.options(name, http_only, None)) {
                Ok(header) => request.set_cookie(header),
                Err(e) => warn!(cookie = %name, error = %e, "could not build cookie removal"),
            }
        }
    }
}

/// Exchanges a refresh token for a new session.
///
/// Never fails loudly: every problem ends in cleared cookies and `None`.
#[derive(Clone)]
pub struct SessionRefresher {
    service: Arc<dyn SessionService>,
    validator: Arc<dyn TokenValidator>,
    cookies: SessionCookies,
}

impl SessionRefresher {
    #[must_use]
    pub fn new(
        service: Arc<dyn SessionService>,
        validator: Arc<dyn TokenValidator>,
        cookies: SessionCookies,
    ) -> Self {
        Self {
            service,
            validator,
            cookies,
        }
    }

    #[must_use]
    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }

    pub async fn refresh(
        &self,
        request: &mut AuthRequest,
        refresh_token: &str,
    ) -> Option<AuthContext> {
        let ip = request.client_ip();
        let user_agent = request.user_agent().map(str::to_string);

        let pair = match self
            .service
            .refresh_session(refresh_token, ip, user_agent.as_deref())
            .await
        {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                info!("session refresh declined");
                self.cookies.clear(request);
                return None;
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed");
                self.cookies.clear(request);
                return None;
            }
        };

        let access = pair.access_token.expose_secret();
        let ctx = match self.validator.validate_access_token(access) {
            Ok(claims) => context_from_claims(AuthType::SessionCookie, &claims, access),
            Err(rejection) => {
                warn!(reason = %rejection, "refreshed access token failed validation");
                self.cookies.clear(request);
                return None;
            }
        };
        let ctx = match ctx {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "refreshed access token carries no identity");
                self.cookies.clear(request);
                return None;
            }
        };

        if let Err(e) = self.cookies.write_session(request, &pair) {
            warn!(error = %e, "could not write refreshed session cookies");
            self.cookies.clear(request);
            return None;
        }

        debug!("session refreshed");
        Some(ctx)
    }
}
