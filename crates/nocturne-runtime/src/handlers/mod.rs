//! Credential handlers, one per scheme.

mod legacy_jwt;
mod oauth;
mod session_cookie;

pub use legacy_jwt::LegacyJwtHandler;
pub use oauth::OAuthAccessTokenHandler;
pub use session_cookie::SessionCookieHandler;

/// Browser sessions are the common case, so they go first.
pub const SESSION_COOKIE_PRIORITY: i32 = 50;
pub const OAUTH_ACCESS_TOKEN_PRIORITY: i32 = 150;
/// Last: it fails malformed bearer tokens instead of skipping them.
pub const LEGACY_JWT_PRIORITY: i32 = 200;
