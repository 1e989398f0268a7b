//! Cookie helpers.

use crate::{Error, Result};
use httpdate::fmt_http_date;
use nocturne_api::SameSite;
use std::time::{SystemTime, UNIX_EPOCH};

/// Attributes of one `Set-Cookie` header.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Cookie name.
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Optional cookie domain.
    pub domain: Option<String>,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to JS.
    pub http_only: bool,

    /// SameSite attribute.
    pub same_site: SameSite,

    /// Absolute expiry. `None` makes a browser-session cookie.
    pub expires: Option<SystemTime>,
}

impl CookieOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            expires: None,
        }
    }
}

fn check(opts: &CookieOptions) -> Result<()> {
    if opts.name.is_empty() || opts.name.contains(['=', ';', ' ']) {
        return Err(Error::InvalidCookie(format!(
            "invalid cookie name {:?}",
            opts.name
        )));
    }
    if opts.same_site == SameSite::None && !opts.secure {
        return Err(Error::InvalidCookie(
            "SameSite=None cookies must be Secure".to_string(),
        ));
    }
    Ok(())
}

/// 9999-12-31T23:59:59Z, the last instant an HTTP date can carry.
const LAST_HTTP_DATE_SECS: u64 = 253_402_300_799;

fn http_date(at: SystemTime) -> Result<String> {
    match at.duration_since(UNIX_EPOCH) {
        Ok(since) if since.as_secs() <= LAST_HTTP_DATE_SECS => Ok(fmt_http_date(at)),
        _ => Err(Error::InvalidCookie(
            "cookie expiry outside the HTTP date range".to_string(),
        )),
    }
}

fn attributes(parts: &mut Vec<String>, opts: &CookieOptions) {
    parts.push(format!("Path={}", opts.path));

    if let Some(domain) = &opts.domain {
        parts.push(format!("Domain={domain}"));
    }

    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }

    parts.push(format!("SameSite={}", opts.same_site.as_str()));
}

/// Build a `Set-Cookie` header value.
pub fn build_set_cookie(value: &str, opts: &CookieOptions) -> Result<String> {
    check(opts)?;
    if value.contains([';', ',', ' ', '"']) {
        return Err(Error::InvalidCookie(format!(
            "value of {} contains reserved characters",
            opts.name
        )));
    }

    let mut parts: Vec<String> = vec![format!("{}={value}", opts.name)];
    attributes(&mut parts, opts);

    if let Some(expires) = opts.expires {
        let expires_header = http_date(expires)?;
        let max_age = expires
            .duration_since(SystemTime::now())
            .map_or(0, |d| d.as_secs());
        parts.push(format!("Max-Age={max_age}"));
        // Expires for older clients.
        parts.push(format!("Expires={expires_header}"));
    }

    Ok(parts.join("; "))
}

/// Build a `Set-Cookie` header value that clears the cookie.
///
/// Browsers only drop a cookie when Path and Domain match the ones it was set
/// with, so callers pass the same options they set it with.
pub fn build_clear_cookie(opts: &CookieOptions) -> Result<String> {
    check(opts)?;

    let mut parts: Vec<String> = vec![format!("{}=", opts.name)];
    attributes(&mut parts, opts);
    parts.push("Max-Age=0".to_string());
    parts.push(format!("Expires={}", fmt_http_date(UNIX_EPOCH)));

    Ok(parts.join("; "))
}
