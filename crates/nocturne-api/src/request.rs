use std::net::{IpAddr, SocketAddr};

use http::HeaderMap;
use http::header::{AUTHORIZATION, COOKIE, USER_AGENT};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// The parts of an inbound request that credential handlers look at, plus the
/// `Set-Cookie` values they queue for the response.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    headers: HeaderMap,
    path: String,
    peer_addr: Option<SocketAddr>,
    response_cookies: Vec<String>,
}

impl AuthRequest {
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            path: "/".to_string(),
            peer_addr: None,
            response_cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_peer_addr(mut self, peer_addr: Option<SocketAddr>) -> Self {
        self.peer_addr = peer_addr;
        self
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Token from an `Authorization: Bearer <token>` header.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Value of the named request cookie, across every `Cookie` header.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
            .filter(|v| !v.is_empty())
    }

    /// First `X-Forwarded-For` entry, else the socket peer address.
    #[must_use]
    pub fn client_ip(&self) -> Option<IpAddr> {
        let forwarded = self
            .header(FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        forwarded.or_else(|| self.peer_addr.map(|addr| addr.ip()))
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    /// Queue a `Set-Cookie` header value for the response.
    pub fn set_cookie(&mut self, header_value: String) {
        self.response_cookies.push(header_value);
    }

    #[must_use]
    pub fn response_cookies(&self) -> &[String] {
        &self.response_cookies
    }

    pub fn take_response_cookies(&mut self) -> Vec<String> {
        std::mem::take(&mut self.response_cookies)
    }
}
