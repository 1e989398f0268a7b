//! Axum integration: a middleware that resolves identity and applies the
//! lockdown gate, and extractors for the resolved identity.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use nocturne_api::{AuthContext, AuthRequest};
use tracing::{debug, warn};

use crate::AuthRuntime;
use crate::lockdown::{GateDecision, UnauthorizedBody};

/// Use with `axum::middleware::from_fn_with_state(runtime, auth_middleware)`.
///
/// The `AuthContext` is inserted into request extensions only after the
/// chain finished; a cancelled request never carries a partial identity.
pub async fn auth_middleware(
    State(runtime): State<Arc<AuthRuntime>>,
    request: Request,
    next: Next,
) -> Response {
    if is_preflight_request(request.method(), request.headers()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut auth_request = AuthRequest::new(parts.headers.clone())
        .with_path(parts.uri.path())
        .with_peer_addr(peer);
    let resolution = runtime.resolve_outcome(&mut auth_request).await;
    let cookies = auth_request.take_response_cookies();

    if let GateDecision::Reject(body) = runtime.gate().evaluate(parts.uri.path(), &resolution) {
        debug!(path = %parts.uri.path(), "request refused by lockdown gate");
        let mut response = body.into_response();
        append_set_cookies(response.headers_mut(), cookies);
        return response;
    }

    if let Some(ctx) = resolution.into_context() {
        parts.extensions.insert(ctx);
    }

    let mut response = next.run(Request::from_parts(parts, body)).await;
    append_set_cookies(response.headers_mut(), cookies);
    response
}

fn append_set_cookies(headers: &mut HeaderMap, cookies: Vec<String>) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "dropping unencodable Set-Cookie header"),
        }
    }
}

/// OPTIONS with Origin and Access-Control-Request-Method.
fn is_preflight_request(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers.contains_key(header::ORIGIN)
        && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Authenticated caller; rejects with 401 when none was resolved.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = UnauthorizedBody;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(UnauthorizedBody::authentication_required)
    }
}

/// Caller identity if one was resolved.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthContext>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthContext>().cloned()))
    }
}
