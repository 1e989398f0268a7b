mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use nocturne_api::{
    AuthError, AuthHandler, AuthRequest, AuthResult, AuthType, RevocationCache, SubjectId,
    TokenValidator,
};
use nocturne_auth::{JwtPolicy, JwtValidator};
use nocturne_connectors::InMemoryRevocationCache;
use nocturne_core::RevocationFailurePolicy;
use nocturne_runtime::{HandlerChain, LegacyJwtHandler, OAuthAccessTokenHandler, Resolution};
use secrecy::SecretString;
use serde_json::json;

use common::*;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn service_validator() -> Arc<dyn TokenValidator> {
    Arc::new(JwtValidator::hs256(&SecretString::from(SIGNING_SECRET.to_string()), &policy()).unwrap())
}

fn legacy_handler() -> LegacyJwtHandler {
    LegacyJwtHandler::new(Some(&SecretString::from(LEGACY_SECRET.to_string())), 60)
}

/// Records every handler invocation in order.
struct Recording {
    inner: Arc<dyn AuthHandler>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl AuthHandler for Recording {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    async fn authenticate(&self, request: &mut AuthRequest) -> AuthResult {
        self.log.lock().unwrap().push(self.inner.name().to_string());
        self.inner.authenticate(request).await
    }
}

struct Fixed {
    name: &'static str,
    priority: i32,
    result: fn() -> AuthResult,
}

#[async_trait]
impl AuthHandler for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn authenticate(&self, _request: &mut AuthRequest) -> AuthResult {
        (self.result)()
    }
}

fn recorded(
    handlers: Vec<Arc<dyn AuthHandler>>,
) -> (HandlerChain, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let wrapped = handlers
        .into_iter()
        .map(|inner| {
            Arc::new(Recording {
                inner,
                log: log.clone(),
            }) as Arc<dyn AuthHandler>
        })
        .collect();
    (HandlerChain::new(wrapped), log)
}

struct UnreachableCache;

#[async_trait]
impl RevocationCache for UnreachableCache {
    async fn is_revoked(&self, _jti: &str) -> Result<bool, AuthError> {
        Err(AuthError::Connection("cache unreachable".to_string()))
    }

    async fn revoke(&self, _jti: &str, _until: SystemTime) -> Result<(), AuthError> {
        Err(AuthError::Connection("cache unreachable".to_string()))
    }
}

fn oauth_handler(
    revocations: Arc<dyn RevocationCache>,
    policy: RevocationFailurePolicy,
) -> OAuthAccessTokenHandler {
    OAuthAccessTokenHandler::new(service_validator(), revocations, policy)
}

#[tokio::test]
async fn standard_chain_registers_by_priority() {
    let runtime = runtime(StubSessions::new(RefreshBehaviour::Decline));
    assert_eq!(
        runtime.chain().registrations(),
        vec![
            ("session_cookie".to_string(), 50),
            ("oauth_access_token".to_string(), 150),
            ("legacy_jwt".to_string(), 200),
        ]
    );
}

#[tokio::test]
async fn no_credentials_resolve_to_anonymous_without_cookie_changes() {
    let sessions = StubSessions::new(RefreshBehaviour::Decline);
    let runtime = runtime(sessions.clone());

    let mut req = request(&[]);
    assert!(runtime.resolve(&mut req).await.is_none());
    assert!(req.response_cookies().is_empty());
    assert_eq!(sessions.calls(), 0);

    let mut req = request(&[bearer("not-a-jwt")]);
    assert!(matches!(
        runtime.resolve_outcome(&mut req).await,
        Resolution::Anonymous
    ));
    assert!(req.response_cookies().is_empty());
}

#[tokio::test]
async fn valid_session_cookie_authenticates_without_refresh() {
    let sessions = StubSessions::new(RefreshBehaviour::Decline);
    let runtime = runtime(sessions.clone());
    let access = signed(session_claims("0e7a1c52-0d7b-4c36-9b59-3f1f4f4f2a10"));

    let mut req = request(&[cookies(&[(ACCESS_COOKIE, &access), (REFRESH_COOKIE, "rt-1")])]);
    let ctx = runtime.resolve(&mut req).await.unwrap();

    assert_eq!(ctx.auth_type(), AuthType::SessionCookie);
    assert!(matches!(ctx.subject_id(), Some(SubjectId::Uuid(_))));
    assert_eq!(ctx.subject_name(), Some("Session User"));
    assert_eq!(ctx.roles(), &set(&["readable"]));
    assert_eq!(sessions.calls(), 0);
    assert!(req.response_cookies().is_empty());
}

#[tokio::test]
async fn expired_session_with_valid_refresh_rotates_cookies() {
    let renewed = signed(json!({"sub": "renewed-user", "permissions": "entries.read"}));
    let sessions = StubSessions::new(RefreshBehaviour::Issue { access: renewed });
    let runtime = runtime(sessions.clone());
    let stale = expired(session_claims("stale-user"));

    let mut req = request(&[
        cookies(&[(ACCESS_COOKIE, &stale), (REFRESH_COOKIE, "rt-1")]),
        ("x-forwarded-for", "203.0.113.9, 10.0.0.1".to_string()),
    ]);
    let ctx = runtime.resolve(&mut req).await.unwrap();

    assert_eq!(sessions.calls(), 1);
    assert_eq!(
        *sessions.last_ip.lock().unwrap(),
        Some("203.0.113.9".parse().unwrap())
    );
    assert_eq!(ctx.auth_type(), AuthType::SessionCookie);
    assert_eq!(ctx.subject_id(), SubjectId::parse("renewed-user").as_ref());
    assert!(ctx.has_permission("entries.read"));

    let written = req.response_cookies();
    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|c| !is_removal(c)));

    let refresh = set_cookie_for(written, REFRESH_COOKIE).unwrap();
    assert!(refresh.starts_with(".Nocturne.RefreshToken=rotated-refresh"));
    assert!(refresh.contains("HttpOnly"));

    let flag = set_cookie_for(written, FLAG_COOKIE).unwrap();
    assert!(flag.starts_with("IsAuthenticated=true"));
    assert!(!flag.contains("HttpOnly"));

    let access = set_cookie_for(written, ACCESS_COOKIE).unwrap();
    assert!(access.contains("Expires="));

    // Access cookie follows the issued token; the other two follow the
    // configured refresh lifetime.
    let lifetime = config().cookies.refresh_token_lifetime_seconds;
    let access_max_age = max_age(access).unwrap();
    assert!((895..=900).contains(&access_max_age), "{access_max_age}");
    for cookie in [refresh, flag] {
        let age = max_age(cookie).unwrap();
        assert!((lifetime - 5..=lifetime).contains(&age), "{age}");
        assert!(cookie.contains("Expires="));
    }
}

#[tokio::test]
async fn refreshed_expiry_beyond_cookie_range_fails_softly() {
    let renewed = signed(session_claims("far-future"));
    let sessions = StubSessions::new(RefreshBehaviour::IssueExpiring {
        access: renewed,
        expires_in: Duration::from_secs(300_000_000_000),
    });
    let runtime = runtime(sessions.clone());

    let mut req = request(&[cookies(&[(REFRESH_COOKIE, "rt-4")])]);
    assert!(runtime.resolve(&mut req).await.is_none());

    assert_eq!(sessions.calls(), 1);
    let cleared = req.response_cookies();
    assert_eq!(cleared.len(), 3);
    assert!(cleared.iter().all(|c| is_removal(c)));
}

#[tokio::test]
async fn refresh_cookie_alone_triggers_refresh() {
    let renewed = signed(session_claims("from-refresh"));
    let sessions = StubSessions::new(RefreshBehaviour::Issue { access: renewed });
    let runtime = runtime(sessions.clone());

    let mut req = request(&[cookies(&[(REFRESH_COOKIE, "rt-2")])]);
    let ctx = runtime.resolve(&mut req).await.unwrap();

    assert_eq!(sessions.calls(), 1);
    assert_eq!(ctx.subject_id(), SubjectId::parse("from-refresh").as_ref());
    assert_eq!(req.response_cookies().len(), 3);
}

#[tokio::test]
async fn expired_session_without_refresh_token_clears_cookies() {
    let sessions = StubSessions::new(RefreshBehaviour::Decline);
    let runtime = runtime(sessions.clone());
    let stale = expired(session_claims("stale-user"));

    let mut req = request(&[cookies(&[(ACCESS_COOKIE, &stale)])]);
    assert!(runtime.resolve(&mut req).await.is_none());

    assert_eq!(sessions.calls(), 0);
    let cleared = req.response_cookies();
    assert_eq!(cleared.len(), 3);
    assert!(cleared.iter().all(|c| is_removal(c)));
    for name in [ACCESS_COOKIE, REFRESH_COOKIE, FLAG_COOKIE] {
        let cookie = set_cookie_for(cleared, name).unwrap();
        assert!(cookie.contains("Path=/"));
    }
}

#[tokio::test]
async fn declined_or_failed_refresh_clears_cookies() {
    for behaviour in [RefreshBehaviour::Decline, RefreshBehaviour::Fail] {
        let sessions = StubSessions::new(behaviour);
        let runtime = runtime(sessions.clone());
        let stale = expired(session_claims("stale-user"));

        let mut req = request(&[cookies(&[(ACCESS_COOKIE, &stale), (REFRESH_COOKIE, "revoked")])]);
        assert!(runtime.resolve(&mut req).await.is_none());

        assert_eq!(sessions.calls(), 1);
        assert_eq!(req.response_cookies().len(), 3);
        assert!(req.response_cookies().iter().all(|c| is_removal(c)));
    }
}

#[tokio::test]
async fn refreshed_token_that_fails_validation_writes_no_session() {
    let forged = legacy(session_claims("forged"));
    let sessions = StubSessions::new(RefreshBehaviour::Issue { access: forged });
    let runtime = runtime(sessions.clone());

    let mut req = request(&[cookies(&[(REFRESH_COOKIE, "rt-3")])]);
    assert!(runtime.resolve(&mut req).await.is_none());
    assert_eq!(sessions.calls(), 1);
    assert!(req.response_cookies().iter().all(|c| is_removal(c)));
}

#[tokio::test]
async fn disabled_session_cookies_are_ignored() {
    let mut cfg = config();
    cfg.features.oidc_enabled = false;
    cfg.features.local_identity_enabled = false;
    let sessions = StubSessions::new(RefreshBehaviour::Decline);
    let runtime = runtime_with(&cfg, sessions.clone(), Arc::new(InMemoryRevocationCache::new()));
    let access = signed(session_claims("someone"));

    let mut req = request(&[cookies(&[(ACCESS_COOKIE, &access), (REFRESH_COOKIE, "rt")])]);
    assert!(runtime.resolve(&mut req).await.is_none());
    assert_eq!(sessions.calls(), 0);
    assert!(req.response_cookies().is_empty());
}

#[tokio::test]
async fn oauth_token_short_circuits_before_legacy() {
    let (chain, log) = recorded(vec![
        Arc::new(legacy_handler()),
        Arc::new(oauth_handler(
            Arc::new(InMemoryRevocationCache::new()),
            RevocationFailurePolicy::FailClosed,
        )),
    ]);
    let token = signed(json!({
        "sub": "svc-user",
        "scope": "entries:read entries:write",
        "client_id": "cli-app",
        "jti": "jti-live",
    }));

    let mut req = request(&[bearer(&token)]);
    let ctx = chain.resolve(&mut req).await.unwrap();

    assert_eq!(ctx.auth_type(), AuthType::OAuthAccessToken);
    assert_eq!(ctx.client_id(), Some("cli-app"));
    assert!(ctx.has_scope("entries:write"));
    assert_eq!(*log.lock().unwrap(), vec!["oauth_access_token".to_string()]);
}

#[tokio::test]
async fn revoked_oauth_token_fails() {
    let cache = Arc::new(InMemoryRevocationCache::new());
    cache
        .revoke("jti-revoked", SystemTime::now() + Duration::from_secs(3600))
        .await
        .unwrap();
    let handler = oauth_handler(cache, RevocationFailurePolicy::FailClosed);
    let token = signed(json!({"sub": "u", "scope": "entries:read", "jti": "jti-revoked"}));

    let mut req = request(&[bearer(&token)]);
    match handler.authenticate(&mut req).await {
        AuthResult::Failure(reason) => assert_eq!(reason, "Token has been revoked"),
        other => panic!("expected failure, got {}", other.outcome()),
    }
}

#[tokio::test]
async fn revocation_lookup_errors_follow_policy() {
    let token = signed(json!({"sub": "u", "scope": "entries:read", "jti": "jti-1"}));

    let closed = oauth_handler(Arc::new(UnreachableCache), RevocationFailurePolicy::FailClosed);
    let mut req = request(&[bearer(&token)]);
    assert!(matches!(
        closed.authenticate(&mut req).await,
        AuthResult::Failure(_)
    ));

    let open = oauth_handler(Arc::new(UnreachableCache), RevocationFailurePolicy::FailOpen);
    let mut req = request(&[bearer(&token)]);
    assert!(matches!(
        open.authenticate(&mut req).await,
        AuthResult::Success(_)
    ));
}

#[tokio::test]
async fn invalid_oauth_token_fails_with_validation_message() {
    let mut tampered = signed(json!({"sub": "u", "scope": "entries:read"}));
    tampered.push('x');
    let handler = oauth_handler(
        Arc::new(InMemoryRevocationCache::new()),
        RevocationFailurePolicy::FailClosed,
    );

    let mut req = request(&[bearer(&tampered)]);
    match handler.authenticate(&mut req).await {
        AuthResult::Failure(reason) => assert!(!reason.is_empty()),
        other => panic!("expected failure, got {}", other.outcome()),
    }
}

#[tokio::test]
async fn non_jwt_shaped_bearers_are_skipped() {
    let oauth = oauth_handler(
        Arc::new(InMemoryRevocationCache::new()),
        RevocationFailurePolicy::FailClosed,
    );
    let legacy = legacy_handler();

    for token in ["opaque-api-key", "a.b.c.d", "one.dot"] {
        let mut req = request(&[bearer(token)]);
        assert!(oauth.authenticate(&mut req).await.is_skip(), "{token}");
        assert!(legacy.authenticate(&mut req).await.is_skip(), "{token}");
    }
}

#[tokio::test]
async fn legacy_permission_encodings_are_equivalent() {
    let handler = legacy_handler();
    let encodings = [
        json!("a,b,c"),
        json!(" a , b,c "),
        json!(["a", "b", "c"]),
        json!(r#"["a","b","c"]"#),
    ];

    for permissions in encodings {
        let token = legacy(json!({"sub": "legacy-user", "permissions": permissions, "roles": "admin"}));
        let mut req = request(&[bearer(&token)]);
        let AuthResult::Success(ctx) = handler.authenticate(&mut req).await else {
            panic!("legacy token should authenticate");
        };
        assert_eq!(ctx.auth_type(), AuthType::LegacyJwt);
        assert_eq!(ctx.permissions(), &set(&["a", "b", "c"]));
        assert_eq!(ctx.roles(), &set(&["admin"]));
    }
}

#[tokio::test]
async fn legacy_token_failures() {
    let handler = legacy_handler();

    let no_subject = legacy(json!({"permissions": "a"}));
    let mut req = request(&[bearer(&no_subject)]);
    match handler.authenticate(&mut req).await {
        AuthResult::Failure(reason) => assert_eq!(reason, "Token missing subject claim"),
        other => panic!("expected failure, got {}", other.outcome()),
    }

    let wrong_key = signed(json!({"sub": "u"}));
    let mut req = request(&[bearer(&wrong_key)]);
    match handler.authenticate(&mut req).await {
        AuthResult::Failure(reason) => assert_eq!(reason, "Invalid token"),
        other => panic!("expected failure, got {}", other.outcome()),
    }
}

#[tokio::test]
async fn legacy_handler_without_secret_always_skips() {
    let handler = LegacyJwtHandler::new(None, 60);
    assert!(!handler.is_enabled());

    let token = legacy(json!({"sub": "u"}));
    let mut req = request(&[bearer(&token)]);
    assert!(handler.authenticate(&mut req).await.is_skip());
}

#[tokio::test]
async fn skips_fall_through_until_a_failure() {
    let (chain, log) = recorded(vec![
        Arc::new(Fixed {
            name: "last",
            priority: 200,
            result: || AuthResult::failure("bad"),
        }),
        Arc::new(Fixed {
            name: "first",
            priority: 50,
            result: || AuthResult::Skip,
        }),
        Arc::new(Fixed {
            name: "middle",
            priority: 150,
            result: || AuthResult::Skip,
        }),
    ]);

    let mut req = request(&[]);
    assert!(chain.resolve(&mut req).await.is_none());
    assert_eq!(*log.lock().unwrap(), vec!["first", "middle", "last"]);

    let mut req = request(&[]);
    match chain.resolve_outcome(&mut req).await {
        Resolution::Rejected { handler, reason } => {
            assert_eq!(handler, "last");
            assert_eq!(reason, "bad");
        }
        _ => panic!("expected rejected resolution"),
    }
}

#[tokio::test]
async fn failure_halts_the_chain() {
    let (chain, log) = recorded(vec![
        Arc::new(Fixed {
            name: "rejecting",
            priority: 50,
            result: || AuthResult::failure("revoked"),
        }),
        Arc::new(Fixed {
            name: "accepting",
            priority: 150,
            result: || {
                AuthResult::Success(
                    nocturne_api::AuthContext::builder(AuthType::LegacyJwt)
                        .subject_id(SubjectId::parse("never"))
                        .build()
                        .unwrap(),
                )
            },
        }),
    ]);

    let mut req = request(&[]);
    assert!(chain.resolve(&mut req).await.is_none());
    assert_eq!(*log.lock().unwrap(), vec!["rejecting"]);
}

#[tokio::test]
async fn equal_priorities_keep_registration_order() {
    let (chain, log) = recorded(vec![
        Arc::new(Fixed {
            name: "registered-first",
            priority: 100,
            result: || AuthResult::Skip,
        }),
        Arc::new(Fixed {
            name: "registered-second",
            priority: 100,
            result: || AuthResult::Skip,
        }),
    ]);

    let mut req = request(&[]);
    assert!(chain.resolve(&mut req).await.is_none());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["registered-first", "registered-second"]
    );
}

#[tokio::test]
async fn dead_session_cookie_yields_to_bearer_token() {
    let sessions = StubSessions::new(RefreshBehaviour::Decline);
    let runtime = runtime(sessions.clone());
    let stale = expired(session_claims("stale-user"));
    let token = legacy(json!({"sub": "api-user"}));

    let mut req = request(&[cookies(&[(ACCESS_COOKIE, &stale)]), bearer(&token)]);
    let ctx = runtime.resolve(&mut req).await.unwrap();

    assert_eq!(ctx.auth_type(), AuthType::LegacyJwt);
    assert_eq!(ctx.subject_id(), SubjectId::parse("api-user").as_ref());
    assert!(req.response_cookies().iter().all(|c| is_removal(c)));
}

#[tokio::test]
async fn missing_signing_secret_is_a_config_error() {
    let err = nocturne_runtime::AuthRuntime::from_config(
        &config(),
        &nocturne_connectors::MapSecretStore::new(),
        Arc::new(InMemoryRevocationCache::new()),
        StubSessions::new(RefreshBehaviour::Decline),
    )
    .unwrap_err();
    assert!(matches!(err, AuthError::Config(_)));
}

#[test]
fn validator_policy_rejects_foreign_issuer() {
    let foreign = JwtPolicy {
        issuer: Some("someone-else".to_string()),
        ..policy()
    };
    let token = nocturne_auth::JwtIssuer::hs256(&SecretString::from(SIGNING_SECRET.to_string()), &foreign)
        .unwrap()
        .mint(object(json!({"sub": "u", "scope": "x"})), Duration::from_secs(60))
        .unwrap();
    assert!(service_validator().validate_access_token(&token).is_err());
}
