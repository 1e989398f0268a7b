use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Args;
use http::header::{AUTHORIZATION, COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use nocturne_api::{AuthRequest, SecretStore};
use nocturne_connectors::{HttpSessionService, InMemoryRevocationCache};
use nocturne_core::AuthConfig;
use nocturne_runtime::{AuthRuntime, GateDecision, Resolution};

use crate::{parse_key_val, pout};

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Bearer token for the Authorization header
    #[arg(long)]
    bearer: Option<String>,
    /// Request cookie, NAME=VALUE (repeatable)
    #[arg(long = "cookie", value_parser = parse_key_val)]
    cookies: Vec<(String, String)>,
    #[arg(long, default_value = "/")]
    path: String,
    /// Client address, as if received from the peer
    #[arg(long)]
    ip: Option<IpAddr>,
    #[arg(long)]
    user_agent: Option<String>,
}

fn build_request(args: &ResolveArgs) -> anyhow::Result<AuthRequest> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &args.bearer {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    if !args.cookies.is_empty() {
        let cookie = args
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert(COOKIE, HeaderValue::from_str(&cookie)?);
    }
    if let Some(ua) = &args.user_agent {
        headers.insert(USER_AGENT, HeaderValue::from_str(ua)?);
    }

    Ok(AuthRequest::new(headers)
        .with_path(args.path.clone())
        .with_peer_addr(args.ip.map(|ip| SocketAddr::new(ip, 0))))
}

pub async fn run(
    args: ResolveArgs,
    cfg: &AuthConfig,
    secrets: &dyn SecretStore,
    json: bool,
) -> anyhow::Result<()> {
    let sessions = Arc::new(HttpSessionService::from_config(&cfg.session)?);
    let runtime = AuthRuntime::from_config(
        cfg,
        secrets,
        Arc::new(InMemoryRevocationCache::new()),
        sessions,
    )?;

    let mut request = build_request(&args)?;
    let resolution = runtime.resolve_outcome(&mut request).await;
    let decision = runtime.gate().evaluate(request.path(), &resolution);
    let set_cookies = request.take_response_cookies();

    let (outcome, identity, mut text) = match &resolution {
        Resolution::Authenticated(ctx) => (
            "authenticated",
            serde_json::to_value(ctx)?,
            format!(
                "Authenticated via {} as {}",
                ctx.auth_type(),
                ctx.subject_id().map(ToString::to_string).unwrap_or_default()
            ),
        ),
        Resolution::Anonymous => ("anonymous", serde_json::Value::Null, "Anonymous".to_string()),
        Resolution::Rejected { handler, reason } => (
            "rejected",
            serde_json::Value::Null,
            format!("Rejected by {handler}: {reason}"),
        ),
    };
    let (admitted, gate_body) = match &decision {
        GateDecision::Admit => (true, serde_json::Value::Null),
        GateDecision::Reject(body) => (false, serde_json::to_value(body)?),
    };

    text.push_str(if admitted {
        "\nGate: admit"
    } else {
        "\nGate: 401 authentication_required"
    });
    for cookie in &set_cookies {
        text.push_str("\nSet-Cookie: ");
        text.push_str(cookie);
    }

    let rejected_by = match &resolution {
        Resolution::Rejected { handler, reason } => {
            serde_json::json!({"handler": handler, "reason": reason})
        }
        _ => serde_json::Value::Null,
    };

    pout(
        json,
        serde_json::json!({
            "outcome": outcome,
            "context": identity,
            "rejected": rejected_by,
            "gate": {"admitted": admitted, "body": gate_body},
            "set_cookies": set_cookies,
        }),
        &text,
    )
}
