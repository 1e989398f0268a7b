use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Subcommand, ValueEnum};
use nocturne_api::SecretStore;
use nocturne_auth::{JwtIssuer, JwtPolicy, is_jwt_shaped, peek_claims};
use nocturne_core::{AuthConfig, resolve_legacy_secret, resolve_signing_secret};
use serde_json::{Map, Value};

use crate::pout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TokenKind {
    /// Self-issued OAuth access token (bearer, carries scope/client_id)
    Oauth,
    /// Legacy API token signed with the shared API secret
    Legacy,
    /// Session access token, as carried in the access-token cookie
    Session,
}

#[derive(Debug, Subcommand)]
pub enum TokenCommands {
    /// Sign a token with the configured secret for its scheme
    Mint {
        #[arg(long, value_enum)]
        kind: TokenKind,
        #[arg(long)]
        sub: String,
        #[arg(long)]
        name: Option<String>,
        /// Space-separated scopes
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        client_id: Option<String>,
        /// Comma-separated permissions
        #[arg(long)]
        permissions: Option<String>,
        /// Comma-separated roles
        #[arg(long)]
        roles: Option<String>,
        /// Lifetime (e.g. "90s", "30m", "2h")
        #[arg(long, default_value = "30m")]
        ttl: String,
    },
    /// Structural check and unverified claim dump
    Inspect { token: String },
}

pub fn run(
    command: TokenCommands,
    cfg: &AuthConfig,
    secrets: &dyn SecretStore,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        TokenCommands::Mint {
            kind,
            sub,
            name,
            scope,
            client_id,
            permissions,
            roles,
            ttl,
        } => {
            let ttl = Duration::from_secs(parse_ttl(&ttl)?);
            let claims = mint_claims(kind, MintFields {
                sub,
                name,
                scope,
                client_id,
                permissions,
                roles,
            })?;
            let token = issuer_for(kind, cfg, secrets)?.mint(claims, ttl)?;
            pout(
                json,
                serde_json::json!({"kind": kind_str(kind), "token": token, "expires_in": ttl.as_secs()}),
                &token,
            )
        }
        TokenCommands::Inspect { token } => inspect(&token, json),
    }
}

struct MintFields {
    sub: String,
    name: Option<String>,
    scope: Option<String>,
    client_id: Option<String>,
    permissions: Option<String>,
    roles: Option<String>,
}

fn kind_str(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Oauth => "oauth",
        TokenKind::Legacy => "legacy",
        TokenKind::Session => "session",
    }
}

fn issuer_for(
    kind: TokenKind,
    cfg: &AuthConfig,
    secrets: &dyn SecretStore,
) -> anyhow::Result<JwtIssuer> {
    let issuer = match kind {
        TokenKind::Legacy => {
            let secret = resolve_legacy_secret(&cfg.legacy_jwt, secrets).with_context(|| {
                format!(
                    "no legacy secret: set one of {} or legacy_jwt.secret",
                    cfg.legacy_jwt.secret_env.join(", ")
                )
            })?;
            JwtIssuer::hs256(&secret, &JwtPolicy::default())?
        }
        TokenKind::Oauth | TokenKind::Session => {
            let secret = resolve_signing_secret(&cfg.jwt, secrets)
                .context("no signing secret: set jwt.secret_ref or jwt.secret")?;
            let policy = JwtPolicy {
                issuer: cfg.jwt.issuer.clone(),
                audience: cfg.jwt.audience.clone(),
                leeway_seconds: cfg.jwt.leeway_seconds,
            };
            JwtIssuer::hs256(&secret, &policy)?
        }
    };
    Ok(issuer)
}

fn mint_claims(kind: TokenKind, fields: MintFields) -> anyhow::Result<Map<String, Value>> {
    if fields.sub.trim().is_empty() {
        bail!("--sub must not be empty");
    }

    let mut claims = Map::new();
    claims.insert("sub".into(), Value::from(fields.sub));
    if let Some(name) = fields.name {
        claims.insert("name".into(), Value::from(name));
    }
    if let Some(permissions) = fields.permissions {
        claims.insert("permissions".into(), Value::from(permissions));
    }
    if let Some(roles) = fields.roles {
        claims.insert("roles".into(), Value::from(roles));
    }

    match kind {
        TokenKind::Oauth => {
            if fields.scope.is_none() && fields.client_id.is_none() {
                bail!("oauth tokens need --scope or --client-id");
            }
            claims.insert("jti".into(), Value::from(uuid::Uuid::new_v4().to_string()));
        }
        TokenKind::Legacy | TokenKind::Session => {
            // These schemes are told apart from OAuth by the absence of both claims.
            if fields.scope.is_some() || fields.client_id.is_some() {
                bail!("--scope and --client-id only apply to oauth tokens");
            }
        }
    }
    if let Some(scope) = fields.scope {
        claims.insert("scope".into(), Value::from(scope));
    }
    if let Some(client_id) = fields.client_id {
        claims.insert("client_id".into(), Value::from(client_id));
    }

    Ok(claims)
}

fn inspect(token: &str, json: bool) -> anyhow::Result<()> {
    let token = token.trim();
    let shaped = is_jwt_shaped(token);
    let claims = peek_claims(token);
    let routed_to = match &claims {
        _ if !shaped => "none (not a JWT)",
        Some(c) if c.contains("scope") || c.contains("client_id") => "oauth_access_token",
        Some(_) => "legacy_jwt",
        None => "none (unreadable payload)",
    };

    let text = match &claims {
        Some(c) => format!(
            "Bearer route: {routed_to} (signature NOT verified)\n{}",
            serde_json::to_string_pretty(c)?
        ),
        None => format!("Bearer route: {routed_to}"),
    };
    pout(
        json,
        serde_json::json!({
            "jwt_shaped": shaped,
            "bearer_route": routed_to,
            "verified": false,
            "claims": claims,
        }),
        &text,
    )
}

fn parse_ttl(ttl: &str) -> anyhow::Result<u64> {
    let s = ttl.trim().to_lowercase();
    let (digits, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c),
        _ => (s.as_str(), 's'),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid TTL: {ttl}"))?;
    let unit_secs: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => bail!("Invalid TTL format: {ttl}. Use e.g. '90s', '30m', '2h'"),
    };
    let secs = n
        .checked_mul(unit_secs)
        .ok_or_else(|| anyhow::anyhow!("TTL too large: {ttl}"))?;
    if secs == 0 {
        bail!("TTL must be positive");
    }
    Ok(secs)
}
