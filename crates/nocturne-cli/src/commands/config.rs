use clap::Subcommand;
use nocturne_api::SecretStore;
use nocturne_core::{resolve_legacy_secret, resolve_signing_secret, validate_config};

use crate::{Loaded, pout};

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate auth.toml and report which handlers would be active
    Check,
}

pub fn run(
    command: ConfigCommands,
    loaded: &Loaded,
    secrets: &dyn SecretStore,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Check => check(loaded, secrets, json),
    }
}

fn check(loaded: &Loaded, secrets: &dyn SecretStore, json: bool) -> anyhow::Result<()> {
    let cfg = &loaded.config;
    validate_config(cfg)?;

    let signing = resolve_signing_secret(&cfg.jwt, secrets).is_some();
    let legacy = resolve_legacy_secret(&cfg.legacy_jwt, secrets).is_some();
    let sessions = cfg.features.session_cookies_enabled();
    let source = loaded
        .source
        .as_ref()
        .map_or_else(|| "built-in defaults".to_string(), |p| p.display().to_string());

    let mut problems = Vec::new();
    if !signing {
        problems.push(format!(
            "no signing secret: set {} or jwt.secret",
            cfg.jwt.secret_ref.as_deref().unwrap_or("jwt.secret_ref")
        ));
    }

    let mut text = format!("Config: {source}\n");
    text.push_str(&format!(
        "  session_cookie      (50)  {}\n",
        active(sessions && signing)
    ));
    text.push_str(&format!("  oauth_access_token  (150) {}\n", active(signing)));
    text.push_str(&format!("  legacy_jwt          (200) {}\n", active(legacy)));
    text.push_str(&format!(
        "  lockdown            {}",
        if cfg.lockdown.enabled { "enabled" } else { "disabled" }
    ));
    for problem in &problems {
        text.push_str(&format!("\n  ! {problem}"));
    }

    pout(
        json,
        serde_json::json!({
            "source": source,
            "valid": problems.is_empty(),
            "problems": problems,
            "handlers": {
                "session_cookie": sessions && signing,
                "oauth_access_token": signing,
                "legacy_jwt": legacy,
            },
            "lockdown": {
                "enabled": cfg.lockdown.enabled,
                "public_paths": cfg.lockdown.public_paths,
                "reject_on_credential_failure": cfg.lockdown.reject_on_credential_failure,
            },
            "revocation_on_error": cfg.revocation.on_error,
        }),
        &text,
    )?;

    if problems.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("configuration is not usable")
    }
}

fn active(on: bool) -> &'static str {
    if on { "active" } else { "disabled" }
}
