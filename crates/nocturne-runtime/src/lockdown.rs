use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use nocturne_core::LockdownConfig;
use serde::{Deserialize, Serialize};

use crate::chain::Resolution;

/// JSON body of a 401 from the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnauthorizedBody {
    pub error: String,
    pub error_description: String,
}

impl UnauthorizedBody {
    #[must_use]
    pub fn authentication_required() -> Self {
        Self {
            error: "authentication_required".to_string(),
            error_description: "Authentication is required to access this resource".to_string(),
        }
    }
}

impl IntoResponse for UnauthorizedBody {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Reject(UnauthorizedBody),
}

/// Request-level admission policy applied after resolution.
#[derive(Debug, Clone, Default)]
pub struct LockdownGate {
    enabled: bool,
    reject_on_credential_failure: bool,
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl LockdownGate {
    #[must_use]
    pub fn from_config(cfg: &LockdownConfig) -> Self {
        let mut exact = Vec::new();
        let mut prefixes = Vec::new();
        for path in &cfg.public_paths {
            match path.strip_suffix('*') {
                Some(prefix) => prefixes.push(prefix.to_string()),
                None => exact.push(normalize(path).to_string()),
            }
        }
        Self {
            enabled: cfg.enabled,
            reject_on_credential_failure: cfg.reject_on_credential_failure,
            exact,
            prefixes,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `/api/auth/*` covers `/api/auth` itself as well as everything below it.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        let normalized = normalize(path);
        self.exact.iter().any(|p| p == normalized)
            || self
                .prefixes
                .iter()
                .any(|p| path.starts_with(p.as_str()) || normalize(p) == normalized)
    }

    /// The body never says which credential was tried or why it failed.
    #[must_use]
    pub fn evaluate(&self, path: &str, resolution: &Resolution) -> GateDecision {
        match resolution {
            Resolution::Authenticated(_) => GateDecision::Admit,
            Resolution::Rejected { .. } if self.reject_on_credential_failure => {
                GateDecision::Reject(UnauthorizedBody::authentication_required())
            }
            _ if !self.enabled || self.is_public(path) => GateDecision::Admit,
            _ => GateDecision::Reject(UnauthorizedBody::authentication_required()),
        }
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
