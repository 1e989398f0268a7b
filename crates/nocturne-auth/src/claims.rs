//! Claim-set parsing shared by the token handlers.

use std::collections::BTreeSet;

use nocturne_api::{AuthContext, AuthError, AuthType, Claims, SubjectId};
use serde_json::Value;

/// Parse a multi-valued claim such as `roles` or `permissions`.
///
/// Accepts a JSON array, a string holding a JSON array, or a comma-separated
/// string. JSON is tried first; a string that does not parse as a JSON array
/// is split on commas.
pub fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::Array(items)) => collect_strings(items),
        Some(Value::String(s)) => match serde_json::from_str::<Vec<Value>>(s) {
            Ok(items) => collect_strings(&items),
            Err(_) => s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        },
        _ => BTreeSet::new(),
    }
}

/// Parse an OAuth `scope` claim: space-delimited, or an array of scopes.
pub fn scope_set(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => collect_strings(items),
        _ => BTreeSet::new(),
    }
}

/// Boolean claim given either as a JSON bool or as the string `"true"`.
pub fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn collect_strings(items: &[Value]) -> BTreeSet<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Display name from the first of `name`, `unique_name`, `preferred_username`.
pub fn display_name(claims: &Claims) -> Option<String> {
    ["name", "unique_name", "preferred_username"]
        .iter()
        .find_map(|key| claims.str(key))
        .map(str::to_string)
}

/// Build an identity from validated claims.
pub fn context_from_claims(
    auth_type: AuthType,
    claims: &Claims,
    raw_token: &str,
) -> Result<AuthContext, AuthError> {
    AuthContext::builder(auth_type)
        .subject_id(claims.sub().and_then(SubjectId::parse))
        .subject_name(display_name(claims))
        .email(claims.str("email").map(str::to_string))
        .client_id(claims.str("client_id").map(str::to_string))
        .roles(string_set(claims.get("roles")))
        .permissions(string_set(claims.get("permissions")))
        .scopes(scope_set(claims.get("scope")))
        .expires_at(claims.expires_at())
        .limit_to_24_hours(flag(claims.get("limit_to_24_hours")))
        .raw_token(raw_token.to_string())
        .build()
}
