use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthError;

/// Credential scheme that produced an [`AuthContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    SessionCookie,
    #[serde(rename = "oauth_access_token")]
    OAuthAccessToken,
    LegacyJwt,
}

impl AuthType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuthType::SessionCookie => "session_cookie",
            AuthType::OAuthAccessToken => "oauth_access_token",
            AuthType::LegacyJwt => "legacy_jwt",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject identifier taken from a token's `sub` claim.
///
/// UUID-shaped subjects are kept as [`Uuid`]; anything else is carried as an
/// opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    Uuid(Uuid),
    Opaque(String),
}

impl SubjectId {
    /// Parse a raw subject. Blank input yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(match Uuid::parse_str(raw) {
            Ok(id) => SubjectId::Uuid(id),
            Err(_) => SubjectId::Opaque(raw.to_string()),
        })
    }

    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            SubjectId::Uuid(id) => Some(*id),
            SubjectId::Opaque(_) => None,
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Uuid(id) => write!(f, "{id}"),
            SubjectId::Opaque(s) => f.write_str(s),
        }
    }
}

/// Resolved caller identity for a single request.
///
/// Only handlers that authenticated the caller produce one, and only through
/// [`AuthContextBuilder::build`], so a context always names its subject.
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    auth_type: AuthType,
    subject_id: Option<SubjectId>,
    subject_name: Option<String>,
    email: Option<String>,
    client_id: Option<String>,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
    scopes: BTreeSet<String>,
    /// Original credential. Never serialised; `Debug` prints it redacted.
    #[serde(skip)]
    raw_token: Option<SecretString>,
    expires_at: Option<SystemTime>,
    limit_to_24_hours: bool,
}

impl AuthContext {
    #[must_use]
    pub fn builder(auth_type: AuthType) -> AuthContextBuilder {
        AuthContextBuilder {
            auth_type,
            subject_id: None,
            subject_name: None,
            email: None,
            client_id: None,
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            scopes: BTreeSet::new(),
            raw_token: None,
            expires_at: None,
            limit_to_24_hours: false,
        }
    }

    /// Always true: unauthenticated requests carry no context at all.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        true
    }

    #[must_use]
    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    #[must_use]
    pub fn subject_id(&self) -> Option<&SubjectId> {
        self.subject_id.as_ref()
    }

    #[must_use]
    pub fn subject_name(&self) -> Option<&str> {
        self.subject_name.as_deref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    #[must_use]
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    #[must_use]
    pub fn raw_token(&self) -> Option<&SecretString> {
        self.raw_token.as_ref()
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    #[must_use]
    pub fn limit_to_24_hours(&self) -> bool {
        self.limit_to_24_hours
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

pub struct AuthContextBuilder {
    auth_type: AuthType,
    subject_id: Option<SubjectId>,
    subject_name: Option<String>,
    email: Option<String>,
    client_id: Option<String>,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
    scopes: BTreeSet<String>,
    raw_token: Option<SecretString>,
    expires_at: Option<SystemTime>,
    limit_to_24_hours: bool,
}

impl AuthContextBuilder {
    #[must_use]
    pub fn subject_id(mut self, subject_id: Option<SubjectId>) -> Self {
        self.subject_id = subject_id;
        self
    }

    #[must_use]
    pub fn subject_name(mut self, name: Option<String>) -> Self {
        self.subject_name = name.filter(|n| !n.trim().is_empty());
        self
    }

    #[must_use]
    pub fn email(mut self, email: Option<String>) -> Self {
        self.email = email.filter(|e| !e.trim().is_empty());
        self
    }

    #[must_use]
    pub fn client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    #[must_use]
    pub fn roles(mut self, roles: impl IntoIterator<Item = String>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    #[must_use]
    pub fn permissions(mut self, permissions: impl IntoIterator<Item = String>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    #[must_use]
    pub fn scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn raw_token(mut self, token: impl Into<SecretString>) -> Self {
        self.raw_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn expires_at(mut self, expires_at: Option<SystemTime>) -> Self {
        self.expires_at = expires_at;
        self
    }

    #[must_use]
    pub fn limit_to_24_hours(mut self, limit: bool) -> Self {
        self.limit_to_24_hours = limit;
        self
    }

    /// Finish the context.
    ///
    /// # Errors
    /// Returns `AuthError::Validation` when neither a subject id nor a subject
    /// name was supplied.
    pub fn build(self) -> Result<AuthContext, AuthError> {
        if self.subject_id.is_none() && self.subject_name.is_none() {
            return Err(AuthError::Validation(
                "authenticated identity has no subject".to_string(),
            ));
        }

        Ok(AuthContext {
            auth_type: self.auth_type,
            subject_id: self.subject_id,
            subject_name: self.subject_name,
            email: self.email,
            client_id: self.client_id,
            roles: self.roles,
            permissions: self.permissions,
            scopes: self.scopes,
            raw_token: self.raw_token,
            expires_at: self.expires_at,
            limit_to_24_hours: self.limit_to_24_hours,
        })
    }
}
