//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// JWT is malformed or missing required fields.
    #[error("invalid JWT: {0}")]
    InvalidJwt(String),

    /// A signing key could not be built.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// Cookie attributes are inconsistent.
    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// jsonwebtoken error.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
