//! nocturne-auth
//!
//! Token and cookie primitives for Nocturne request authentication:
//!
//! - **Validating and minting HS256 JWTs** (`exp` required, optional iss/aud
//!   checks, leeway), returning typed [`nocturne_api::TokenRejection`]s
//!   instead of errors
//! - **Structural checks and an unverified peek** used to route a bearer token
//!   to the handler that owns it
//! - **Claim parsing** for the multi-valued `roles` / `permissions` / `scope`
//!   claims and building an [`nocturne_api::AuthContext`] from them
//! - **Building `Set-Cookie` headers** for session cookies and their removal
//!
//! ## Quick start
//! ```no_run
//! use nocturne_auth::{JwtPolicy, JwtValidator};
//! use secrecy::SecretString;
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = JwtValidator::hs256(
//!     &SecretString::from("signing-secret".to_string()),
//!     &JwtPolicy {
//!         issuer: Some("nocturne".to_string()),
//!         audience: Some("nocturne-api".to_string()),
//!         ..Default::default()
//!     },
//! )?;
//!
//! match validator.validate("eyJ...") {
//!     Ok(claims) => println!("sub={:?}", claims.sub()),
//!     Err(rejection) => println!("rejected: {rejection}"),
//! }
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

pub mod claims;
mod cookie;
mod error;
mod jwt;

pub use cookie::{CookieOptions, build_clear_cookie, build_set_cookie};
pub use error::{Error, Result};
pub use jwt::{JwtIssuer, JwtPolicy, JwtValidator, is_jwt_shaped, peek_claims};
