use std::collections::BTreeMap;

use nocturne_api::{AuthError, SecretStore};

mod revocation;
#[cfg(feature = "http-session")]
mod session;

pub use revocation::InMemoryRevocationCache;
#[cfg(feature = "http-session")]
pub use session::HttpSessionService;

pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, AuthError> {
        std::env::var(secret_ref)
            .map_err(|_| AuthError::NotFound(format!("missing secret env var {secret_ref}")))
    }
}

/// Secrets held in memory, for tooling and tests.
#[derive(Debug, Clone, Default)]
pub struct MapSecretStore {
    values: BTreeMap<String, String>,
}

impl MapSecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, secret_ref: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(secret_ref.into(), value.into());
        self
    }
}

impl SecretStore for MapSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, AuthError> {
        self.values
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("missing secret {secret_ref}")))
    }
}

/// Tries each store in order.
pub struct LayeredSecretStore {
    layers: Vec<Box<dyn SecretStore>>,
}

impl LayeredSecretStore {
    #[must_use]
    pub fn new(layers: Vec<Box<dyn SecretStore>>) -> Self {
        Self { layers }
    }
}

impl SecretStore for LayeredSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, AuthError> {
        self.layers
            .iter()
            .find_map(|store| store.get(secret_ref).ok())
            .ok_or_else(|| AuthError::NotFound(format!("missing secret {secret_ref}")))
    }
}
