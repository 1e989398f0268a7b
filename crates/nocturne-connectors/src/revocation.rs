use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use nocturne_api::{AuthError, RevocationCache};

/// Process-local revocation store keyed by `jti`.
///
/// Each entry holds the instant until which the token counts as revoked,
/// normally the token's own expiry. Expired markers are dropped on read.
#[derive(Debug, Default)]
pub struct InMemoryRevocationCache {
    entries: DashMap<String, SystemTime>,
}

impl InMemoryRevocationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops markers whose revocation window has passed. Returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let before = self.entries.len();
        self.entries.retain(|_, until| *until > now);
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationCache for InMemoryRevocationCache {
    async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        let now = SystemTime::now();
        let Some(until) = self.entries.get(jti).map(|e| *e.value()) else {
            return Ok(false);
        };
        if until > now {
            return Ok(true);
        }
        self.entries.remove_if(jti, |_, u| *u <= now);
        Ok(false)
    }

    async fn revoke(&self, jti: &str, until: SystemTime) -> Result<(), AuthError> {
        if jti.is_empty() {
            return Err(AuthError::Validation("jti is empty".to_string()));
        }
        self.entries
            .entry(jti.to_string())
            .and_modify(|u| *u = (*u).max(until))
            .or_insert(until);
        Ok(())
    }
}
