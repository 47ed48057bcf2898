//! Bot identities and their credential seam
//!
//! The fleet rotates through a configured pool of personas: each sweep picks
//! one uniformly at random and starts every session of that sweep under it.
//! Credential acquisition itself lives outside the core; sessions reach it
//! through the [`TokenSource`] trait, and [`FileTokenStore`] covers the
//! persistence half of that contract.

pub mod store;

pub use store::FileTokenStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One configured persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
}

impl Identity {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

/// Pool of personas the orchestrator rotates through
#[derive(Debug, Clone, Default)]
pub struct IdentityPool {
    identities: Vec<Identity>,
}

impl IdentityPool {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Pick one persona uniformly at random
    pub fn choose(&self) -> Option<&Identity> {
        self.identities.choose(&mut rand::thread_rng())
    }
}

/// OAuth-style credential material for one persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl IdentityToken {
    /// Whether the token can still be presented
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no credentials stored for {0}")]
    Missing(String),
    #[error("credentials for {0} are expired and need an interactive refresh")]
    Expired(String),
    #[error("token store i/o failed")]
    Store(#[from] std::io::Error),
    #[error("stored token is malformed")]
    Malformed(#[from] serde_json::Error),
}

/// Credential seam consumed by the session layer.
///
/// Implementations are expected to refresh and persist tokens as needed; a
/// session must be able to obtain its identity materials before the
/// orchestrator starts it.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, identity: &Identity) -> Result<IdentityToken, TokenError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn empty_pool_has_no_choice() {
        assert!(IdentityPool::default().choose().is_none());
    }

    #[test]
    fn choose_returns_a_pool_member() {
        let pool = IdentityPool::new(vec![Identity::new("alpha"), Identity::new("beta")]);
        for _ in 0..32 {
            let chosen = pool.choose().unwrap();
            assert!(chosen.name == "alpha" || chosen.name == "beta");
        }
    }

    #[test]
    fn choose_covers_the_whole_pool() {
        let pool = IdentityPool::new(vec![Identity::new("alpha"), Identity::new("beta")]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..256 {
            seen.insert(pool.choose().unwrap().name.clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn token_validity_follows_expiry() {
        let valid = IdentityToken {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let expired = IdentityToken {
            expires_at: Utc::now() - Duration::hours(1),
            ..valid.clone()
        };
        assert!(valid.is_valid());
        assert!(!expired.is_valid());
    }
}
