//! File-backed token persistence
//!
//! Tokens live as one JSON file per persona under a configurable directory,
//! so a fleet restart reuses credentials instead of forcing interactive
//! logins. The interactive/refresh round-trip itself is the caller's
//! responsibility; the store only loads, validates, and saves.

use super::{Identity, IdentityToken, TokenError, TokenSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info};

/// Token store keeping one `<name>.json` per persona
#[derive(Debug)]
pub struct FileTokenStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, IdentityToken>>,
}

impl FileTokenStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn token_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Persist a fresh token for `identity`, replacing any cached one
    pub fn save(&self, identity: &Identity, token: &IdentityToken) -> Result<(), TokenError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.token_path(&identity.name);
        std::fs::write(&path, serde_json::to_vec_pretty(token)?)?;
        info!(identity = %identity.name, path = %path.display(), "stored token");
        self.cache
            .write()
            .unwrap()
            .insert(identity.name.clone(), token.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<IdentityToken>, TokenError> {
        let path = self.token_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

#[async_trait]
impl TokenSource for FileTokenStore {
    async fn token(&self, identity: &Identity) -> Result<IdentityToken, TokenError> {
        if let Some(token) = self.cache.read().unwrap().get(&identity.name) {
            if token.is_valid() {
                return Ok(token.clone());
            }
        }

        match self.load(&identity.name)? {
            Some(token) if token.is_valid() => {
                debug!(identity = %identity.name, "loaded stored token");
                self.cache
                    .write()
                    .unwrap()
                    .insert(identity.name.clone(), token.clone());
                Ok(token)
            }
            Some(_) => Err(TokenError::Expired(identity.name.clone())),
            None => Err(TokenError::Missing(identity.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(valid: bool) -> IdentityToken {
        let offset = if valid {
            Duration::hours(1)
        } else {
            Duration::hours(-1)
        };
        IdentityToken {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + offset,
        }
    }

    #[tokio::test]
    async fn missing_token_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        let err = store.token(&Identity::new("ghost")).await.unwrap_err();
        assert!(matches!(err, TokenError::Missing(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn saved_token_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        let identity = Identity::new("alpha");
        let fresh = token(true);

        store.save(&identity, &fresh).unwrap();
        assert_eq!(store.token(&identity).await.unwrap(), fresh);

        // A second store against the same directory reads it from disk.
        let reopened = FileTokenStore::new(dir.path());
        assert_eq!(reopened.token(&identity).await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn expired_token_requires_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        let identity = Identity::new("beta");
        store.save(&identity, &token(false)).unwrap();

        let err = store.token(&identity).await.unwrap_err();
        assert!(matches!(err, TokenError::Expired(name) if name == "beta"));
    }

    #[tokio::test]
    async fn malformed_token_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gamma.json"), b"not json").unwrap();
        let store = FileTokenStore::new(dir.path());
        let err = store.token(&Identity::new("gamma")).await.unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)));
    }
}
