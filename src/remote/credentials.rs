//! Locally cached credential artifact for the remote store.
//!
//! The cache is a JSON file holding the current access token and its expiry.
//! On every authentication the cache is inspected: no file means a fresh
//! token is issued, an expired token is refreshed, a valid one is reused. The
//! result is written back so the next run can reuse it.

use crate::error::SyncFault;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Persisted access credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Opaque bearer token
    pub access_token: String,
    /// When the token was issued
    pub issued_at: DateTime<Utc>,
    /// First instant at which the token is no longer valid
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    fn issue(now: DateTime<Utc>, ttl: Duration) -> Result<Self, SyncFault> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            SyncFault::Auth(format!("token lifetime of {}s overflows the calendar", ttl.num_seconds()))
        })?;
        Ok(Self {
            access_token: uuid::Uuid::new_v4().simple().to_string(),
            issued_at: now,
            expires_at,
        })
    }

    /// Whether the token is no longer valid at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What [`CredentialCache::authorize`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    /// No cached credentials existed
    Issued,
    /// Cached credentials had expired
    Refreshed,
    /// Cached credentials were still valid
    Reused,
}

/// File-backed credential cache.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: PathBuf,
    ttl: Duration,
}

impl CredentialCache {
    /// Cache stored at `path`, issuing tokens valid for `ttl`.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached credentials, `Ok(None)` when there are none.
    pub async fn load(&self) -> Result<Option<Credentials>, SyncFault> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncFault::Auth(format!(
                    "cannot read credential cache '{}': {e}",
                    self.path.display()
                )))
            }
        };
        match serde_json::from_str(&raw) {
            Ok(creds) => Ok(Some(creds)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Credential cache is unreadable, issuing new credentials"
                );
                Ok(None)
            }
        }
    }

    async fn save(&self, creds: &Credentials) -> Result<(), SyncFault> {
        let json = serde_json::to_string_pretty(creds)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            SyncFault::Auth(format!(
                "cannot write credential cache '{}': {e}",
                self.path.display()
            ))
        })
    }

    /// Return usable credentials at `now`, issuing or refreshing as needed.
    pub async fn authorize(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Credentials, AuthAction), SyncFault> {
        let (creds, action) = match self.load().await? {
            None => (Credentials::issue(now, self.ttl)?, AuthAction::Issued),
            Some(cached) if cached.is_expired(now) => {
                (Credentials::issue(now, self.ttl)?, AuthAction::Refreshed)
            }
            Some(cached) => (cached, AuthAction::Reused),
        };
        self.save(&creds).await?;
        tracing::debug!(action = ?action, expires_at = %creds.expires_at, "Remote credentials ready");
        Ok((creds, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn issues_then_reuses_then_refreshes() {
        let tmp = TempDir::new().unwrap();
        let cache = CredentialCache::new(tmp.path().join("credentials.json"), Duration::hours(1));
        let t0 = Utc::now();

        let (first, action) = cache.authorize(t0).await.unwrap();
        assert_eq!(action, AuthAction::Issued);

        let (second, action) = cache.authorize(t0 + Duration::minutes(30)).await.unwrap();
        assert_eq!(action, AuthAction::Reused);
        assert_eq!(first, second);

        let (third, action) = cache.authorize(t0 + Duration::hours(2)).await.unwrap();
        assert_eq!(action, AuthAction::Refreshed);
        assert_ne!(third.access_token, first.access_token);
        assert_eq!(cache.load().await.unwrap(), Some(third));
    }

    #[tokio::test]
    async fn corrupt_cache_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = CredentialCache::new(&path, Duration::hours(1));
        let (_, action) = cache.authorize(Utc::now()).await.unwrap();
        assert_eq!(action, AuthAction::Issued);
    }

    #[tokio::test]
    async fn overflowing_lifetime_is_an_auth_fault() {
        let tmp = TempDir::new().unwrap();
        let cache = CredentialCache::new(tmp.path().join("credentials.json"), Duration::MAX);

        let err = cache.authorize(Utc::now()).await.unwrap_err();
        assert!(matches!(err, SyncFault::Auth(_)));
        assert!(!cache.path().exists());
    }
}
