use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::Credential;
use crate::{Error, Result};

/// In-memory holder of the session credential.
///
/// Access and refresh tokens are swapped together under one write lock, so a
/// reader never observes a half-updated pair. No network I/O happens here.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<Option<Credential>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: RwLock::new(Some(credential)),
        }
    }

    pub fn current(&self) -> Result<Credential> {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard.clone().ok_or(Error::NoCredential)
    }

    pub fn access_token(&self) -> Result<String> {
        self.current().map(|c| c.access_token)
    }

    pub fn has_credential(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn is_expired(&self, skew: Duration) -> Result<bool> {
        self.is_expired_at(Utc::now(), skew)
    }

    /// True once `now` is within `skew` of the access token's expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> Result<bool> {
        let cred = self.current()?;
        let skew = chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::zero());
        Ok(now >= cred.expires_at - skew)
    }

    pub fn replace(&self, credential: Credential) {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(credential);
    }
}
