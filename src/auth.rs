use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::protocol::{
    DEFAULT_TOKEN_LIFETIME_SECS, TokenResponse, code_exchange_form, extract_code, jwt_expiry,
    refresh_form,
};
use crate::store::CredentialStore;
use crate::token::TokenStore;
use crate::transport::{HttpRequest, Transport};
use crate::types::Credential;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    Refresh,
}

/// Obtains and refreshes the credential in [`TokenStore`].
///
/// Refreshes are single-flight: callers that find the token expired queue on
/// one mutex and re-check after acquiring it, so a burst of requests costs a
/// single token-endpoint call.
pub struct AuthSession {
    tokens: TokenStore,
    transport: Arc<dyn Transport>,
    store: Option<Arc<dyn CredentialStore>>,
    token_url: String,
    skew: Duration,
    refresh_lock: Mutex<()>,
}

impl AuthSession {
    pub fn new(transport: Arc<dyn Transport>, token_url: impl Into<String>, skew: Duration) -> Self {
        Self {
            tokens: TokenStore::new(),
            transport,
            store: None,
            token_url: token_url.into(),
            skew,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn authorization_url(&self) -> String {
        crate::protocol::authorization_url()
    }

    /// Completes the authorization-code flow from the app redirect URL the
    /// user copied out of the browser.
    pub async fn exchange_redirect(&self, redirect_url: &str) -> Result<Credential> {
        let code = extract_code(redirect_url).ok_or_else(|| {
            Error::AuthorizationFailed("redirect URL carries no authorization code".into())
        })?;
        let resp = self
            .request_token(Grant::AuthorizationCode, code_exchange_form(&code))
            .await?;
        let cred = credential_from_response(resp, None, Utc::now());
        self.install(cred.clone()).await?;
        info!("authorization code exchanged");
        Ok(cred)
    }

    /// Installs tokens obtained out of band. Without an explicit expiry the
    /// JWT `exp` claim is used; failing that, a token that can be refreshed
    /// is treated as already expired.
    pub async fn import_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Credential> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::AuthorizationFailed("empty access token".into()));
        }
        let now = Utc::now();
        let expires_at = expires_at
            .or_else(|| jwt_expiry(&access_token))
            .unwrap_or_else(|| {
                if refresh_token.is_some() {
                    now
                } else {
                    now + chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)
                }
            });
        let cred = Credential {
            access_token,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        };
        self.install(cred.clone()).await?;
        debug!(expires_at = %cred.expires_at, "tokens imported");
        Ok(cred)
    }

    /// Loads a persisted credential. Returns whether one was found.
    pub async fn restore(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load().await? {
            Some(cred) => {
                debug!(expires_at = %cred.expires_at, "credential restored");
                self.tokens.replace(cred);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns an access token that is not within the expiry skew,
    /// refreshing first if needed.
    pub async fn ensure_fresh(&self) -> Result<String> {
        if !self.tokens.is_expired(self.skew)? {
            return self.tokens.access_token();
        }
        let _guard = self.refresh_lock.lock().await;
        if !self.tokens.is_expired(self.skew)? {
            debug!("token refreshed by another caller");
            return self.tokens.access_token();
        }
        self.refresh_locked().await
    }

    /// Called after the server rejected `stale` with 401. Refreshes only if
    /// no other caller has replaced the token in the meantime.
    pub async fn refresh_rejected(&self, stale: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.tokens.current()?;
        if current.access_token != stale {
            debug!("rejected token already replaced");
            return Ok(current.access_token);
        }
        self.refresh_locked().await
    }

    /// Unconditional refresh.
    pub async fn refresh(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<String> {
        let current = self.tokens.current()?;
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| Error::RefreshFailed("no refresh token stored".into()))?;

        debug!("refreshing access token");
        let resp = self
            .request_token(Grant::Refresh, refresh_form(&refresh_token))
            .await?;
        let cred = credential_from_response(resp, Some(refresh_token), Utc::now());
        let access = cred.access_token.clone();
        self.tokens.replace(cred.clone());
        if let Some(store) = &self.store
            && let Err(e) = store.save(&cred).await
        {
            warn!(error = %e, "failed to persist refreshed credential");
        }
        info!(expires_at = %cred.expires_at, "access token refreshed");
        Ok(access)
    }

    async fn install(&self, cred: Credential) -> Result<()> {
        self.tokens.replace(cred.clone());
        if let Some(store) = &self.store {
            store.save(&cred).await?;
        }
        Ok(())
    }

    async fn request_token(&self, grant: Grant, form: Vec<(String, String)>) -> Result<TokenResponse> {
        let req = HttpRequest::post_form(&self.token_url, form);
        let resp = self.transport.request(req).await.map_err(|e| Error::GatewayUnreachable {
            path: self.token_url.clone(),
            reason: e.to_string(),
        })?;

        if resp.is_success() {
            return serde_json::from_str(&resp.body)
                .map_err(|e| Error::Protocol(format!("token response: {e}")));
        }

        let status = resp.status;
        let detail = format!("HTTP {status}: {}", truncate(&resp.body, 200));
        warn!(status, grant = ?grant, "token endpoint rejected request");
        if (500..600).contains(&status) {
            return Err(Error::GatewayUnreachable {
                path: self.token_url.clone(),
                reason: detail,
            });
        }
        Err(match grant {
            Grant::AuthorizationCode => Error::AuthorizationFailed(detail),
            Grant::Refresh => Error::RefreshFailed(detail),
        })
    }
}

fn credential_from_response(
    resp: TokenResponse,
    previous_refresh: Option<String>,
    now: DateTime<Utc>,
) -> Credential {
    let lifetime = resp.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Credential {
        access_token: resp.access_token,
        refresh_token: resp.refresh_token.or(previous_refresh),
        expires_at: now + chrono::Duration::seconds(lifetime),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
