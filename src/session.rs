use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Identity, OAuthProvider, Session};
use crate::supabase::IdentityProvider;

pub const ENTRY_ROUTE: &str = "/";
pub const DASHBOARD_ROUTE: &str = "/dashboard";

pub fn is_auth_route(path: &str) -> bool {
    path.contains("/auth")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn,
    SignedOut,
}

impl SessionChange {
    /// Where the browser goes after this transition when it is currently on `current_path`.
    pub fn navigation(self, current_path: &str) -> Option<&'static str> {
        match self {
            SessionChange::SignedIn
                if current_path == ENTRY_ROUTE || is_auth_route(current_path) =>
            {
                Some(DASHBOARD_ROUTE)
            }
            SessionChange::SignedOut if current_path != ENTRY_ROUTE => Some(ENTRY_ROUTE),
            _ => None,
        }
    }
}

/// Holds the signed-in identity for one browser and publishes every change
/// to subscribers.
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    session: watch::Sender<Option<Session>>,
    code_verifier: Mutex<Option<String>>,
    refreshing: Mutex<()>,
}

impl SessionStore {
    pub fn signed_out(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::with_session(provider, None)
    }

    pub fn signed_in(provider: Arc<dyn IdentityProvider>, session: Session) -> Self {
        Self::with_session(provider, Some(session))
    }

    fn with_session(provider: Arc<dyn IdentityProvider>, session: Option<Session>) -> Self {
        let (tx, _rx) = watch::channel(session);
        Self {
            provider,
            session: tx,
            code_verifier: Mutex::new(None),
            refreshing: Mutex::new(()),
        }
    }

    /// Rebuilds a session from a cached refresh token. Any provider failure
    /// leaves the store signed out.
    pub async fn restore(provider: Arc<dyn IdentityProvider>, refresh_token: Option<&str>) -> Self {
        let store = Self::signed_out(provider);
        if let Some(token) = refresh_token {
            match store.provider.refresh(token).await {
                Ok(session) => {
                    store.replace(Some(session));
                }
                Err(e) => error!("Failed to restore session: {}", e),
            }
        }
        store
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.borrow().as_ref().map(|s| s.identity.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.session
            .borrow()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
    }

    /// True between [`SessionStore::sign_in_with_provider`] and the callback.
    pub async fn sign_in_pending(&self) -> bool {
        self.code_verifier.lock().await.is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    /// Starts an OAuth redirect and returns the provider url to send the browser to.
    pub async fn sign_in_with_provider(
        &self,
        provider: OAuthProvider,
        return_url: &str,
    ) -> Result<String, AppError> {
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let url = self.provider.authorize_url(provider, return_url, &verifier)?;
        *self.code_verifier.lock().await = Some(verifier);
        info!("starting {} sign-in", provider.as_str());
        Ok(url)
    }

    /// Finishes the redirect started by [`SessionStore::sign_in_with_provider`].
    pub async fn complete_sign_in(&self, code: &str) -> Result<Identity, AppError> {
        let verifier = self
            .code_verifier
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::Provider("no sign-in in progress".to_string()))?;

        let session = self.provider.exchange_code(code, &verifier).await?;
        let identity = session.identity.clone();
        self.replace(Some(session));
        Ok(identity)
    }

    /// Invalidates the provider session. The local session is cleared even if
    /// the provider call fails.
    pub async fn sign_out(&self) -> Option<SessionChange> {
        let token = self.session.borrow().as_ref().map(|s| s.access_token.clone());
        if let Some(token) = token {
            if let Err(e) = self.provider.invalidate_session(&token).await {
                warn!("Failed to invalidate provider session: {}", e);
            }
        }
        self.replace(None)
    }

    /// Identity and access token for a store call. An expired access token is
    /// refreshed first, one caller at a time; a failed refresh signs the
    /// session out unless another caller already replaced it.
    pub async fn access(&self) -> Result<(Identity, String), AppError> {
        if let Some(access) = self.unexpired()? {
            return Ok(access);
        }

        let _refreshing = self.refreshing.lock().await;
        let session = self
            .session
            .borrow()
            .clone()
            .ok_or(AppError::Unauthenticated)?;
        if !session.is_expired(Utc::now()) {
            return Ok((session.identity, session.access_token));
        }

        let Some(refresh_token) = session.refresh_token else {
            self.replace(None);
            return Err(AppError::Unauthenticated);
        };

        match self.provider.refresh(&refresh_token).await {
            Ok(renewed) => {
                let access = (renewed.identity.clone(), renewed.access_token.clone());
                self.replace(Some(renewed));
                Ok(access)
            }
            Err(e) => {
                warn!("session refresh failed: {}", e);
                if self.refresh_token().as_deref() == Some(refresh_token.as_str()) {
                    self.replace(None);
                }
                Err(AppError::Unauthenticated)
            }
        }
    }

    fn unexpired(&self) -> Result<Option<(Identity, String)>, AppError> {
        let session = self.session.borrow();
        let session = session.as_ref().ok_or(AppError::Unauthenticated)?;
        if session.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some((session.identity.clone(), session.access_token.clone())))
    }

    fn replace(&self, next: Option<Session>) -> Option<SessionChange> {
        let was_signed_in = self.session.borrow().is_some();
        let user_id = next.as_ref().map(|s| s.identity.id);
        self.session.send_replace(next);

        match (was_signed_in, user_id) {
            (false, Some(user_id)) => {
                info!(%user_id, "signed in");
                Some(SessionChange::SignedIn)
            }
            (true, None) => {
                info!("signed out");
                Some(SessionChange::SignedOut)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::supabase::MemoryBackend;

    /// Hands control back to the runtime before every refresh.
    struct SlowRefresh(Arc<MemoryBackend>);

    #[async_trait]
    impl IdentityProvider for SlowRefresh {
        async fn resolve_session(&self, access_token: &str) -> Result<Identity, AppError> {
            self.0.resolve_session(access_token).await
        }

        fn authorize_url(
            &self,
            provider: OAuthProvider,
            redirect_to: &str,
            code_verifier: &str,
        ) -> Result<String, AppError> {
            self.0.authorize_url(provider, redirect_to, code_verifier)
        }

        async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AppError> {
            self.0.exchange_code(code, code_verifier).await
        }

        async fn refresh(&self, refresh_token: &str) -> Result<Session, AppError> {
            tokio::task::yield_now().await;
            self.0.refresh(refresh_token).await
        }

        async fn invalidate_session(&self, access_token: &str) -> Result<(), AppError> {
            self.0.invalidate_session(access_token).await
        }
    }

    fn ada() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Some("ada@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn test_signed_out_store_has_no_identity() {
        let store = SessionStore::signed_out(Arc::new(MemoryBackend::new()));
        assert_eq!(store.current_identity(), None);
        assert!(matches!(store.access().await, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_redirect_sign_in_flow() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::signed_out(backend.clone());
        let mut changes = store.subscribe();
        let user = ada();

        let url = store
            .sign_in_with_provider(OAuthProvider::Google, "http://localhost/auth/callback")
            .await
            .expect("Failed to start sign-in");
        assert!(url.contains("provider=google"));

        let code = backend.issue_code(&user).await;
        let identity = store.complete_sign_in(&code).await.expect("Failed to sign in");

        assert_eq!(identity, user);
        assert_eq!(store.current_identity(), Some(user.clone()));
        assert!(changes.has_changed().unwrap_or(false));
        let seen = changes.borrow_and_update().as_ref().map(|s| s.identity.clone());
        assert_eq!(seen, Some(user));
    }

    #[tokio::test]
    async fn test_callback_without_redirect_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::signed_out(backend.clone());
        let code = backend.issue_code(&ada()).await;

        assert!(matches!(store.complete_sign_in(&code).await, Err(AppError::Provider(_))));
        assert_eq!(store.current_identity(), None);
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_provider_session() {
        let backend = Arc::new(MemoryBackend::new());
        let session = backend.sign_in(&ada()).await;
        let token = session.access_token.clone();
        let store = SessionStore::signed_in(backend.clone(), session);

        assert_eq!(store.sign_out().await, Some(SessionChange::SignedOut));
        assert_eq!(store.current_identity(), None);
        assert!(backend.resolve_session(&token).await.is_err());
        assert_eq!(store.sign_out().await, None);
    }

    #[tokio::test]
    async fn test_restore_fails_closed() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::restore(backend.clone(), Some("refresh-bogus")).await;
        assert_eq!(store.current_identity(), None);

        let user = ada();
        let session = backend.sign_in(&user).await;
        let store = SessionStore::restore(backend, session.refresh_token.as_deref()).await;
        assert_eq!(store.current_identity(), Some(user));
    }

    #[tokio::test]
    async fn test_expired_access_token_is_refreshed() {
        let backend = Arc::new(MemoryBackend::new());
        let user = ada();
        let mut session = backend.sign_in(&user).await;
        let stale_token = session.access_token.clone();
        session.expires_at = Some(Utc::now() - Duration::minutes(1));
        let store = SessionStore::signed_in(backend, session);

        let (identity, token) = store.access().await.expect("Failed to refresh");
        assert_eq!(identity, user);
        assert_ne!(token, stale_token);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let backend = Arc::new(MemoryBackend::new());
        let user = ada();
        let mut session = backend.sign_in(&user).await;
        session.expires_at = Some(Utc::now() - Duration::minutes(1));
        let store = SessionStore::signed_in(Arc::new(SlowRefresh(backend)), session);

        let (first, second) = tokio::join!(store.access(), store.access());
        let (_, first) = first.expect("First caller lost the session");
        let (_, second) = second.expect("Second caller lost the session");

        assert_eq!(first, second);
        assert_eq!(store.current_identity(), Some(user));
    }

    #[tokio::test]
    async fn test_pending_sign_in_is_visible() {
        let store = SessionStore::signed_out(Arc::new(MemoryBackend::new()));
        assert!(!store.sign_in_pending().await);

        store
            .sign_in_with_provider(OAuthProvider::Google, "http://localhost/auth/callback")
            .await
            .expect("Failed to start sign-in");
        assert!(store.sign_in_pending().await);
    }

    #[test]
    fn test_navigation_on_transitions() {
        assert_eq!(SessionChange::SignedIn.navigation("/"), Some(DASHBOARD_ROUTE));
        assert_eq!(SessionChange::SignedIn.navigation("/auth/callback"), Some(DASHBOARD_ROUTE));
        assert_eq!(SessionChange::SignedIn.navigation("/dashboard"), None);
        assert_eq!(SessionChange::SignedOut.navigation("/dashboard"), Some(ENTRY_ROUTE));
        assert_eq!(SessionChange::SignedOut.navigation("/"), None);
    }
}
