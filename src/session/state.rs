use std::future::Future;
use tokio::sync::watch;

use crate::api::{ApiError, AuthStatus};

/// The three operations session tracking needs from the backend boundary.
///
/// Implemented by [`ApiClient`](crate::api::ApiClient); tests substitute doubles.
pub trait AuthBackend: Send + Sync {
    /// Status probe. Must not mutate anything.
    fn status(&self) -> impl Future<Output = Result<AuthStatus, ApiError>> + Send;

    /// Silent token refresh. Resolves `false` on any failure.
    fn refresh(&self) -> impl Future<Output = bool> + Send;

    /// End the session server-side and drop local tokens.
    fn logout(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// UI-facing view of authentication status.
///
/// Derived from the token holder, never authoritative. Starts out loading;
/// consumers should hold back protected content until `is_loading` clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub has_refresh_token: bool,
    pub is_loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            has_refresh_token: false,
            is_loading: true,
        }
    }
}

/// Named states of [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Loading,
    Authenticated,
    /// Not signed in, but a refresh token exists so login can be offered
    /// without forcing a logout.
    RefreshAvailable,
    SignedOut,
}

impl SessionState {
    pub fn signed_out() -> Self {
        Self {
            is_authenticated: false,
            has_refresh_token: false,
            is_loading: false,
        }
    }

    fn settled(status: AuthStatus) -> Self {
        Self {
            is_authenticated: status.is_authenticated,
            has_refresh_token: status.has_refresh_token,
            is_loading: false,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        match (self.is_loading, self.is_authenticated, self.has_refresh_token) {
            (true, _, _) => AuthPhase::Loading,
            (false, true, _) => AuthPhase::Authenticated,
            (false, false, true) => AuthPhase::RefreshAvailable,
            (false, false, false) => AuthPhase::SignedOut,
        }
    }
}

/// Self-healing session tracker.
///
/// Holds the current [`SessionState`] in a watch channel; call
/// [`subscribe`](Session::subscribe) to be notified of changes.
pub struct Session<B> {
    backend: B,
    state: watch::Sender<SessionState>,
}

impl<B: AuthBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { backend, state }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn settle(&self, next: SessionState) -> SessionState {
        tracing::debug!(phase = ?next.phase(), "Session state settled");
        self.state.send_replace(next);
        next
    }

    /// Probe the session, refreshing silently once if only a refresh token exists.
    ///
    /// A failed refresh leaves the state as "not authenticated, refresh
    /// available". A failed probe settles as signed out.
    pub async fn check_auth(&self) -> SessionState {
        let status = match self.backend.status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Auth status probe failed");
                return self.settle(SessionState::signed_out());
            }
        };

        if !status.is_authenticated && status.has_refresh_token {
            tracing::info!("Access token missing, attempting silent refresh");
            if self.backend.refresh().await {
                return match self.backend.status().await {
                    Ok(renewed) => self.settle(SessionState::settled(renewed)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Auth status probe failed after refresh");
                        self.settle(SessionState::signed_out())
                    }
                };
            }
            tracing::info!("Silent refresh failed, session needs a new login");
        }

        self.settle(SessionState::settled(status))
    }

    /// Explicit refresh. On success the state is re-derived via [`check_auth`](Self::check_auth).
    pub async fn refresh_token(&self) -> bool {
        let success = self.backend.refresh().await;
        if success {
            tracing::info!("Token refreshed");
            self.check_auth().await;
        }
        success
    }

    /// Log out. Local state becomes signed out whatever the backend says;
    /// a failed call is logged, not returned.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout().await {
            tracing::warn!(error = %e, "Logout request failed");
        }
        self.settle(SessionState::signed_out());
    }
}
