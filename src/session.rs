//! Session store: the single owner of "who is the current user"
//!
//! STATE MACHINE
//! =============
//! ```text
//! LOADING --check_session ok--------> AUTHENTICATED
//! LOADING --check_session no user---> ANONYMOUS
//! ANONYMOUS --login ok--------------> AUTHENTICATED
//! AUTHENTICATED --logout------------> ANONYMOUS
//! AUTHENTICATED --update_user_info--> AUTHENTICATED
//! ```
//! LOADING exists only until the first session check completes.
//!
//! Every change is published on a `tokio::sync::watch` channel; views
//! subscribe and re-evaluate instead of polling.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::AuthBackend;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::user::{Credentials, PasswordChange, User, UserUpdate};

/// Snapshot of the session as views see it
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Present if and only if the last completed check or login succeeded
    pub user: Option<User>,

    /// True until the first session check completes, never again afterwards
    pub loading_initial: bool,
}

impl SessionState {
    /// State at application start
    pub fn loading() -> Self {
        Self {
            user: None,
            loading_initial: true,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.loading_initial {
            SessionPhase::Loading
        } else if self.user.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::loading()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Authenticated,
    Anonymous,
}

struct Inner<B> {
    backend: B,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
}

/// Process-wide session handle
///
/// Create one at application start and hand clones to whoever needs it;
/// clones share state. It lives as long as the application does.
///
/// # Example
///
/// ```rust,ignore
/// let store = SessionStore::new(HttpBackend::new(config.clone())?, config);
/// store.check_session().await.ok();
///
/// match store.login("ana", "secreto").await {
///     Ok(user) => navigate(store.config().landing_route.as_str()),
///     Err(e) => show_error(e.user_message()),
/// }
/// ```
pub struct SessionStore<B: AuthBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: AuthBackend> Clone for SessionStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: AuthBackend> SessionStore<B> {
    /// Create a store in the LOADING state
    pub fn new(backend: B, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::loading());
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                state,
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Copy of the current state
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Ask the backend for the current session.
    ///
    /// Call once at startup. Any failure, including a plain "not
    /// authenticated", leaves the store ANONYMOUS; the error is returned
    /// for logging only and never needs handling.
    pub async fn check_session(&self) -> Result<User, SessionError> {
        let outcome = self
            .call("session_check", self.inner.backend.session_check())
            .await
            .and_then(|user| user.ok_or(SessionError::NotAuthenticated));

        match &outcome {
            Ok(user) => info!("session restored for {}", user.username),
            Err(SessionError::NotAuthenticated) => debug!("no active session"),
            Err(e) => warn!("session check failed, continuing anonymous: {}", e),
        }

        let user = outcome.as_ref().ok().cloned();
        self.inner.state.send_if_modified(|state| {
            let changed = state.loading_initial || state.user != user;
            state.loading_initial = false;
            state.user = user;
            changed
        });
        outcome
    }

    /// Log in with a username and password.
    ///
    /// On success the store is AUTHENTICATED and the caller navigates to the
    /// landing page. On failure the store is ANONYMOUS and the error's
    /// [`SessionError::user_message`] is what the form shows. Concurrent
    /// calls are not deduplicated; forms disable their submit button instead.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, SessionError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(SessionError::Validation(
                "Usuario y contraseña son obligatorios".to_string(),
            ));
        }

        let credentials = Credentials::new(username.trim(), password);
        let outcome = self
            .call("login", self.inner.backend.login(&credentials))
            .await;

        match &outcome {
            Ok(user) => info!("logged in as {}", user.username),
            Err(e) => warn!("login failed for {}: {}", credentials.username, e),
        }

        let user = outcome.as_ref().ok().cloned();
        self.inner.state.send_if_modified(|state| {
            let changed = state.user != user;
            state.user = user;
            changed
        });
        outcome
    }

    /// Log out and return the route to navigate to.
    ///
    /// The local session is cleared whatever the backend says; a failed
    /// request is only logged.
    pub async fn logout(&self) -> &str {
        if let Err(e) = self.call("logout", self.inner.backend.logout()).await {
            warn!("logout request failed, clearing local session anyway: {}", e);
        }
        self.clear_user();
        info!("logged out");
        &self.inner.config.login_route
    }

    /// Merge `update` into the in-memory user without any network call.
    ///
    /// Returns false when there is no user to update.
    pub fn update_user_info(&self, update: &UserUpdate) -> bool {
        let mut applied = false;
        self.inner.state.send_if_modified(|state| match state.user.as_mut() {
            Some(user) => {
                applied = true;
                let before = user.clone();
                user.merge(update);
                *user != before
            }
            None => false,
        });
        applied
    }

    /// Persist profile changes, then mirror them locally
    pub async fn save_profile(&self, update: &UserUpdate) -> Result<User, SessionError> {
        self.require_user()?;
        if update.is_empty() {
            return self.require_user();
        }

        let outcome = self
            .call("update_profile", self.inner.backend.update_profile(update))
            .await;
        self.observe(&outcome);
        outcome?;

        self.update_user_info(update);
        self.require_user()
    }

    /// Validate and submit a password change for the current user
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), SessionError> {
        change.validate()?;
        self.require_user()?;

        let outcome = self
            .call("change_password", self.inner.backend.change_password(change))
            .await;
        self.observe(&outcome);
        if outcome.is_ok() {
            info!("password changed");
        }
        outcome
    }

    /// Ask for a password reset mail; allowed in any state
    pub async fn request_password_reset(&self, email: &str) -> Result<(), SessionError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(SessionError::Validation(
                "Introduce un correo electrónico válido".to_string(),
            ));
        }
        self.call(
            "request_password_reset",
            self.inner.backend.request_password_reset(email),
        )
        .await
    }

    /// Drop to ANONYMOUS because the server no longer knows this session.
    ///
    /// Call this when any authenticated request elsewhere got a 401/403.
    pub fn invalidate(&self) {
        if self.is_authenticated() {
            warn!("server session expired, dropping local user");
            self.clear_user();
        }
    }

    fn clear_user(&self) {
        self.inner.state.send_if_modified(|state| state.user.take().is_some());
    }

    fn require_user(&self) -> Result<User, SessionError> {
        self.current_user().ok_or(SessionError::NotAuthenticated)
    }

    fn observe<T>(&self, outcome: &Result<T, SessionError>) {
        if let Err(e) = outcome {
            if e.is_unauthorized() {
                self.invalidate();
            }
        }
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        let limit = self.inner.config.request_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("{} timed out after {:?}", op, limit);
                Err(SessionError::Timeout(limit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::Operation;
    use std::time::Duration;

    fn ana() -> User {
        User::new(7, "ana", "admin")
    }

    fn store_with(backend: MemoryBackend) -> SessionStore<MemoryBackend> {
        SessionStore::new(backend, SessionConfig::new("http://backend.test/api"))
    }

    #[tokio::test]
    async fn test_starts_loading() {
        let store = store_with(MemoryBackend::new());
        assert_eq!(store.phase(), SessionPhase::Loading);
        assert!(store.current_user().is_none());
    }

    #[tokio::test]
    async fn test_check_session_restores_user() {
        let store = store_with(MemoryBackend::new().with_session(ana()));

        let user = store.check_session().await.unwrap();
        assert_eq!(user, ana());
        assert_eq!(store.phase(), SessionPhase::Authenticated);
        assert!(!store.state().loading_initial);
    }

    #[tokio::test]
    async fn test_check_session_failure_is_anonymous() {
        let backend = MemoryBackend::new().with_session(ana());
        backend.set_fail_session_check(true);
        let store = store_with(backend);

        let err = store.check_session().await.unwrap_err();
        assert!(matches!(err, SessionError::Network(_)));
        assert_eq!(store.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_check_session_twice_is_stable() {
        let store = store_with(MemoryBackend::new().with_session(ana()));
        let mut rx = store.subscribe();

        store.check_session().await.unwrap();
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        store.check_session().await.unwrap();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.current_user(), Some(ana()));
        assert_eq!(store.backend().calls().session_check, 2);
    }

    #[tokio::test]
    async fn test_login_success_and_failure() {
        let store = store_with(MemoryBackend::new().with_account("x", ana()));
        let _ = store.check_session().await;

        let err = store.login("ana", "nope").await.unwrap_err();
        assert_eq!(err.user_message(), "Usuario o contraseña incorrectos");
        assert_eq!(store.phase(), SessionPhase::Anonymous);

        let user = store.login("ana", "x").await.unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(store.phase(), SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let store = store_with(MemoryBackend::new());
        let err = store.login("  ", "x").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(store.backend().calls().login, 0);
    }

    #[tokio::test]
    async fn test_logout_clears_even_on_failure() {
        let backend = MemoryBackend::new().with_session(ana());
        backend.set_fail_logout(true);
        let store = store_with(backend);
        store.check_session().await.unwrap();

        let route = store.logout().await;
        assert_eq!(route, "/login");
        assert_eq!(store.phase(), SessionPhase::Anonymous);
        assert_eq!(store.backend().calls().logout, 1);
    }

    #[tokio::test]
    async fn test_update_user_info_is_local() {
        let store = store_with(MemoryBackend::new().with_session(ana()));
        store.check_session().await.unwrap();
        let calls = store.backend().calls();

        assert!(store.update_user_info(&UserUpdate::new().with_email("ana@verso.es")));

        let user = store.current_user().unwrap();
        assert_eq!(user.email.as_deref(), Some("ana@verso.es"));
        assert_eq!(user.username, "ana");
        assert_eq!(user.role, "admin");
        assert_eq!(store.backend().calls(), calls);
    }

    #[tokio::test]
    async fn test_update_user_info_without_user() {
        let store = store_with(MemoryBackend::new());
        let _ = store.check_session().await;
        assert!(!store.update_user_info(&UserUpdate::new().with_email("x@y.z")));
        assert!(store.current_user().is_none());
    }

    #[tokio::test]
    async fn test_save_profile_round_trip() {
        let backend = MemoryBackend::new().with_session(ana());
        let store = store_with(backend.clone());
        store.check_session().await.unwrap();

        let user = store
            .save_profile(&UserUpdate::new().with_first_name("Ana"))
            .await
            .unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Ana"));
        assert_eq!(backend.session().unwrap().first_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_expired_server_session_drops_user() {
        let backend = MemoryBackend::new().with_session(ana());
        let store = store_with(backend.clone());
        store.check_session().await.unwrap();

        backend.expire_session();
        let err = store
            .save_profile(&UserUpdate::new().with_email("a@b.c"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Unauthorized);
        assert_eq!(store.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_change_password_validates_first() {
        let store = store_with(MemoryBackend::new().with_account("x", ana()).with_session(ana()));
        store.check_session().await.unwrap();

        let err = store
            .change_password(&PasswordChange::new("x", "abc", "abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(store.backend().calls().change_password, 0);

        store
            .change_password(&PasswordChange::new("x", "nueva123", "nueva123"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_password_reset_checks_email() {
        let store = store_with(MemoryBackend::new());
        assert!(store.request_password_reset("no-at-sign").await.is_err());
        store.request_password_reset("ana@verso.es").await.unwrap();
        assert_eq!(store.backend().calls().password_reset, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out_to_anonymous() {
        let backend = MemoryBackend::new()
            .with_session(ana())
            .with_latency(Duration::from_secs(60));
        let config = SessionConfig::new("http://backend.test/api")
            .with_request_timeout(Duration::from_secs(5));
        let store = SessionStore::new(backend, config);

        let err = store.check_session().await.unwrap_err();
        assert_eq!(err, SessionError::Timeout(Duration::from_secs(5)));
        assert_eq!(store.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_password_change_reports_its_own_failure() {
        let backend = MemoryBackend::new().with_account("x", ana()).with_session(ana());
        let store = store_with(backend.clone());
        store.check_session().await.unwrap();

        let backend = backend.with_latency(Duration::from_secs(60));
        let err = store
            .change_password(&PasswordChange::new("x", "nueva123", "nueva123"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert_eq!(
            err.user_message_for(Operation::ChangePassword),
            "Error al cambiar la contraseña"
        );
        // A timeout is not a lost session.
        assert_eq!(store.phase(), SessionPhase::Authenticated);
        assert_eq!(backend.calls().change_password, 1);
    }
}
