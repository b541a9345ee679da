//! In-memory auth backend
//!
//! This is primarily for development and testing: it behaves like the REST
//! backend (accounts, one server-side session) and can be told to fail or
//! to answer slowly.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::AuthBackend;
use crate::error::SessionError;
use crate::user::{Credentials, PasswordChange, User, UserUpdate};

/// Number of calls received per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub session_check: usize,
    pub login: usize,
    pub logout: usize,
    pub update_profile: usize,
    pub change_password: usize,
    pub password_reset: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.session_check
            + self.login
            + self.logout
            + self.update_profile
            + self.change_password
            + self.password_reset
    }
}

struct Account {
    password: String,
    user: User,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    session: Option<User>,
    fail_session_check: bool,
    fail_logout: bool,
    latency: Option<Duration>,
    calls: CallCounts,
}

/// In-memory auth backend
///
/// Clones share the same state, so a test can keep a handle while the
/// store owns another.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryBackend {
    /// Create an empty backend with no accounts and no session
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account
    pub fn with_account<S: Into<String>>(self, password: S, user: User) -> Self {
        self.inner.write().accounts.insert(
            user.username.clone(),
            Account {
                password: password.into(),
                user,
            },
        );
        self
    }

    /// Start with an existing server-side session for `user`
    pub fn with_session(self, user: User) -> Self {
        self.inner.write().session = Some(user);
        self
    }

    /// Make every call wait this long before answering
    pub fn with_latency(self, latency: Duration) -> Self {
        self.inner.write().latency = Some(latency);
        self
    }

    /// Make session checks fail with a network error
    pub fn set_fail_session_check(&self, fail: bool) {
        self.inner.write().fail_session_check = fail;
    }

    /// Make logout answer with a server error
    pub fn set_fail_logout(&self, fail: bool) {
        self.inner.write().fail_logout = fail;
    }

    /// Drop the server-side session, as if the cookie expired
    pub fn expire_session(&self) {
        self.inner.write().session = None;
    }

    /// The server-side session, if any
    pub fn session(&self) -> Option<User> {
        self.inner.read().session.clone()
    }

    /// Calls received so far
    pub fn calls(&self) -> CallCounts {
        self.inner.read().calls
    }

    // Count the call, then wait out the configured latency without holding the lock.
    async fn enter(&self, count: impl FnOnce(&mut CallCounts)) {
        let latency = {
            let mut inner = self.inner.write();
            count(&mut inner.calls);
            inner.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn session_check(&self) -> Result<Option<User>, SessionError> {
        self.enter(|calls| calls.session_check += 1).await;
        let inner = self.inner.read();
        if inner.fail_session_check {
            return Err(SessionError::Network("simulated session check failure".to_string()));
        }
        Ok(inner.session.clone())
    }

    async fn login(&self, credentials: &Credentials) -> Result<User, SessionError> {
        self.enter(|calls| calls.login += 1).await;
        let mut inner = self.inner.write();
        let user = match inner.accounts.get(&credentials.username) {
            Some(account) if account.password == credentials.password => account.user.clone(),
            _ => {
                return Err(SessionError::Rejected {
                    status: Some(401),
                    message: Some("Usuario o contraseña incorrectos".to_string()),
                })
            }
        };
        inner.session = Some(user.clone());
        Ok(user)
    }

    async fn logout(&self) -> Result<(), SessionError> {
        self.enter(|calls| calls.logout += 1).await;
        let mut inner = self.inner.write();
        if inner.fail_logout {
            return Err(SessionError::Rejected {
                status: Some(500),
                message: None,
            });
        }
        inner.session = None;
        Ok(())
    }

    async fn update_profile(&self, update: &UserUpdate) -> Result<(), SessionError> {
        self.enter(|calls| calls.update_profile += 1).await;
        let mut inner = self.inner.write();
        let Some(session) = inner.session.as_mut() else {
            return Err(SessionError::Unauthorized);
        };
        let old_username = session.username.clone();
        session.merge(update);
        let updated = session.clone();

        if let Some(mut account) = inner.accounts.remove(&old_username) {
            account.user = updated.clone();
            inner.accounts.insert(updated.username.clone(), account);
        }
        Ok(())
    }

    async fn change_password(&self, change: &PasswordChange) -> Result<(), SessionError> {
        self.enter(|calls| calls.change_password += 1).await;
        let mut inner = self.inner.write();
        let Some(username) = inner.session.as_ref().map(|u| u.username.clone()) else {
            return Err(SessionError::Unauthorized);
        };
        match inner.accounts.get_mut(&username) {
            Some(account) if account.password == change.current_password => {
                account.password = change.new_password.clone();
                Ok(())
            }
            _ => Err(SessionError::Rejected {
                status: Some(400),
                message: Some("La contraseña actual no es correcta".to_string()),
            }),
        }
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), SessionError> {
        self.enter(|calls| calls.password_reset += 1).await;
        // Unknown addresses succeed too.
        let _ = email;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> User {
        User::new(7, "ana", "admin")
    }

    #[tokio::test]
    async fn test_memory_backend_login_opens_session() {
        let backend = MemoryBackend::new().with_account("x", ana());

        assert_eq!(backend.session_check().await.unwrap(), None);

        let user = backend.login(&Credentials::new("ana", "x")).await.unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(backend.session_check().await.unwrap(), Some(ana()));

        backend.logout().await.unwrap();
        assert_eq!(backend.session(), None);
        assert_eq!(backend.calls().session_check, 2);
        assert_eq!(backend.calls().total(), 4);
    }

    #[tokio::test]
    async fn test_memory_backend_rejects_bad_password() {
        let backend = MemoryBackend::new().with_account("x", ana());

        let err = backend
            .login(&Credentials::new("ana", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Rejected { status: Some(401), .. }));
        assert_eq!(backend.session(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_password_change() {
        let backend = MemoryBackend::new().with_account("x", ana()).with_session(ana());

        let change = PasswordChange::new("x", "nueva123", "nueva123");
        backend.change_password(&change).await.unwrap();

        backend.logout().await.unwrap();
        assert!(backend.login(&Credentials::new("ana", "x")).await.is_err());
        assert!(backend.login(&Credentials::new("ana", "nueva123")).await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_backend_profile_needs_session() {
        let backend = MemoryBackend::new();
        let err = backend
            .update_profile(&UserUpdate::new().with_email("a@b.c"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Unauthorized);
    }
}
