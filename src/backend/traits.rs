//! Auth backend trait

use async_trait::async_trait;

use crate::error::SessionError;
use crate::user::{Credentials, PasswordChange, User, UserUpdate};

/// Trait for the remote side of the session
///
/// Every call is credentialed: implementations carry the session cookie
/// themselves, callers never attach a token.
#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Ask the backend who the current session belongs to
    ///
    /// Returns `Ok(None)` for a well-formed "not authenticated" answer
    async fn session_check(&self) -> Result<Option<User>, SessionError>;

    /// Exchange credentials for an authenticated session
    async fn login(&self, credentials: &Credentials) -> Result<User, SessionError>;

    /// End the server-side session
    async fn logout(&self) -> Result<(), SessionError>;

    /// Persist profile changes for the current user (optional)
    async fn update_profile(&self, update: &UserUpdate) -> Result<(), SessionError> {
        let _ = update;
        Err(SessionError::Unsupported("update_profile"))
    }

    /// Change the current user's password (optional)
    async fn change_password(&self, change: &PasswordChange) -> Result<(), SessionError> {
        let _ = change;
        Err(SessionError::Unsupported("change_password"))
    }

    /// Ask for a password reset mail (optional)
    async fn request_password_reset(&self, email: &str) -> Result<(), SessionError> {
        let _ = email;
        Err(SessionError::Unsupported("request_password_reset"))
    }
}
