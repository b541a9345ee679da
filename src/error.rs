//! Session error types

use std::fmt;
use std::time::Duration;

/// Fallback shown by login forms when the backend sent no message
pub const LOGIN_FALLBACK_MESSAGE: &str = "Error al iniciar sesión. Por favor, inténtelo de nuevo.";

/// User-facing operations whose forms render a [`SessionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    SaveProfile,
    ChangePassword,
    PasswordReset,
}

impl Operation {
    /// Text shown when the backend gave no message of its own
    pub fn fallback_message(self) -> &'static str {
        match self {
            Operation::Login => LOGIN_FALLBACK_MESSAGE,
            Operation::SaveProfile => "Error al actualizar perfil",
            Operation::ChangePassword => "Error al cambiar la contraseña",
            Operation::PasswordReset => "Error al procesar la solicitud",
        }
    }
}

/// Errors that can occur while talking to the auth backend
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Transport failure (connection refused, DNS, TLS...)
    Network(String),
    /// The call did not finish within the configured timeout
    Timeout(Duration),
    /// The backend answered 401/403
    Unauthorized,
    /// The backend refused the request, optionally with a message for the user
    Rejected {
        status: Option<u16>,
        message: Option<String>,
    },
    /// The response body did not have the expected shape
    Decode(String),
    /// The operation needs an authenticated session
    NotAuthenticated,
    /// Input rejected before any network call
    Validation(String),
    /// The backend does not implement this operation
    Unsupported(&'static str),
}

impl SessionError {
    /// Text the login form should render for this error.
    pub fn user_message(&self) -> String {
        self.user_message_for(Operation::Login)
    }

    /// Text the form of `op` should render for this error
    pub fn user_message_for(&self, op: Operation) -> String {
        match self {
            SessionError::Rejected {
                message: Some(msg), ..
            } => msg.clone(),
            SessionError::Validation(msg) => msg.clone(),
            _ => op.fallback_message().to_string(),
        }
    }

    /// Whether this error means the server-side session is gone
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SessionError::Unauthorized)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Network(msg) => write!(f, "Network error: {}", msg),
            SessionError::Timeout(after) => write!(f, "Request timed out after {:?}", after),
            SessionError::Unauthorized => write!(f, "Not authorized"),
            SessionError::Rejected { status, message } => {
                write!(f, "Request rejected")?;
                if let Some(status) = status {
                    write!(f, " ({})", status)?;
                }
                if let Some(message) = message {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
            SessionError::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            SessionError::NotAuthenticated => write!(f, "No authenticated session"),
            SessionError::Validation(msg) => write!(f, "Invalid input: {}", msg),
            SessionError::Unsupported(op) => write!(f, "Operation not supported: {}", op),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Decode(err.to_string())
    }
}

#[cfg(feature = "http-backend")]
impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SessionError::Decode(err.to_string())
        } else {
            SessionError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_backend_text() {
        let err = SessionError::Rejected {
            status: Some(401),
            message: Some("Usuario o contraseña incorrectos".to_string()),
        };
        assert_eq!(err.user_message(), "Usuario o contraseña incorrectos");

        let err = SessionError::Network("connection refused".to_string());
        assert_eq!(err.user_message(), LOGIN_FALLBACK_MESSAGE);
    }

    #[test]
    fn test_fallback_follows_operation() {
        let err = SessionError::Timeout(Duration::from_secs(10));
        assert_eq!(
            err.user_message_for(Operation::ChangePassword),
            "Error al cambiar la contraseña"
        );
        assert_eq!(
            err.user_message_for(Operation::SaveProfile),
            "Error al actualizar perfil"
        );
        assert_eq!(
            err.user_message_for(Operation::PasswordReset),
            "Error al procesar la solicitud"
        );
        assert_eq!(err.user_message_for(Operation::Login), LOGIN_FALLBACK_MESSAGE);

        let err = SessionError::Rejected {
            status: Some(400),
            message: Some("La contraseña actual no es correcta".to_string()),
        };
        assert_eq!(
            err.user_message_for(Operation::ChangePassword),
            "La contraseña actual no es correcta"
        );
    }

    #[test]
    fn test_display_rejected() {
        let err = SessionError::Rejected {
            status: Some(500),
            message: None,
        };
        assert_eq!(err.to_string(), "Request rejected (500)");
    }
}
