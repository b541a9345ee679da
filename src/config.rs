//! Session client configuration

use std::time::Duration;

/// Configuration for the session store, its backend and the route guard
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Base URL of the REST backend (default: the VERSO intranet API)
    pub base_url: String,

    /// "Who am I" endpoint (default: "/session")
    pub session_check_path: String,

    /// Login endpoint (default: "/login")
    pub login_path: String,

    /// Logout endpoint (default: "/logout")
    pub logout_path: String,

    /// Profile update endpoint (default: "/users/profile.php")
    pub profile_path: String,

    /// Password change endpoint (default: "/users/password.php")
    pub password_path: String,

    /// Password reset request endpoint (default: "/forgot-password.php")
    pub password_reset_path: String,

    /// Client-side route of the login screen (default: "/login")
    pub login_route: String,

    /// Where to go after login when no return-to hint applies (default: "/")
    pub landing_route: String,

    /// Query parameter carrying the return-to hint (default: "from")
    pub return_to_param: String,

    /// Upper bound for every backend call (default: 10 seconds)
    /// An expired call is treated like any other failure.
    pub request_timeout: Duration,

    /// Body rendered while the initial session check is pending
    pub loading_placeholder: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://intranet.volquetesescalante.com/api".to_string(),
            session_check_path: "/session".to_string(),
            login_path: "/login".to_string(),
            logout_path: "/logout".to_string(),
            profile_path: "/users/profile.php".to_string(),
            password_path: "/users/password.php".to_string(),
            password_reset_path: "/forgot-password.php".to_string(),
            login_route: "/login".to_string(),
            landing_route: "/".to_string(),
            return_to_param: "from".to_string(),
            request_timeout: Duration::from_secs(10),
            loading_placeholder: "Cargando...".to_string(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration pointing at the given backend
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the session check endpoint path
    pub fn with_session_check_path<S: Into<String>>(mut self, path: S) -> Self {
        self.session_check_path = path.into();
        self
    }

    /// Set the login endpoint path
    pub fn with_login_path<S: Into<String>>(mut self, path: S) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set the logout endpoint path
    pub fn with_logout_path<S: Into<String>>(mut self, path: S) -> Self {
        self.logout_path = path.into();
        self
    }

    /// Set the profile update endpoint path
    pub fn with_profile_path<S: Into<String>>(mut self, path: S) -> Self {
        self.profile_path = path.into();
        self
    }

    /// Set the password change endpoint path
    pub fn with_password_path<S: Into<String>>(mut self, path: S) -> Self {
        self.password_path = path.into();
        self
    }

    /// Set the password reset endpoint path
    pub fn with_password_reset_path<S: Into<String>>(mut self, path: S) -> Self {
        self.password_reset_path = path.into();
        self
    }

    /// Set the client-side login route
    pub fn with_login_route<S: Into<String>>(mut self, route: S) -> Self {
        self.login_route = route.into();
        self
    }

    /// Set the landing route used after login
    pub fn with_landing_route<S: Into<String>>(mut self, route: S) -> Self {
        self.landing_route = route.into();
        self
    }

    /// Set the return-to query parameter name
    pub fn with_return_to_param<S: Into<String>>(mut self, param: S) -> Self {
        self.return_to_param = param.into();
        self
    }

    /// Set the timeout applied to each backend call
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the loading placeholder text
    pub fn with_loading_placeholder<S: Into<String>>(mut self, text: S) -> Self {
        self.loading_placeholder = text.into();
        self
    }

    /// Full URL of a backend endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_with_single_slash() {
        let config = SessionConfig::new("http://localhost:8080/api/");
        assert_eq!(
            config.endpoint("/session"),
            "http://localhost:8080/api/session"
        );
        assert_eq!(config.endpoint("login"), "http://localhost:8080/api/login");
    }

    #[test]
    fn test_builder_overrides() {
        let config = SessionConfig::default()
            .with_session_check_path("/session-check")
            .with_request_timeout(Duration::from_secs(3));
        assert_eq!(config.session_check_path, "/session-check");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.login_route, "/login");
    }
}
