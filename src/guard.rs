//! Route guard: decides what a protected route shows for a session state
//!
//! The decision is a pure function of [`SessionState`] and the requested
//! location. [`GuardWatch`] re-runs it whenever the store publishes a change.

use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::session::SessionState;
use crate::user::{Role, User};

/// Outcome of guarding one protected route
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    /// Initial session check still pending: show only the placeholder
    Loading { placeholder: String },
    /// No user: go to the login screen, carrying the return-to hint
    Redirect { location: String },
    /// Authenticated, but the role may not open this route
    Forbidden { role: Role },
    /// Render the requested route for this user
    Render { user: User },
}

#[derive(Debug, Clone)]
struct RoleRule {
    prefix: String,
    roles: Vec<Role>,
}

impl RoleRule {
    fn matches(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix)
                .map_or(false, |rest| rest.starts_with('/'))
    }
}

/// Guard for protected routes
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_route: String,
    landing_route: String,
    return_to_param: String,
    placeholder: String,
    rules: Vec<RoleRule>,
}

impl RouteGuard {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            login_route: config.login_route.clone(),
            landing_route: config.landing_route.clone(),
            return_to_param: config.return_to_param.clone(),
            placeholder: config.loading_placeholder.clone(),
            rules: Vec::new(),
        }
    }

    /// Restrict every route under `prefix` to `roles`
    ///
    /// When several rules match, the longest prefix wins.
    pub fn with_rule<S: Into<String>>(mut self, prefix: S, roles: Vec<Role>) -> Self {
        self.rules.push(RoleRule {
            prefix: prefix.into(),
            roles,
        });
        self
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Whether `requested` is the login screen, which is never guarded
    pub fn is_public(&self, requested: &str) -> bool {
        path_of(requested) == self.login_route
    }

    /// Decide what the protected route `requested` (path plus optional query) shows
    pub fn decide(&self, state: &SessionState, requested: &str) -> GuardDecision {
        if state.loading_initial {
            return GuardDecision::Loading {
                placeholder: self.placeholder.clone(),
            };
        }

        let Some(user) = &state.user else {
            return GuardDecision::Redirect {
                location: self.login_location(requested),
            };
        };

        let path = path_of(requested);
        let rule = self
            .rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.prefix.len());

        let role = user.role();
        match rule {
            Some(rule) if !rule.roles.contains(&role) => GuardDecision::Forbidden { role },
            _ => GuardDecision::Render { user: user.clone() },
        }
    }

    /// Login location carrying `requested` as the return-to hint
    pub fn login_location(&self, requested: &str) -> String {
        if requested.is_empty() || requested == self.landing_route {
            return self.login_route.clone();
        }
        format!(
            "{}?{}={}",
            self.login_route,
            self.return_to_param,
            urlencoding::encode(requested)
        )
    }

    /// Where to go after a successful login, given the login page's query string.
    ///
    /// Only local absolute paths are honored; anything else, including a
    /// missing hint, yields the landing route.
    pub fn return_target(&self, query: Option<&str>) -> String {
        query
            .into_iter()
            .flat_map(|q| q.trim_start_matches('?').split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == self.return_to_param)
            .and_then(|(_, value)| urlencoding::decode(value).ok())
            .map(|target| target.into_owned())
            .filter(|target| self.is_safe_target(target))
            .unwrap_or_else(|| self.landing_route.clone())
    }

    // Browsers drop tab and newlines while parsing, so "/\t/host" reads as "//host".
    fn is_safe_target(&self, target: &str) -> bool {
        target.starts_with('/')
            && !target.starts_with("//")
            && !target.contains('\\')
            && !target.chars().any(|c| c.is_control() || c.is_whitespace())
            && !self.is_public(target)
    }
}

fn path_of(requested: &str) -> &str {
    requested
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or(requested)
}

/// A guard bound to the store's state stream
pub struct GuardWatch {
    guard: RouteGuard,
    state: watch::Receiver<SessionState>,
}

impl GuardWatch {
    pub fn new(guard: RouteGuard, state: watch::Receiver<SessionState>) -> Self {
        Self { guard, state }
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    /// Decision for the latest published state
    pub fn decision(&self, requested: &str) -> GuardDecision {
        self.guard.decide(&self.state.borrow(), requested)
    }

    /// Wait for the next state change and decide again.
    ///
    /// Returns `None` once the store is gone.
    pub async fn changed(&mut self, requested: &str) -> Option<GuardDecision> {
        self.state.changed().await.ok()?;
        let state = self.state.borrow_and_update().clone();
        Some(self.guard.decide(&state, requested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::session::SessionStore;
    use tokio_test::{assert_pending, assert_ready, task};

    fn guard() -> RouteGuard {
        RouteGuard::new(&SessionConfig::default())
    }

    fn signed_in(user: User) -> SessionState {
        SessionState {
            user: Some(user),
            loading_initial: false,
        }
    }

    fn anonymous() -> SessionState {
        SessionState {
            user: None,
            loading_initial: false,
        }
    }

    #[test]
    fn test_loading_shows_placeholder_everywhere() {
        let state = SessionState::loading();
        for path in ["/", "/ordenes", "/configuracion?tab=usuarios"] {
            assert_eq!(
                guard().decide(&state, path),
                GuardDecision::Loading {
                    placeholder: "Cargando...".to_string()
                }
            );
        }
    }

    #[test]
    fn test_anonymous_redirects_with_hint() {
        assert_eq!(
            guard().decide(&anonymous(), "/ordenes?estado=abierta"),
            GuardDecision::Redirect {
                location: "/login?from=%2Fordenes%3Festado%3Dabierta".to_string()
            }
        );
        assert_eq!(
            guard().decide(&anonymous(), "/"),
            GuardDecision::Redirect {
                location: "/login".to_string()
            }
        );
    }

    #[test]
    fn test_authenticated_renders() {
        let ana = User::new(7, "ana", "admin");
        assert_eq!(
            guard().decide(&signed_in(ana.clone()), "/perfil"),
            GuardDecision::Render { user: ana }
        );
    }

    #[test]
    fn test_role_rules() {
        let guard = guard()
            .with_rule("/configuracion", vec![Role::Admin])
            .with_rule("/configuracion/perfil", Role::options());
        let viewer = User::new(2, "guest", "viewer");

        assert_eq!(
            guard.decide(&signed_in(viewer.clone()), "/configuracion/usuarios"),
            GuardDecision::Forbidden { role: Role::Viewer }
        );
        assert!(matches!(
            guard.decide(&signed_in(viewer.clone()), "/configuracion/perfil"),
            GuardDecision::Render { .. }
        ));
        assert!(matches!(
            guard.decide(&signed_in(viewer), "/configuracionx"),
            GuardDecision::Render { .. }
        ));
    }

    #[test]
    fn test_login_route_is_public() {
        assert!(guard().is_public("/login"));
        assert!(guard().is_public("/login?from=%2F"));
        assert!(!guard().is_public("/login-help"));
    }

    #[test]
    fn test_return_target() {
        let guard = guard();
        assert_eq!(
            guard.return_target(Some("from=%2Fordenes%3Festado%3Dabierta")),
            "/ordenes?estado=abierta"
        );
        assert_eq!(guard.return_target(Some("?x=1&from=%2Fperfil")), "/perfil");
        assert_eq!(guard.return_target(None), "/");
        assert_eq!(guard.return_target(Some("from=https%3A%2F%2Fevil.test")), "/");
        assert_eq!(guard.return_target(Some("from=%2F%2Fevil.test")), "/");
        assert_eq!(guard.return_target(Some("from=%2Flogin")), "/");
    }

    #[test]
    fn test_return_target_rejects_control_chars() {
        let guard = guard();
        for hint in [
            "from=%2F%09%2Fevil.test",
            "from=%2F%0A%2Fevil.test",
            "from=%2F%0D%2Fevil.test",
            "from=%2Fordenes%20abiertas",
            "from=%2Fordenes%00",
        ] {
            assert_eq!(guard.return_target(Some(hint)), "/", "hint {}", hint);
        }
        assert_eq!(guard.return_target(Some("from=%2Fperfil")), "/perfil");
    }

    #[tokio::test]
    async fn test_watch_follows_store() {
        let backend = MemoryBackend::new().with_session(User::new(7, "ana", "admin"));
        let store = SessionStore::new(backend, SessionConfig::default());
        let mut watch = GuardWatch::new(guard(), store.subscribe());

        assert!(matches!(watch.decision("/ordenes"), GuardDecision::Loading { .. }));

        {
            let mut next = task::spawn(watch.changed("/ordenes"));
            assert_pending!(next.poll());

            store.check_session().await.unwrap();

            assert!(next.is_woken());
            let decision = assert_ready!(next.poll());
            assert!(matches!(decision, Some(GuardDecision::Render { .. })));
        }

        store.logout().await;
        assert_eq!(
            watch.changed("/ordenes").await,
            Some(GuardDecision::Redirect {
                location: "/login?from=%2Fordenes".to_string()
            })
        );
    }
}
