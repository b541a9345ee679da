//! Route guard middleware for Salvo
//!
//! For a dashboard shell served locally for one operator: the process owns a
//! single [`SessionStore`] and every protected page goes through the guard.

use salvo_core::prelude::*;
use tokio::sync::watch;
use tracing::debug;

use crate::backend::AuthBackend;
use crate::depot_ext::CURRENT_USER_KEY;
use crate::guard::{GuardDecision, RouteGuard};
use crate::session::{SessionState, SessionStore};

/// Salvo handler applying [`RouteGuard`] to each request
///
/// - initial session check pending: `503` with the loading placeholder
/// - no user: `302` to the login route with the return-to hint
/// - role not allowed: `403`
/// - otherwise the user goes into the `Depot` and the request continues
pub struct GuardHandler {
    guard: RouteGuard,
    state: watch::Receiver<SessionState>,
}

impl GuardHandler {
    /// Create a handler following `store`'s state
    pub fn new<B: AuthBackend>(store: &SessionStore<B>, guard: RouteGuard) -> Self {
        Self {
            guard,
            state: store.subscribe(),
        }
    }

    fn requested(req: &Request) -> String {
        let uri = req.uri();
        match uri.query() {
            Some(query) => format!("{}?{}", uri.path(), query),
            None => uri.path().to_string(),
        }
    }
}

impl Clone for GuardHandler {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl Handler for GuardHandler {
    async fn handle(&self, req: &mut Request, depot: &mut Depot, res: &mut Response, ctrl: &mut FlowCtrl) {
        if self.guard.is_public(req.uri().path()) {
            ctrl.call_next(req, depot, res).await;
            return;
        }

        let requested = Self::requested(req);
        let decision = {
            let state = self.state.borrow();
            self.guard.decide(&state, &requested)
        };

        match decision {
            GuardDecision::Loading { placeholder } => {
                res.status_code(StatusCode::SERVICE_UNAVAILABLE);
                res.render(Text::Plain(placeholder));
                ctrl.skip_rest();
            }
            GuardDecision::Redirect { location } => {
                debug!("redirecting {} to {}", requested, location);
                res.render(Redirect::found(location));
                ctrl.skip_rest();
            }
            GuardDecision::Forbidden { role } => {
                debug!("role {} may not open {}", role, requested);
                res.status_code(StatusCode::FORBIDDEN);
                res.render(Text::Plain(format!("Acceso denegado para el rol {}", role)));
                ctrl.skip_rest();
            }
            GuardDecision::Render { user } => {
                depot.insert(CURRENT_USER_KEY, user);
                ctrl.call_next(req, depot, res).await;
            }
        }
    }
}
