//! Extension trait for Depot to read the guarded user

use salvo_core::Depot;

use crate::user::User;

pub(crate) const CURRENT_USER_KEY: &str = "verso.session.user";

/// Extension trait for Salvo's Depot, filled in by [`crate::GuardHandler`]
pub trait SessionDepotExt {
    /// The authenticated user of this request, if the guard let it through
    fn current_user(&self) -> Option<&User>;
}

impl SessionDepotExt for Depot {
    fn current_user(&self) -> Option<&User> {
        self.get::<User>(CURRENT_USER_KEY).ok()
    }
}
