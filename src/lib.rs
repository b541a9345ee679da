//! # verso-session
//!
//! Client-side session gate for the VERSO dashboard.
//!
//! A [`SessionStore`] holds the current user of a cookie-authenticated REST
//! backend and is the only thing that changes it. A [`RouteGuard`] turns the
//! store's state into a decision for each protected route: show a loading
//! placeholder, redirect to the login screen, or render.
//!
//! ## Features
//!
//! - **One source of truth**: login, logout, session check and profile merges all go through the store
//! - **Observable state**: changes are published on a `tokio::sync::watch` channel
//! - **Pluggable backends**: the REST API over reqwest, an in-memory backend, or a custom one
//! - **Salvo integration**: [`GuardHandler`] gates the pages of a locally served shell
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use verso_session::{GuardWatch, HttpBackend, RouteGuard, SessionConfig, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), verso_session::SessionError> {
//!     let config = SessionConfig::new("https://intranet.example.com/api");
//!     let store = SessionStore::new(HttpBackend::new(config.clone())?, config);
//!     let mut guard = GuardWatch::new(RouteGuard::new(store.config()), store.subscribe());
//!
//!     tokio::spawn({
//!         let store = store.clone();
//!         async move { store.check_session().await }
//!     });
//!
//!     while let Some(decision) = guard.changed("/ordenes").await {
//!         println!("{:?}", decision);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod handler;
pub mod session;
pub mod user;

pub use backend::{AuthBackend, CallCounts, MemoryBackend};
pub use config::SessionConfig;
pub use error::{Operation, SessionError};
pub use guard::{GuardDecision, GuardWatch, RouteGuard};
pub use handler::GuardHandler;
pub use session::{SessionPhase, SessionState, SessionStore};
pub use user::{visible_items, Credentials, NavItem, PasswordChange, Role, User, UserUpdate};

#[cfg(feature = "http-backend")]
pub use backend::HttpBackend;

/// Extension trait for Depot to read the guarded user
pub mod depot_ext;
pub use depot_ext::SessionDepotExt;
