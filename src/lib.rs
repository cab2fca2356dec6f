//! Fragments: a multi-user content store.
//!
//! Clients create fragments (byte blobs with a declared content type), read
//! them verbatim or converted to another supported representation, list and
//! delete them. Every operation is scoped to the authenticated owner.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use auth::{AuthLayer, AuthProvider, Owner};
pub use models::{
    fragment::{Fragment, FragmentError, FragmentInit},
    types::{TypeFamily, TypeRegistry},
};
pub use services::fragment_service::{Conversion, FragmentList, FragmentService};
pub use state::AppState;
pub use storage::{FragmentStore, MemoryStore, SqliteStore};

/// Assemble the HTTP application.
pub fn app(state: AppState, auth: AuthLayer, max_body_bytes: usize) -> Router {
    routes::routes::routes(auth, max_body_bytes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
