//! Defines routes for the fragment API.
//!
//! ## Structure
//! - **Health endpoints** (unauthenticated)
//!   - `GET /`, `GET /healthz`, `GET /readyz`
//!
//! - **Fragment endpoints** (authenticated, scoped to the caller)
//!   - `GET    /v1/fragments`           — list ids, or full records with `?expand=1`
//!   - `POST   /v1/fragments`           — create from the raw body
//!   - `GET    /v1/fragments/{id}`      — payload; `{id}.{ext}` converts
//!   - `GET    /v1/fragments/{id}/info` — metadata
//!   - `PUT    /v1/fragments/{id}`      — replace payload
//!   - `DELETE /v1/fragments/{id}`      — remove metadata and payload

use crate::{
    auth::AuthLayer,
    errors::AppError,
    handlers::{
        fragment_handlers::{
            create_fragment, delete_fragment, get_fragment, get_fragment_info, list_fragments,
            update_fragment,
        },
        health_handlers::{healthz, readyz, root},
    },
    state::AppState,
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};

/// Build the router. `max_body_bytes` caps POST/PUT bodies.
pub fn routes(auth: AuthLayer, max_body_bytes: usize) -> Router<AppState> {
    let api = Router::new()
        .route("/fragments", get(list_fragments).post(create_fragment))
        .route(
            "/fragments/{id}",
            get(get_fragment).put(update_fragment).delete(delete_fragment),
        )
        .route("/fragments/{id}/info", get(get_fragment_info))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .route_layer(auth);

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/v1", api)
        .fallback(not_found)
}

async fn not_found() -> AppError {
    AppError::not_found("not found")
}
