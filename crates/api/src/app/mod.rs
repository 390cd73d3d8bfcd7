//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, token service and authorizer
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `cookies.rs`: refresh/access cookies (`tower_cookies` jar)
//! - `errors.rs`: consistent error responses

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;

pub mod cookies;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppState, ServiceError, UserDirectory};

/// Build the full HTTP router over wired services (used by `main.rs` and the black-box tests).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(&state))
        .layer(
            ServiceBuilder::new()
                .layer(CookieManagerLayer::new())
                .layer(Extension(state)),
        )
}
