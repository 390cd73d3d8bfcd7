use axum::{
    Router,
    routing::{get, post},
};

use tenantgate_auth::RouteRequirement;

use crate::app::services::AppState;
use crate::middleware::guarded;

pub mod auth;
pub mod me;
pub mod orgs;
pub mod system;

/// Auth endpoints plus every guarded route.
pub fn router(state: &AppState) -> Router {
    let authorizer = &state.authorizer;

    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::session))
        .route(
            "/me",
            guarded(get(me::me), authorizer, RouteRequirement::authenticated()),
        )
        .route(
            "/me/explain",
            guarded(get(me::explain), authorizer, RouteRequirement::authenticated()),
        )
        .merge(orgs::router(authorizer))
}
