use axum::{
    Json,
    extract::{Extension, Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use tenantgate_auth::{AuthUser, Permission, PermissionRequirement, explain_authorization};

use crate::app::errors::{auth_error_to_response, json_error};
use crate::app::services::AppState;
use crate::context::RequestContext;

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    /// Comma-separated permission names.
    pub permission: String,
    /// `any` (default) or `all` when several permissions are named.
    #[serde(default)]
    pub mode: Option<String>,
}

/// GET /me
pub async fn me(Extension(ctx): Extension<RequestContext>) -> Json<AuthUser> {
    Json(ctx.into_principal())
}

/// GET /me/explain?permission=bill:read,report:branch&mode=any
///
/// Explains the decision against the caller's current user record.
pub async fn explain(
    Extension(state): Extension<AppState>,
    Extension(ctx): Extension<RequestContext>,
    query: Result<Query<ExplainQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text());
        }
    };
    let requirement = match parse_requirement(&query) {
        Ok(requirement) => requirement,
        Err(resp) => return resp,
    };

    let user = match state.tokens().load_user(ctx.principal()).await {
        Ok(user) => user,
        Err(err) => return auth_error_to_response(err),
    };

    Json(explain_authorization(&user, &requirement, state.tokens().resolver())).into_response()
}

fn parse_requirement(query: &ExplainQuery) -> Result<PermissionRequirement, Response> {
    let mut permissions = Vec::new();
    for raw in query.permission.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let permission: Permission = raw
            .parse()
            .map_err(|e: tenantgate_auth::UnknownPermission| {
                json_error(StatusCode::BAD_REQUEST, "invalid_permission", e.to_string())
            })?;
        permissions.push(permission);
    }

    match (permissions.as_slice(), query.mode.as_deref()) {
        ([], _) => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_permission",
            "at least one permission is required",
        )),
        ([single], None) => Ok(PermissionRequirement::Single(*single)),
        (_, None | Some("any")) => Ok(PermissionRequirement::any_of(permissions)),
        (_, Some("all")) => Ok(PermissionRequirement::all_of(permissions)),
        (_, Some(other)) => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("unknown mode '{other}', expected 'any' or 'all'"),
        )),
    }
}
