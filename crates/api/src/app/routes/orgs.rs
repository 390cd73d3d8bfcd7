//! Organization and branch routes.
//!
//! Handlers are placeholders for the business endpoints; they only read the
//! principal and target the authorization layer attached.

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use tenantgate_auth::{Authorizer, Permission, PermissionRequirement, RouteRequirement};

use crate::context::RequestContext;
use crate::middleware::guarded;

pub fn org_reports_requirement() -> RouteRequirement {
    RouteRequirement::permission(Permission::ReportOrg).in_org()
}

pub fn list_bills_requirement() -> RouteRequirement {
    RouteRequirement::permission(PermissionRequirement::any_of([
        Permission::BillRead,
        Permission::ReportBranch,
    ]))
    .in_branch()
}

pub fn create_bill_requirement() -> RouteRequirement {
    RouteRequirement::permission(Permission::BillCreate).in_branch()
}

pub fn router(authorizer: &Authorizer) -> Router {
    Router::new()
        .route(
            "/orgs/:org_id/reports",
            guarded(get(org_reports), authorizer, org_reports_requirement()),
        )
        .route(
            "/orgs/:org_id/branches/:branch_id/bills",
            guarded(get(list_bills), authorizer, list_bills_requirement())
                .merge(guarded(post(create_bill), authorizer, create_bill_requirement())),
        )
        // Same resource addressed through X-Org-Id / X-Branch-Id.
        .route(
            "/branch/bills",
            guarded(get(list_bills), authorizer, list_bills_requirement()),
        )
}

async fn org_reports(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    Json(json!({
        "orgId": ctx.org_id(),
        "requestedBy": ctx.principal().user_id,
        "reports": [],
    }))
}

async fn list_bills(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    Json(json!({
        "orgId": ctx.org_id(),
        "branchId": ctx.branch_id(),
        "bills": [],
    }))
}

async fn create_bill(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(json!({
            "orgId": ctx.org_id(),
            "branchId": ctx.branch_id(),
            "createdBy": ctx.principal().user_id,
        })),
    )
}
