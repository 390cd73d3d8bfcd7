//! Per-route authorization layer.
//!
//! Each guarded route carries its own [`RouteRequirement`]; the layer runs the
//! [`Authorizer`] pipeline and attaches a [`RequestContext`] for handlers.
//!
//! Credentials are checked before anything else in the request is parsed, and
//! the org/branch target is only read for routes with a scope requirement.

use std::sync::Arc;

use axum::{
    extract::{RawPathParams, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
    routing::MethodRouter,
};

use tenantgate_auth::{Authorizer, RouteRequirement, ScopeGuard, ScopeTarget};
use tower_cookies::Cookies;
use tenantgate_core::{BranchId, OrgId};

use crate::app::cookies::{ACCESS_COOKIE, cookie_value};
use crate::app::errors::{auth_error_to_response, json_error};
use crate::context::RequestContext;

pub const ORG_HEADER: &str = "x-org-id";
pub const BRANCH_HEADER: &str = "x-branch-id";

#[derive(Clone)]
pub struct RouteGuard {
    authorizer: Authorizer,
    requirement: Arc<RouteRequirement>,
}

impl RouteGuard {
    pub fn new(authorizer: Authorizer, requirement: RouteRequirement) -> Self {
        Self {
            authorizer,
            requirement: Arc::new(requirement),
        }
    }
}

/// Attach `requirement` to a method router.
pub fn guarded<S>(route: MethodRouter<S>, authorizer: &Authorizer, requirement: RouteRequirement) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(axum::middleware::from_fn_with_state(
        RouteGuard::new(authorizer.clone(), requirement),
        authorize_route,
    ))
}

pub async fn authorize_route(
    State(guard): State<RouteGuard>,
    params: Option<RawPathParams>,
    mut req: Request,
    next: Next,
) -> Response {
    // Set by `CookieManagerLayer`.
    let cookies = req.extensions().get::<Cookies>().cloned();
    let token = extract_access_token(req.headers(), cookies.as_ref());

    let principal = match guard.authorizer.authenticate(token.as_deref()).await {
        Ok(principal) => principal,
        Err(err) => return auth_error_to_response(err),
    };
    if let Err(err) = guard.authorizer.permit(&principal, &guard.requirement) {
        return auth_error_to_response(err);
    }

    let target = match guard.requirement.scope {
        Some(scope) => {
            let target = match scope_target(params.as_ref(), req.headers()) {
                Ok(target) => target,
                Err(resp) => return resp,
            };
            if let Err(err) = ScopeGuard::enforce(&principal, scope, &target) {
                return auth_error_to_response(err);
            }
            target
        }
        None => ScopeTarget::default(),
    };

    req.extensions_mut()
        .insert(RequestContext::new(principal, target));
    next.run(req).await
}

/// Bearer header first, then the `access_token` cookie.
pub fn extract_access_token(headers: &HeaderMap, cookies: Option<&Cookies>) -> Option<String> {
    extract_bearer(headers)
        .map(str::to_string)
        .or_else(|| cookies.and_then(|c| cookie_value(c, ACCESS_COOKIE)))
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Path parameters `org_id`/`branch_id` win over the `X-Org-Id`/`X-Branch-Id` headers.
fn scope_target(params: Option<&RawPathParams>, headers: &HeaderMap) -> Result<ScopeTarget, Response> {
    let mut org_raw = None;
    let mut branch_raw = None;
    if let Some(params) = params {
        for (key, value) in params {
            match key {
                "org_id" => org_raw = Some(value.to_string()),
                "branch_id" => branch_raw = Some(value.to_string()),
                _ => {}
            }
        }
    }
    let org_raw = org_raw.or_else(|| header_string(headers, ORG_HEADER));
    let branch_raw = branch_raw.or_else(|| header_string(headers, BRANCH_HEADER));

    Ok(ScopeTarget {
        org_id: org_raw
            .map(|raw| parse_id::<OrgId>(&raw, "organization"))
            .transpose()?,
        branch_id: branch_raw
            .map(|raw| parse_id::<BranchId>(&raw, "branch"))
            .transpose()?,
    })
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.trim().parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
