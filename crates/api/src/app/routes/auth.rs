//! Login, refresh, logout and session status.
//!
//! The refresh token travels in an httpOnly cookie scoped to these endpoints.
//! Clients that cannot hold cookies may send it as `{"refreshToken": "..."}`
//! instead, and then receive the rotated token in the response body.

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use tenantgate_auth::{AuthError, TokenPair};
use tenantgate_core::{BranchId, OrgId, SessionId, UserId};

use crate::app::cookies::{REFRESH_COOKIE, cookie_value};
use crate::app::errors::{auth_error_to_response, json_error};
use crate::app::services::AppState;
use crate::middleware::extract_access_token;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub org_id: OrgId,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token_type: &'static str,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub active: bool,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub org_id: OrgId,
    pub branch_id: Option<BranchId>,
    pub access_token_expires_at: DateTime<Utc>,
}

/// POST /auth/login
pub async fn login(
    Extension(state): Extension<AppState>,
    cookies: Cookies,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text());
        }
    };

    match state
        .tokens()
        .authenticate(
            state.credentials.as_ref(),
            &req.email,
            &req.password,
            req.org_id,
            req.branch_id,
        )
        .await
    {
        Ok(pair) => token_response(&state, &cookies, pair, false),
        Err(err) => auth_error_to_response(err),
    }
}

/// POST /auth/refresh
pub async fn refresh(Extension(state): Extension<AppState>, cookies: Cookies, body: Bytes) -> Response {
    let presented = match presented_refresh_token(&cookies, &body) {
        Ok(Some(presented)) => presented,
        Ok(None) => return auth_error_to_response(AuthError::MissingCredentials),
        Err(resp) => return resp,
    };

    match state.tokens().rotate_refresh(&presented.token).await {
        Ok(pair) => token_response(&state, &cookies, pair, presented.from_body),
        Err(err) => {
            if matches!(err, AuthError::TokenRevoked | AuthError::TokenReuseDetected) {
                state.cookies.clear_refresh(&cookies);
            }
            auth_error_to_response(err)
        }
    }
}

/// POST /auth/logout
///
/// Idempotent: logging out of an already ended session still succeeds.
pub async fn logout(Extension(state): Extension<AppState>, cookies: Cookies, body: Bytes) -> Response {
    let presented = match presented_refresh_token(&cookies, &body) {
        Ok(Some(presented)) => presented,
        Ok(None) => return auth_error_to_response(AuthError::MissingCredentials),
        Err(resp) => return resp,
    };

    state.cookies.clear_refresh(&cookies);
    match state.tokens().logout(&presented.token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => auth_error_to_response(err),
    }
}

/// GET /auth/session
///
/// Validates the access token against the live session, regardless of
/// whether strict checking is enabled for guarded routes.
pub async fn session(Extension(state): Extension<AppState>, cookies: Cookies, headers: HeaderMap) -> Response {
    let Some(token) = extract_access_token(&headers, Some(&cookies)) else {
        return auth_error_to_response(AuthError::MissingCredentials);
    };

    match state.tokens().validate_access_token_live(&token).await {
        Ok(user) => Json(SessionStatus {
            active: true,
            session_id: user.session_id,
            user_id: user.user_id,
            org_id: user.org_id,
            branch_id: user.branch_id,
            access_token_expires_at: user.expires_at,
        })
        .into_response(),
        Err(err) => auth_error_to_response(err),
    }
}

struct PresentedToken {
    token: String,
    from_body: bool,
}

/// Cookie first, then a JSON body. An empty body is not an error.
fn presented_refresh_token(cookies: &Cookies, body: &Bytes) -> Result<Option<PresentedToken>, Response> {
    if let Some(token) = cookie_value(cookies, REFRESH_COOKIE) {
        return Ok(Some(PresentedToken {
            token,
            from_body: false,
        }));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let req: RefreshRequest = serde_json::from_slice(body).map_err(|e| {
        json_error(StatusCode::BAD_REQUEST, "invalid_request", e.to_string())
    })?;
    let token = req.refresh_token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(PresentedToken {
        token: token.to_string(),
        from_body: true,
    }))
}

fn token_response(state: &AppState, cookies: &Cookies, pair: TokenPair, echo_refresh: bool) -> Response {
    let max_age = (pair.refresh.expires_at - state.tokens().now()).num_seconds();
    state.cookies.set_refresh(cookies, pair.refresh.token.clone(), max_age);

    let body = TokenResponse {
        token_type: "Bearer",
        access_token: pair.access.token,
        access_token_expires_at: pair.access.expires_at,
        refresh_token_expires_at: pair.refresh.expires_at,
        session_id: pair.session_id,
        refresh_token: echo_refresh.then_some(pair.refresh.token),
    };

    let mut resp = Json(body).into_response();
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp
}
