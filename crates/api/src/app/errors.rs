use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use tenantgate_auth::{AuthError, AuthErrorKind};

const UNAVAILABLE_MESSAGE: &str = "service temporarily unavailable";

pub fn status_for(kind: AuthErrorKind) -> StatusCode {
    match kind {
        AuthErrorKind::AuthenticationError
        | AuthErrorKind::TokenRevoked
        | AuthErrorKind::TokenReuseDetected => StatusCode::UNAUTHORIZED,
        AuthErrorKind::AuthorizationError | AuthErrorKind::ScopeViolation => StatusCode::FORBIDDEN,
        AuthErrorKind::ScopeTargetMissing => StatusCode::BAD_REQUEST,
        AuthErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    let kind = err.kind();
    let status = status_for(kind);

    // Store details are logged, never returned.
    let message = match &err {
        AuthError::Store(store) => {
            tracing::error!(error = %store, "auth store unavailable");
            UNAVAILABLE_MESSAGE.to_string()
        }
        other => other.to_string(),
    };

    let mut body = json!({
        "error": kind.as_str(),
        "message": message,
    });
    if let AuthError::Forbidden { missing } = &err {
        body["missing"] = json!(missing);
    }

    let mut resp = (status, axum::Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
        resp.headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    resp
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
