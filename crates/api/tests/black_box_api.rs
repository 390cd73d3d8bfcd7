use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use tenantgate_api::app::{self, UserDirectory};
use tenantgate_api::config::ApiConfig;
use tenantgate_auth::{CredentialVerifier, Role, StoreError, User};
use tenantgate_core::{BranchId, ManualClock, OrgId, UserId};

const MANAGER_EMAIL: &str = "manager@example.com";
const AUDITOR_EMAIL: &str = "auditor@example.com";
const PASSWORD: &str = "correct horse";

struct TestServer {
    base_url: String,
    org: OrgId,
    branch: BranchId,
    clock: Arc<ManualClock>,
    handle: tokio::task::JoinHandle<()>,
}

/// Credential backend that is always down.
struct UnreachableCredentials;

#[async_trait::async_trait]
impl CredentialVerifier for UnreachableCredentials {
    async fn verify(&self, _user_id: UserId, _secret: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("credential db at 10.0.0.7 refused connection".into()))
    }
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    async fn spawn_with(customize: impl FnOnce(&mut app::AppState)) -> Self {
        let org = OrgId::new();
        let branch = BranchId::new();

        let directory = UserDirectory::new();
        directory
            .register(
                User::new(UserId::new(), MANAGER_EMAIL, "Manager")
                    .with_roles([Role::BranchManager])
                    .with_org_scopes([org])
                    .with_branch_scopes([branch]),
                PASSWORD,
            )
            .unwrap();
        directory
            .register(
                User::new(UserId::new(), AUDITOR_EMAIL, "Auditor")
                    .with_roles([Role::Auditor])
                    .with_org_scopes([org])
                    .with_branch_scopes([branch]),
                PASSWORD,
            )
            .unwrap();

        let config = ApiConfig {
            jwt_secret: "test-secret".to_string(),
            ..ApiConfig::default()
        };
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut state = app::services::build_state_with_clock(&config, &directory, clock.clone())
            .await
            .unwrap();
        customize(&mut state);

        // Same router as prod, bound to an ephemeral port.
        let app = app::router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            org,
            branch,
            clock,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bills_path(&self) -> String {
        format!("/orgs/{}/branches/{}/bills", self.org, self.branch)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct LoggedIn {
    access_token: String,
    refresh_cookie: String,
    set_cookie: String,
}

/// Value of the `refresh_token` cookie in a response's `Set-Cookie`.
///
/// Parsed by hand: reqwest will not replay `Secure` cookies over plain http.
fn refresh_cookie(res: &reqwest::Response) -> Option<(String, String)> {
    res.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| {
            let first = raw.split(';').next()?.trim();
            let value = first.strip_prefix("refresh_token=")?;
            Some((value.to_string(), raw.to_string()))
        })
}

async fn login(client: &reqwest::Client, srv: &TestServer, email: &str) -> LoggedIn {
    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({
            "email": email,
            "password": PASSWORD,
            "orgId": srv.org,
            "branchId": srv.branch,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (refresh_cookie, set_cookie) = refresh_cookie(&res).expect("refresh cookie set on login");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["tokenType"], "Bearer");
    assert!(body.get("refreshToken").is_none());

    LoggedIn {
        access_token: body["accessToken"].as_str().unwrap().to_string(),
        refresh_cookie,
        set_cookie,
    }
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()[reqwest::header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(error_code(res).await, "authentication_error");

    let res = client
        .get(srv.url("/me"))
        .bearer_auth("not.a.token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_sets_refresh_cookie_and_me_returns_principal() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let session = login(&client, &srv, "  Manager@Example.com ").await;

    for attr in ["HttpOnly", "Secure", "SameSite=Strict", "Path=/auth"] {
        assert!(session.set_cookie.contains(attr), "missing {attr}: {}", session.set_cookie);
    }

    let res = client
        .get(srv.url("/me"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["orgId"], json!(srv.org));
    assert_eq!(me["roles"], json!(["BRANCH_MANAGER"]));
    assert!(me["permissions"].as_array().unwrap().contains(&json!("bill:create")));

    // The access token is also accepted from its cookie.
    let res = client
        .get(srv.url("/me"))
        .header(reqwest::header::COOKIE, format!("access_token={}", session.access_token))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_credentials_and_foreign_org_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": MANAGER_EMAIL, "password": "wrong", "orgId": srv.org }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": MANAGER_EMAIL, "password": PASSWORD, "orgId": OrgId::new() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "scope_violation");

    let res = client
        .post(srv.url("/auth/login"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{\"email\":")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn branch_routes_enforce_permission_and_scope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let manager = login(&client, &srv, MANAGER_EMAIL).await;
    let auditor = login(&client, &srv, AUDITOR_EMAIL).await;

    let res = client
        .get(srv.url(&srv.bills_path()))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["branchId"], json!(srv.branch));

    let res = client
        .post(srv.url(&srv.bills_path()))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // anyOf: the auditor holds bill:read and report:branch.
    let res = client
        .get(srv.url(&srv.bills_path()))
        .bearer_auth(&auditor.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url(&srv.bills_path()))
        .bearer_auth(&auditor.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authorization_error");
    assert_eq!(body["missing"], json!(["bill:create"]));

    let foreign = format!("/orgs/{}/branches/{}/bills", OrgId::new(), BranchId::new());
    let res = client
        .get(srv.url(&foreign))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "scope_violation");

    let other_branch = format!("/orgs/{}/branches/{}/bills", srv.org, BranchId::new());
    let res = client
        .get(srv.url(&other_branch))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url(&format!("/orgs/{}/reports", srv.org)))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "authorization_error");

    let res = client
        .get(srv.url("/orgs/not-a-uuid/reports"))
        .bearer_auth(&auditor.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_id");
}

#[tokio::test]
async fn header_target_is_required_for_scoped_route() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let manager = login(&client, &srv, MANAGER_EMAIL).await;

    let res = client
        .get(srv.url("/branch/bills"))
        .bearer_auth(&manager.access_token)
        .header("x-org-id", srv.org.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "scope_target_missing");

    let res = client
        .get(srv.url("/branch/bills"))
        .bearer_auth(&manager.access_token)
        .header("x-org-id", srv.org.to_string())
        .header("x-branch-id", srv.branch.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_and_reuse_revokes_session() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let session = login(&client, &srv, MANAGER_EMAIL).await;
    let original = format!("refresh_token={}", session.refresh_cookie);

    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, &original)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let (rotated, _) = refresh_cookie(&res).expect("rotated cookie");
    assert_ne!(rotated, session.refresh_cookie);
    let body: Value = res.json().await.unwrap();
    assert!(body["accessToken"].as_str().is_some());

    // Replaying the consumed token is reuse.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, &original)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let (cleared, _) = refresh_cookie(&res).expect("cookie cleared");
    assert!(cleared.is_empty());
    assert_eq!(error_code(res).await, "token_reuse_detected");

    // The whole session is gone, including the legitimately rotated token.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, format!("refresh_token={rotated}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "token_revoked");
}

#[tokio::test]
async fn refresh_token_can_travel_in_the_body() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let session = login(&client, &srv, MANAGER_EMAIL).await;

    let res = client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refreshToken": session.refresh_cookie }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["refreshToken"].as_str().is_some_and(|t| !t.is_empty()));

    let res = client.post(srv.url("/auth/refresh")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_and_is_idempotent() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let session = login(&client, &srv, MANAGER_EMAIL).await;
    let cookie = format!("refresh_token={}", session.refresh_cookie);

    let res = client
        .get(srv.url("/auth/session"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["active"], true);

    for _ in 0..2 {
        let res = client
            .post(srv.url("/auth/logout"))
            .header(reqwest::header::COOKIE, &cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let (cleared, raw) = refresh_cookie(&res).expect("cookie cleared");
        assert!(cleared.is_empty());
        assert!(raw.contains("Max-Age=0"));
    }

    let res = client
        .get(srv.url("/auth/session"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "token_revoked");

    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_expires_with_the_clock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let session = login(&client, &srv, MANAGER_EMAIL).await;

    srv.clock.advance(ChronoDuration::minutes(16));

    let res = client
        .get(srv.url("/me"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "authentication_error");

    // Refresh still works within the refresh window.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, format!("refresh_token={}", session.refresh_cookie))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn explain_reports_sources_and_denials() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let manager = login(&client, &srv, MANAGER_EMAIL).await;

    let res = client
        .get(srv.url("/me/explain?permission=bill:create"))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["granted"], true);
    assert_eq!(body["traces"][0]["granted_by_roles"], json!(["BRANCH_MANAGER"]));

    let res = client
        .get(srv.url("/me/explain?permission=report:org,role:assign&mode=all"))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["granted"], false);
    assert_eq!(body["denial_reason"]["kind"], "missing_permission");

    let res = client
        .get(srv.url("/me/explain?permission=bill:fly"))
        .bearer_auth(&manager.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_permission");
}

#[tokio::test]
async fn credentials_are_checked_before_the_scope_target() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/me"))
        .header("x-org-id", "garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "authentication_error");

    let res = client
        .get(srv.url("/orgs/not-a-uuid/reports"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Unscoped routes ignore target headers entirely.
    let manager = login(&client, &srv, MANAGER_EMAIL).await;
    let res = client
        .get(srv.url("/me"))
        .bearer_auth(&manager.access_token)
        .header("x-branch-id", "garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn store_outage_is_503_without_details() {
    let srv = TestServer::spawn_with(|state| state.credentials = Arc::new(UnreachableCredentials)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": MANAGER_EMAIL, "password": PASSWORD, "orgId": srv.org }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "service_unavailable");
    assert_eq!(body["message"], "service temporarily unavailable");
}

#[tokio::test]
async fn refresh_cookie_is_only_replaced_on_success() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let session = login(&client, &srv, MANAGER_EMAIL).await;
    assert!(session.set_cookie.contains("Max-Age="));

    // A malformed cookie token is rejected without touching the cookie.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, "theme=dark; refresh_token=not.a.token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(refresh_cookie(&res).is_none());

    // Cookies other than the refresh token are ignored when locating it.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(
            reqwest::header::COOKIE,
            format!("theme=dark; refresh_token={}; lang=en", session.refresh_cookie),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let (rotated, raw) = refresh_cookie(&res).expect("rotated cookie");
    assert_ne!(rotated, session.refresh_cookie);
    assert!(raw.contains("HttpOnly"));
}
