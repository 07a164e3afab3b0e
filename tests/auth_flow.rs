//! End-to-end tests for the admin auth endpoints
//!
//! Every test builds the real router over an in-memory database and drives
//! it with `tower::ServiceExt::oneshot`, so the gateway, handlers and error
//! bodies are exercised exactly as a client sees them.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use rth_admin::{
    app::build_router,
    auth::{
        models::{AdminRole, Claims, NewAdmin},
        AuthState,
    },
    config::{AppConfig, RunMode},
    db::Database,
    retry::Sleeper,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    state: AuthState,
    db: Database,
}

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

const TEST_SECRET: &str = "integration-test-secret";

fn test_config(run_mode: RunMode) -> AppConfig {
    let mut config = AppConfig::with_secret(TEST_SECRET);
    config.bcrypt_cost = 4;
    config.run_mode = run_mode;
    config
}

fn setup_with(run_mode: RunMode, sleeper: Option<Arc<dyn Sleeper>>) -> TestApp {
    let db = Database::in_memory().unwrap();
    let mut state = AuthState::new(db.clone(), &test_config(run_mode));
    if let Some(sleeper) = sleeper {
        state = state.with_sleeper(sleeper);
    }

    state
        .admins
        .create(NewAdmin {
            username: "admin".to_string(),
            password: "correctpw".to_string(),
            email: Some("admin@rth-bandung.id".to_string()),
            role: AdminRole::SuperAdmin,
        })
        .unwrap();

    TestApp {
        app: build_router(state.clone(), db.clone()),
        state,
        db,
    }
}

fn setup() -> TestApp {
    setup_with(RunMode::Production, None)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await
}

async fn login_token(app: &Router) -> String {
    let (status, body) = login(app, "admin", "correctpw").await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_login_success_returns_token_for_admin() {
    let t = setup();

    let (status, body) = login(&t.app, "admin", "correctpw").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["admin"]["username"], "admin");
    assert_eq!(body["data"]["admin"]["role"], "superadmin");
    assert_eq!(body["data"]["admin"]["email"], "admin@rth-bandung.id");
    assert!(!body["data"]["admin"]["lastLogin"].is_null());
    assert!(body["data"]["admin"].get("password_hash").is_none());

    // Embedded id resolves back to the stored admin
    let token = body["data"]["token"].as_str().unwrap();
    let claims = t.state.jwt_handler.validate(token).unwrap();
    let stored = t.state.admins.find_by_username("admin").unwrap().unwrap();
    assert_eq!(claims.admin_id, stored.id.to_string());
    assert_eq!(body["data"]["admin"]["id"], stored.id.to_string());
    assert!(stored.last_login.is_some());
}

#[tokio::test]
async fn test_login_username_is_trimmed_and_case_insensitive() {
    let t = setup();
    let (status, _) = login(&t.app, "  ADMIN ", "correctpw").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_username_and_wrong_password_are_distinguishable() {
    let t = setup();

    let (status, ghost) = login(&t.app, "ghost", "x").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(ghost["success"], false);
    assert!(ghost["message"].as_str().unwrap().contains("Username"));

    let (status, wrong) = login(&t.app, "admin", "wrongpw").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(wrong["message"].as_str().unwrap().contains("Password"));

    assert_ne!(ghost["message"], wrong["message"]);
}

#[tokio::test]
async fn test_login_validation_errors() {
    let t = setup();

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = login(&t.app, "", "correctpw").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Non-JSON body still gets a structured error
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_profile_requires_valid_token() {
    let t = setup();

    let (status, body) = send(&t.app, Method::GET, "/api/auth/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &t.app,
        Method::GET,
        "/api/auth/profile",
        Some("not.a.jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login_token(&t.app).await;
    let (status, body) = send(&t.app, Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["admin"]["username"], "admin");
    assert!(body["data"]["admin"].get("createdAt").is_some());
}

#[tokio::test]
async fn test_token_for_unknown_admin_rejected() {
    let t = setup();
    let (token, _) = t.state.jwt_handler.issue(&Uuid::new_v4()).unwrap();

    let (status, body) = send(&t.app, Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Admin not found");
}

#[tokio::test]
async fn test_token_with_malformed_admin_id_rejected() {
    let t = setup();
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        admin_id: "not-a-uuid".to_string(),
        jti: Uuid::new_v4().simple().to_string(),
        iat: now,
        exp: now + 3600,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();

    let (status, body) = send(&t.app, Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Admin not found");
}

#[tokio::test]
async fn test_login_survives_failed_last_login_update() {
    let t = setup();
    t.db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TRIGGER block_last_login BEFORE UPDATE OF last_login ON admins
             BEGIN SELECT RAISE(FAIL, 'last_login is read-only'); END;",
        )
    })
    .unwrap();

    let (status, body) = login(&t.app, "admin", "correctpw").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"]["token"].as_str().unwrap().is_empty());
    assert!(body["data"]["admin"]["lastLogin"].is_null());

    let stored = t.state.admins.find_by_username("admin").unwrap().unwrap();
    assert!(stored.last_login.is_none());
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let t = setup();
    let token = login_token(&t.app).await;

    let (status, body) = send(&t.app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Rejected on every later use, well before natural expiry
    for _ in 0..2 {
        let (status, body) =
            send(&t.app, Method::GET, "/api/auth/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token has been revoked");
    }

    // A fresh login gets a working token again
    let fresh = login_token(&t.app).await;
    let (status, _) = send(&t.app, Method::GET, "/api/auth/profile", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_without_token_succeeds() {
    let t = setup();

    let (status, body) = send(&t.app, Method::POST, "/api/auth/logout", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Logging out twice with the same token is harmless
    let token = login_token(&t.app).await;
    for _ in 0..2 {
        let (status, _) = send(&t.app, Method::POST, "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_change_password_too_short_keeps_hash() {
    let t = setup();
    let token = login_token(&t.app).await;
    let before = t.state.admins.find_by_username("admin").unwrap().unwrap();

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/auth/change-password",
        Some(&token),
        Some(json!({ "currentPassword": "correctpw", "newPassword": "12345" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let after = t.state.admins.find_by_username("admin").unwrap().unwrap();
    assert_eq!(after.password_hash, before.password_hash);
}

#[tokio::test]
async fn test_change_password_flow() {
    let t = setup();
    let token = login_token(&t.app).await;

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/auth/change-password",
        Some(&token),
        Some(json!({ "currentPassword": "not-it", "newPassword": "brandnewpw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Current password is incorrect");

    let (status, _) = send(
        &t.app,
        Method::POST,
        "/api/auth/change-password",
        Some(&token),
        Some(json!({ "currentPassword": "correctpw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/auth/change-password",
        Some(&token),
        Some(json!({ "currentPassword": "correctpw", "newPassword": "brandnewpw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = login(&t.app, "admin", "correctpw").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&t.app, "admin", "brandnewpw").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_admin_short_password_writes_nothing() {
    let t = setup();
    let token = login_token(&t.app).await;

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/auth/admins",
        Some(&token),
        Some(json!({ "username": "Admin", "password": "short" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(t.state.admins.count_admins().unwrap(), 1);
}

#[tokio::test]
async fn test_create_admin_and_case_insensitive_duplicate() {
    let t = setup();
    let token = login_token(&t.app).await;

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/auth/admins",
        Some(&token),
        Some(json!({ "username": "Operator", "password": "operatorpw", "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["admin"]["username"], "operator");
    assert_eq!(body["data"]["admin"]["isActive"], true);
    assert!(body["data"]["admin"]["email"].is_null());
    assert!(body["data"]["admin"].get("password").is_none());

    let (status, body) = send(
        &t.app,
        Method::POST,
        "/api/auth/admins",
        Some(&token),
        Some(json!({ "username": "OPERATOR", "password": "operatorpw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username is already taken");
    assert_eq!(t.state.admins.count_admins().unwrap(), 2);

    // The new admin can log in with any casing
    let (status, _) = login(&t.app, "oPeRaToR", "operatorpw").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_admin_requires_token_and_valid_role() {
    let t = setup();

    let (status, _) = send(
        &t.app,
        Method::POST,
        "/api/auth/admins",
        None,
        Some(json!({ "username": "operator", "password": "operatorpw" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login_token(&t.app).await;
    let (status, _) = send(
        &t.app,
        Method::POST,
        "/api/auth/admins",
        Some(&token),
        Some(json!({ "username": "operator", "password": "operatorpw", "role": "root" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_store_outage_retries_then_hides_detail() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let t = setup_with(RunMode::Production, Some(sleeper.clone()));
    t.db.with_conn(|conn| conn.execute_batch("DROP TABLE admins"))
        .unwrap();

    let (status, body) = login(&t.app, "admin", "correctpw").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body.get("error").is_none());
    assert_eq!(
        *sleeper.delays.lock(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_development_mode_echoes_error_detail() {
    let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::default());
    let t = setup_with(RunMode::Development, Some(sleeper));
    t.db.with_conn(|conn| conn.execute_batch("DROP TABLE admins"))
        .unwrap();

    let (status, body) = login(&t.app, "admin", "correctpw").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_health_reports_store_status() {
    let t = setup();
    let (status, body) = send(&t.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
