/// End-to-end auth flow tests against a live in-process server
use gidipin::{
    config::{
        AuthConfig, HttpConfig, LoggingConfig, PinConfig, RateLimitConfig, ServiceConfig,
        StorageConfig, VerificationConfig,
    },
    context::AppContext,
    session::{FileSessionStore, HttpRefreshTransport, SessionEvent, SessionManager},
};
use std::sync::Arc;

fn test_config(data_dir: &std::path::Path) -> ServiceConfig {
    ServiceConfig {
        service: HttpConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            data_directory: data_dir.to_path_buf(),
            auth_db: data_dir.join("auth.sqlite"),
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret-0123456789abcdef".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 2_592_000,
            rotation_policy: "every_nth:1".to_string(),
        },
        verification: VerificationConfig {
            cooldown_secs: 60,
            code_ttl_secs: 900,
            retention_days: 7,
        },
        pin: PinConfig {
            max_failed_attempts: 5,
            lockout_secs: 1800,
        },
        email: None,
        sms: None,
        rate_limit: RateLimitConfig {
            enabled: false,
            requests_per_second: 10,
            burst_size: 50,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
    }
}

/// Bind an ephemeral port and serve the router from a background task
async fn spawn_server(ctx: AppContext) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = gidipin::server::build_router(ctx);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn setup() -> (AppContext, String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = AppContext::new(test_config(dir.path())).await.unwrap();
    let base_url = spawn_server(ctx.clone()).await;
    (ctx, base_url, dir)
}

#[tokio::test]
async fn pin_login_refresh_logout_flow() {
    let (ctx, base_url, _dir) = setup().await;
    let client = reqwest::Client::new();

    ctx.pin_guard.set_pin("user-1", "482913").await.unwrap();

    // Wrong PIN is a 401 with its own code
    let resp = client
        .post(format!("{}/auth/pin/verify", base_url))
        .json(&serde_json::json!({ "userId": "user-1", "pin": "000000" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "INCORRECT_PIN");

    // Correct PIN issues a pair
    let resp = client
        .post(format!("{}/auth/pin/verify", base_url))
        .json(&serde_json::json!({ "userId": "user-1", "pin": "482913" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let pair: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(pair["userId"], "user-1");
    let refresh_token = pair["refreshToken"].as_str().unwrap().to_string();
    assert!(pair["accessToken"].as_str().unwrap().contains('.'));
    assert!(pair["expiresAt"].is_string());

    // Refresh rotates (policy every_nth:1) and returns a fresh pair
    let resp = client
        .post(format!("{}/auth/refresh", base_url))
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let refreshed: serde_json::Value = resp.json().await.unwrap();
    let rotated_token = refreshed["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated_token, refresh_token);

    // The pre-rotation token no longer resolves
    let resp = client
        .post(format!("{}/auth/refresh", base_url))
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "INVALID_REFRESH_TOKEN");

    // Logout revokes; a revoked token reads the same as an unknown one
    let resp = client
        .post(format!("{}/auth/logout", base_url))
        .json(&serde_json::json!({ "refreshToken": rotated_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/auth/refresh", base_url))
        .json(&serde_json::json!({ "refreshToken": rotated_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "INVALID_REFRESH_TOKEN");
}

#[tokio::test]
async fn verification_code_flow() {
    let (ctx, base_url, _dir) = setup().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/auth/code/send", base_url))
        .json(&serde_json::json!({ "identifier": "a@b.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    // No delivery channel is configured in tests; read the issued code
    // from the store
    let code: String =
        sqlx::query_scalar("SELECT code FROM verification_code WHERE identifier = 'a@b.com'")
            .fetch_one(&ctx.db)
            .await
            .unwrap();

    // Wrong code
    let resp = client
        .post(format!("{}/auth/code/verify", base_url))
        .json(&serde_json::json!({ "identifier": "a@b.com", "code": "000000" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "ERR_INVALID_CODE");

    // Correct code
    let resp = client
        .post(format!("{}/auth/code/verify", base_url))
        .json(&serde_json::json!({ "identifier": "a@b.com", "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Reuse fails with the same code as a wrong submission
    let resp = client
        .post(format!("{}/auth/code/verify", base_url))
        .json(&serde_json::json!({ "identifier": "a@b.com", "code": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "ERR_INVALID_CODE");

    // A second issuance inside the cooldown reports the remaining wait
    let resp = client
        .post(format!("{}/auth/code/send", base_url))
        .json(&serde_json::json!({ "identifier": "a@b.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "ERR_RATE_LIMIT");
    assert!(body["remainingSeconds"].as_u64().unwrap() <= 60);
}

#[tokio::test]
async fn pin_lockout_over_http() {
    let (ctx, base_url, _dir) = setup().await;
    let client = reqwest::Client::new();

    ctx.pin_guard.set_pin("user-2", "482913").await.unwrap();

    for _ in 0..5 {
        let resp = client
            .post(format!("{}/auth/pin/verify", base_url))
            .json(&serde_json::json!({ "userId": "user-2", "pin": "111111" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }

    // Sixth attempt with the correct PIN is rejected as locked, with a
    // concrete remaining wait
    let resp = client
        .post(format!("{}/auth/pin/verify", base_url))
        .json(&serde_json::json!({ "userId": "user-2", "pin": "482913" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 423);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "ACCOUNT_LOCKED");
    assert!(body["remainingSeconds"].as_u64().unwrap() <= 1800);
}

#[tokio::test]
async fn session_manager_against_live_server() {
    let (ctx, base_url, dir) = setup().await;

    ctx.pin_guard.set_pin("user-3", "482913").await.unwrap();
    let pair = ctx
        .pin_guard
        .verify_pin("user-3", "482913", &Default::default())
        .await
        .unwrap();

    let store = Arc::new(FileSessionStore::new(dir.path().join("session.json")));
    let transport = Arc::new(HttpRefreshTransport::new(base_url.clone()));
    let manager = SessionManager::new(store, transport);
    let mut events = manager.subscribe();

    manager
        .set_session(&pair.access_token, &pair.refresh_token)
        .await
        .unwrap();
    assert!(manager.is_authenticated());
    assert_eq!(manager.user_id().as_deref(), Some("user-3"));

    // Manual refresh exchanges against the real endpoint (and rotates)
    assert!(manager.refresh_now().await.unwrap());
    assert!(manager.is_authenticated());

    // Revoke the session server-side; the next refresh is terminal
    let current = manager.access_token().unwrap();
    assert!(current.contains('.'));
    let refresh_token: String = sqlx::query_scalar(
        "SELECT refresh_token FROM auth_session WHERE user_id = 'user-3' AND is_active = 1",
    )
    .fetch_one(&ctx.db)
    .await
    .unwrap();
    ctx.token_issuer.revoke(&refresh_token).await.unwrap();

    assert!(manager.refresh_now().await.is_err());
    assert!(!manager.is_authenticated());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
}

#[tokio::test]
async fn a_restarted_manager_resumes_from_disk() {
    let (ctx, base_url, dir) = setup().await;

    ctx.pin_guard.set_pin("user-4", "482913").await.unwrap();
    let pair = ctx
        .pin_guard
        .verify_pin("user-4", "482913", &Default::default())
        .await
        .unwrap();

    let path = dir.path().join("session.json");

    {
        let store = Arc::new(FileSessionStore::new(&path));
        let transport = Arc::new(HttpRefreshTransport::new(base_url.clone()));
        let manager = SessionManager::new(store, transport);
        manager
            .set_session(&pair.access_token, &pair.refresh_token)
            .await
            .unwrap();
    }

    // A new manager over the same storage adopts the persisted session
    let store = Arc::new(FileSessionStore::new(&path));
    let transport = Arc::new(HttpRefreshTransport::new(base_url));
    let manager = SessionManager::new(store, transport);
    assert!(manager.init().await);
    assert_eq!(manager.user_id().as_deref(), Some("user-4"));
}
