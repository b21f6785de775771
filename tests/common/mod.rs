#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use budget_buddy_server::{
    AppState, Gateway, JobHealth, constants::*, database,
    gateway::Record,
    models::{Category, Subscription, Transaction, User},
    routes,
};
use serde_json::Value;
use time::{Date, Duration, OffsetDateTime};
use tower::util::ServiceExt;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};
use uuid::Uuid;

#[derive(Clone)]
pub struct TestConfig {
    pub temp_dir_path: String,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let temp_dir_path = temp_dir.path().to_string_lossy().to_string();
        std::mem::forget(temp_dir);
        Ok(Self { temp_dir_path })
    }

    pub fn data_path(&self) -> String {
        self.temp_dir_path.clone()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub async fn setup_gateway() -> anyhow::Result<Gateway> {
    let test_config = TestConfig::new()?;
    let db = database::init_db(&test_config.data_path())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;
    Ok(Gateway::new(db))
}

pub async fn setup_test_app() -> anyhow::Result<TestApp> {
    let gateway = setup_gateway().await?;

    let app_state = AppState {
        gateway,
        job_health: JobHealth::new(),
        deletion_grace_days: DEFAULT_ACCOUNT_DELETION_GRACE_DAYS,
    };

    let session_secret = "test_secret_key_at_least_64_chars_long_test_secret_key_at_least_64_";
    let session_key = Key::try_from(session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_EXPIRY_DAYS)))
        .with_signed(session_key);

    let router = routes::api_routes()
        .layer(session_layer)
        .with_state(app_state.clone());

    Ok(TestApp {
        router,
        state: app_state,
    })
}

/// Saves `record` in its own transaction.
pub async fn insert<R>(gateway: &Gateway, record: R) -> anyhow::Result<R>
where
    R: Record + Send + Sync + 'static,
{
    let saved = gateway
        .run_in_transaction(|tx| {
            Box::pin(async move {
                tx.save(&record).await?;
                Ok::<_, budget_buddy_server::GatewayError>(record)
            })
        })
        .await?;
    Ok(saved)
}

pub async fn create_test_user(
    app_state: &AppState,
    username: &str,
    password: &str,
) -> anyhow::Result<String> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use password_hash::rand_core::OsRng;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    let user = insert(
        &app_state.gateway,
        User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash,
            marked_for_deletion: None,
        },
    )
    .await?;

    Ok(user.id)
}

/// A user row without a usable password, for job tests that never log in.
pub async fn create_user_marked_for_deletion(
    gateway: &Gateway,
    username: &str,
    marked_for_deletion: Option<Date>,
) -> anyhow::Result<String> {
    let user = insert(
        gateway,
        User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: "unused".to_string(),
            marked_for_deletion,
        },
    )
    .await?;
    Ok(user.id)
}

pub async fn create_category(gateway: &Gateway, owner: &str, name: &str) -> anyhow::Result<String> {
    let category = insert(
        gateway,
        Category {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        },
    )
    .await?;
    Ok(category.id)
}

pub fn transaction(
    owner: &str,
    amount: f64,
    processed_at: OffsetDateTime,
    category: Option<&str>,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4().to_string(),
        owner: owner.to_string(),
        category: category.map(str::to_string),
        payment_method: "card".to_string(),
        processed_at,
        receiver: "Corner Shop".to_string(),
        information: "test".to_string(),
        transfer_amount: amount,
    }
}

pub fn subscription(owner: &str, amount: f64, execute_at: u8, paused: bool) -> Subscription {
    Subscription {
        id: Uuid::new_v4().to_string(),
        owner: owner.to_string(),
        category: None,
        payment_method: "bank transfer".to_string(),
        receiver: "Streaming Service".to_string(),
        information: format!("monthly on day {}", execute_at),
        transfer_amount: amount,
        execute_at,
        paused,
    }
}

pub async fn count_rows(gateway: &Gateway, table: &str) -> anyhow::Result<i64> {
    let conn = gateway.db().read().await;
    let mut rows = conn
        .query(&format!("SELECT COUNT(*) FROM {}", table), ())
        .await?;
    let row = rows
        .next()
        .await?
        .ok_or_else(|| anyhow::anyhow!("COUNT returned no rows"))?;
    Ok(row.get::<i64>(0)?)
}

pub async fn login_user(app: &Router, username: &str, password: &str) -> anyhow::Result<String> {
    let payload = serde_json::json!({
        "username": username,
        "password": password
    });

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("No session cookie in response"))?;

    Ok(set_cookie.to_string())
}

pub async fn auth_request(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
) -> anyhow::Result<(StatusCode, String)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::empty())
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;
    let body_str = String::from_utf8(body.to_vec())?;

    Ok((status, body_str))
}

/// Like [`auth_request`], with the body parsed as JSON when possible.
pub async fn json_request(
    app: &TestApp,
    method: &str,
    uri: &str,
    cookie: &str,
) -> (StatusCode, Value) {
    let (status, body) = auth_request(&app.router, method, uri, cookie)
        .await
        .expect("execute request");
    let body = serde_json::from_str(&body).unwrap_or(Value::String(body));
    (status, body)
}

/// Creates the user directly in the database and logs them in.
pub async fn logged_in_user(app: &TestApp, username: &str) -> (String, String) {
    let user_id = create_test_user(&app.state, username, "password123")
        .await
        .expect("create test user");
    let cookie = login_user(&app.router, username, "password123")
        .await
        .expect("login");
    (user_id, cookie)
}
