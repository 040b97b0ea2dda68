// tests/common/mod.rs

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use titlehub::{
    config::Config,
    routes,
    state::AppState,
    utils::mailer::{Email, Mailer},
};
use tokio::sync::{Mutex, mpsc};

/// Hands every outgoing message to the test instead of delivering it.
struct CapturingMailer {
    outbox: mpsc::UnboundedSender<Email>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: Email) -> Result<(), String> {
        self.outbox.send(email).map_err(|e| e.to_string())
    }
}

pub struct TestApp {
    pub address: String,
    pub pool: PgPool,
    pub client: reqwest::Client,
    inbox: Mutex<mpsc::UnboundedReceiver<Email>>,
}

/// Spawns the app on a random port for testing.
///
/// Returns `None` when `DATABASE_URL` is not set so the suite can run
/// without a Postgres instance.
pub async fn spawn_app() -> Option<TestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping integration test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let (outbox, inbox) = mpsc::unbounded_channel();
    let state = AppState {
        pool: pool.clone(),
        config: Config::for_tests(&database_url),
        mailer: Arc::new(CapturingMailer { outbox }),
    };

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    Some(TestApp {
        address: format!("http://127.0.0.1:{}/api/v1", port),
        pool,
        client: reqwest::Client::new(),
        inbox: Mutex::new(inbox),
    })
}

/// A short unique suffix for usernames, emails and slugs.
pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..10])
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn signup(&self, username: &str, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/signup/"))
            .json(&serde_json::json!({ "username": username, "email": email }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Waits for the next confirmation mail and pulls the code out of it.
    pub async fn next_code(&self) -> String {
        let email = tokio::time::timeout(Duration::from_secs(5), self.inbox.lock().await.recv())
            .await
            .expect("No mail was sent")
            .expect("Mailer channel closed");

        email
            .body
            .lines()
            .find_map(|line| line.strip_prefix("Your confirmation code: "))
            .expect("Mail carries no confirmation code")
            .trim()
            .to_string()
    }

    pub async fn exchange(&self, username: &str, code: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/token/"))
            .json(&serde_json::json!({ "username": username, "confirmation_code": code }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Signs up a fresh user and returns (username, token).
    pub async fn register(&self, prefix: &str) -> (String, String) {
        let username = unique(prefix);
        let email = format!("{}@example.com", username);

        let response = self.signup(&username, &email).await;
        assert_eq!(response.status().as_u16(), 200);

        let code = self.next_code().await;
        let body: serde_json::Value = self
            .exchange(&username, &code)
            .await
            .json()
            .await
            .expect("Failed to parse token json");
        let token = body["token"].as_str().expect("Token not found").to_string();

        (username, token)
    }

    /// Signs up a fresh user and promotes them before returning the token.
    pub async fn register_with_role(&self, prefix: &str, role: &str) -> (String, String) {
        let (username, token) = self.register(prefix).await;
        sqlx::query("UPDATE users SET role = $1 WHERE username = $2")
            .bind(role)
            .bind(&username)
            .execute(&self.pool)
            .await
            .expect("Failed to set role");
        (username, token)
    }

    pub async fn create_catalog_entry(&self, token: &str, kind: &str, slug: &str) {
        let response = self
            .client
            .post(self.url(&format!("/{}/", kind)))
            .bearer_auth(token)
            .json(&serde_json::json!({ "name": slug, "slug": slug }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
    }

    pub async fn create_title(
        &self,
        token: &str,
        name: &str,
        year: i32,
        category: &str,
        genres: &[&str],
    ) -> serde_json::Value {
        let response = self
            .client
            .post(self.url("/titles/"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "name": name,
                "year": year,
                "category": category,
                "genre": genres,
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("Failed to parse title json")
    }

    pub async fn post_review(&self, token: &str, title_id: i64, score: i32) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/titles/{}/reviews/", title_id)))
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": "Worth watching.", "score": score }))
            .send()
            .await
            .expect("Failed to execute request")
    }
}
