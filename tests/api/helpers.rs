use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Response;
use sha2::Sha256;
use sqlx::{migrate, Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;
use wiremock::MockServer;

use project_connect::{
    config::{get_configuration, DatabaseSettings, Settings},
    startup::{get_connection_db_pool, Application},
};

type HmacSha256 = Hmac<Sha256>;

// Same `whsec_` + base64 format the real provider issues secrets in
pub const WEBHOOK_SECRET: &str = "whsec_dGVzdC13ZWJob29rLXNlY3JldC1rZXk=";
pub const MANUAL_SEND_SECRET: &str = "manual-send-test-token";
pub const EMAIL_CLIENT_API_KEY: &str = "re_test_api_key";

pub struct TestApp {
    pub config: Settings,
    pub address: String,
    pub db_pool: PgPool,
    pub email_server: MockServer,
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        let mut config = get_configuration().expect("Missing configuration file.");
        let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));
        let email_server = MockServer::start().await;

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_email_client_base_url(email_server.uri());
        config.set_email_client_api_key(EMAIL_CLIENT_API_KEY.to_string());
        config.set_webhook_secret(WEBHOOK_SECRET.to_string());
        config.set_manual_send_secret(MANUAL_SEND_SECRET.to_string());

        let db_pool = configure_db(&mut config.database, db_test_name.clone()).await;

        let application = Application::build(config.clone())
            .await
            .expect("Failed to build application.");

        let address = format!("http://127.0.0.1:{}", application.get_port());

        tokio::spawn(application.run_until_stop());

        TestApp {
            address,
            config: config.clone(),
            db_pool,
            email_server,
        }
    }

    pub async fn post_signup(&self, body: serde_json::Value) -> Response {
        let client = reqwest::Client::new();
        let url = format!("{}/signup", self.address);

        client
            .post(&url)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_send_weekly(&self, body: serde_json::Value, token: Option<&str>) -> Response {
        let client = reqwest::Client::new();
        let url = format!("{}/prompts/send-weekly", self.address);
        let mut request = client.post(&url).json(&body);

        if let Some(token) = token {
            request = request.header("x-manual-send-secret", token);
        }

        request.send().await.expect("Failed to execute request.")
    }

    pub async fn post_inbound_webhook(
        &self,
        body: &str,
        headers: Vec<(&'static str, String)>,
    ) -> Response {
        let client = reqwest::Client::new();
        let url = format!("{}/webhooks/resend/inbound", self.address);
        let mut request = client.post(&url).body(body.to_string());

        for (name, value) in headers {
            request = request.header(name, value);
        }

        request.send().await.expect("Failed to execute request.")
    }

    pub async fn count_subscribers(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
            .fetch_one(&self.db_pool)
            .await
            .expect("Query to count subscribers failed.")
    }

    pub async fn count_responses(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM responses")
            .fetch_one(&self.db_pool)
            .await
            .expect("Query to count responses failed.")
    }
}

/// Headers a current-format provider delivery would carry, signed with the
/// real envelope algorithm.
pub fn envelope_headers(body: &str) -> Vec<(&'static str, String)> {
    let id = format!("msg_{}", Uuid::new_v4().simple());
    let timestamp = Utc::now().timestamp().to_string();
    let signature = envelope_signature(WEBHOOK_SECRET, &id, &timestamp, body);

    vec![
        ("svix-id", id),
        ("svix-timestamp", timestamp),
        ("svix-signature", format!("v1,{}", signature)),
    ]
}

/// Headers a legacy-format provider delivery would carry.
pub fn legacy_headers(body: &str) -> Vec<(&'static str, String)> {
    let timestamp = Utc::now().timestamp().to_string();
    let signature = legacy_signature(WEBHOOK_SECRET, &timestamp, body);

    vec![
        ("resend-signature", format!("v1={},v0=deadbeef", signature)),
        ("resend-timestamp", timestamp),
    ]
}

pub fn envelope_signature(secret: &str, id: &str, timestamp: &str, body: &str) -> String {
    let encoded_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let key = BASE64_STANDARD
        .decode(encoded_key)
        .expect("Webhook secret is not valid base64.");
    let mut mac = HmacSha256::new_from_slice(&key).unwrap();

    mac.update(format!("{}.{}.{}", id, timestamp, body).as_bytes());

    BASE64_STANDARD.encode(mac.finalize().into_bytes())
}

pub fn legacy_signature(secret: &str, timestamp: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();

    mac.update(format!("{}.{}", timestamp, body).as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

async fn configure_db(db_config: &mut DatabaseSettings, db_test_name: String) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect_with(&db_config.get_db_options())
        .await
        .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    // Execute migrations
    db_config.set_name(db_test_name.clone());

    let db_pool = get_connection_db_pool(db_config);

    migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run migrations.");

    db_pool
}
