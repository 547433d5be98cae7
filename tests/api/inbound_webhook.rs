use sqlx::{postgres::PgRow, Row};

use crate::helpers::{envelope_headers, legacy_headers, legacy_signature, TestApp, WEBHOOK_SECRET};

struct StoredResponse {
    from_email: String,
    subject: String,
    body_text: String,
    provider_message_id: Option<String>,
}

async fn fetch_responses(test_app: &TestApp) -> Vec<StoredResponse> {
    sqlx::query("SELECT from_email, subject, body_text, provider_message_id FROM responses;")
        .map(|row: PgRow| StoredResponse {
            from_email: row.get("from_email"),
            subject: row.get("subject"),
            body_text: row.get("body_text"),
            provider_message_id: row.get("provider_message_id"),
        })
        .fetch_all(&test_app.db_pool)
        .await
        .expect("Query to fetch responses failed.")
}

#[tokio::test]
async fn valid_envelope_delivery_stores_a_response_for_a_new_subscriber() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "type": "email.received",
        "data": {
            "from": "A@Example.com",
            "subject": "Re: this week",
            "text": "hello",
            "email_id": "msg_abc123"
        }
    })
    .to_string();

    let response = test_app
        .post_inbound_webhook(&body, envelope_headers(&body))
        .await;

    assert_eq!(200, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(response_body["ok"], true);

    let subscriber_email: String = sqlx::query_scalar("SELECT email FROM subscribers;")
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Query to fetch subscribers failed.");
    assert_eq!(subscriber_email, "a@example.com");

    let stored = fetch_responses(&test_app).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].from_email, "a@example.com");
    assert_eq!(stored[0].subject, "Re: this week");
    assert_eq!(stored[0].body_text, "hello");
    assert_eq!(stored[0].provider_message_id.as_deref(), Some("msg_abc123"));
}

#[tokio::test]
async fn delivery_without_signature_headers_is_rejected() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "data": { "from": "a@example.com", "text": "hello" }
    })
    .to_string();

    let response = test_app.post_inbound_webhook(&body, vec![]).await;

    assert_eq!(401, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(response_body["error"], "Invalid signature");

    // Nothing may touch storage for an unauthenticated delivery
    assert_eq!(test_app.count_subscribers().await, 0);
    assert_eq!(test_app.count_responses().await, 0);
}

#[tokio::test]
async fn delivery_signed_with_another_secret_is_rejected() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "data": { "from": "a@example.com", "text": "hello" }
    })
    .to_string();

    let mut headers = envelope_headers(&body);
    headers[2].1 = String::from("v1,Zm9yZ2VkLXNpZ25hdHVyZS1ub3Qtb3Vycw==");

    let response = test_app.post_inbound_webhook(&body, headers).await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(test_app.count_responses().await, 0);
}

#[tokio::test]
async fn authenticated_delivery_with_empty_body_is_rejected() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "type": "email.received",
        "data": { "from": "a@example.com", "text": "", "html": "" }
    })
    .to_string();

    let response = test_app
        .post_inbound_webhook(&body, envelope_headers(&body))
        .await;

    assert_eq!(400, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(response_body["error"], "Missing inbound payload fields");

    assert_eq!(test_app.count_responses().await, 0);
}

#[tokio::test]
async fn authenticated_delivery_without_sender_is_rejected() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "data": { "text": "hello" }
    })
    .to_string();

    let response = test_app
        .post_inbound_webhook(&body, envelope_headers(&body))
        .await;

    assert_eq!(400, response.status().as_u16());
    assert_eq!(test_app.count_subscribers().await, 0);
}

#[tokio::test]
async fn concurrent_deliveries_from_a_new_address_create_one_subscriber() {
    let test_app = TestApp::spawn_app().await;
    let first_body = serde_json::json!({
        "data": { "from": "jane@x.com", "text": "first answer" }
    })
    .to_string();
    let second_body = serde_json::json!({
        "data": { "from": "Jane <jane@x.com>", "text": "second answer" }
    })
    .to_string();

    let (first, second) = tokio::join!(
        test_app.post_inbound_webhook(&first_body, envelope_headers(&first_body)),
        test_app.post_inbound_webhook(&second_body, envelope_headers(&second_body)),
    );

    assert_eq!(200, first.status().as_u16());
    assert_eq!(200, second.status().as_u16());

    // The uniqueness constraint on email serializes the two resolves
    assert_eq!(test_app.count_subscribers().await, 1);
    assert_eq!(test_app.count_responses().await, 2);
}

#[tokio::test]
async fn repeated_delivery_of_the_same_message_stores_two_responses() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "data": { "from": "jane@x.com", "text": "hello", "email_id": "msg_retry" }
    })
    .to_string();

    for _ in 0..2 {
        let response = test_app
            .post_inbound_webhook(&body, envelope_headers(&body))
            .await;
        assert_eq!(200, response.status().as_u16());
    }

    // Provider retries are not deduplicated; each accepted delivery is a row
    assert_eq!(test_app.count_subscribers().await, 1);
    assert_eq!(test_app.count_responses().await, 2);
}

#[tokio::test]
async fn html_only_delivery_stores_the_stripped_body() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "data": { "from": "jane@x.com", "html": "<p>Hi from <b>Lisbon</b></p>" }
    })
    .to_string();

    let response = test_app
        .post_inbound_webhook(&body, envelope_headers(&body))
        .await;

    assert_eq!(200, response.status().as_u16());

    let stored = fetch_responses(&test_app).await;
    assert_eq!(stored[0].body_text, "Hi from  Lisbon");
}

#[tokio::test]
async fn legacy_scheme_delivery_is_accepted() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "data": { "from": "jane@x.com", "text": "hello" }
    })
    .to_string();

    let response = test_app
        .post_inbound_webhook(&body, legacy_headers(&body))
        .await;

    assert_eq!(200, response.status().as_u16());
    assert_eq!(test_app.count_responses().await, 1);
}

#[tokio::test]
async fn tampered_legacy_signature_is_rejected() {
    let test_app = TestApp::spawn_app().await;
    let body = serde_json::json!({
        "data": { "from": "jane@x.com", "text": "hello" }
    })
    .to_string();

    let timestamp = chrono::Utc::now().timestamp().to_string();
    let mut signature = legacy_signature(WEBHOOK_SECRET, &timestamp, &body);
    let swapped = if signature.ends_with('0') { '1' } else { '0' };
    signature.pop();
    signature.push(swapped);
    let headers = vec![
        ("resend-signature", format!("v1={}", signature)),
        ("resend-timestamp", timestamp),
    ];

    let response = test_app.post_inbound_webhook(&body, headers).await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(test_app.count_responses().await, 0);
}

#[tokio::test]
async fn non_post_requests_are_rejected_with_allow_header() {
    let test_app = TestApp::spawn_app().await;
    let client = reqwest::Client::new();
    let url = format!("{}/webhooks/resend/inbound", test_app.address);

    let response = client
        .get(&url)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(405, response.status().as_u16());
    assert_eq!(
        response.headers().get("allow").map(|allow| allow.to_str().unwrap()),
        Some("POST")
    );
}
