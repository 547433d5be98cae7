use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::domain::{
    prompt::{Prompt, PromptText},
    response::NewResponse,
    subscriber::Subscriber,
    subscriber_status::SubscriberStatus,
};

fn map_subscriber_row(row: PgRow) -> Subscriber {
    Subscriber {
        id: row.get("id"),
        email: row.get("email"),
        status: SubscriberStatus::parse(row.get("status")).unwrap(),
        subscribed_at: row.get("subscribed_at"),
        last_prompt_sent_at: row.get("last_prompt_sent_at"),
    }
}

#[tracing::instrument(name = "Find a subscriber by email", skip(db_pool))]
pub async fn find_subscriber_by_email(
    db_pool: &PgPool,
    email: &str,
) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query(
        r#"
        SELECT id, email, status, subscribed_at, last_prompt_sent_at
        FROM subscribers
        WHERE email = $1
        "#,
    )
    .bind(email)
    .map(map_subscriber_row)
    .fetch_optional(db_pool)
    .await
}

/// Reactivating upsert used by signup: an address that unsubscribed and signs
/// up again becomes active, keeping its identity.
#[tracing::instrument(name = "Upsert a subscriber", skip(db_pool))]
pub async fn upsert_subscriber(db_pool: &PgPool, email: &str) -> Result<Subscriber, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO subscribers (id, email, status, subscribed_at)
        VALUES ($1, $2, 'active', $3)
        ON CONFLICT (email) DO UPDATE SET status = 'active'
        RETURNING id, email, status, subscribed_at, last_prompt_sent_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(Utc::now())
    .map(map_subscriber_row)
    .fetch_one(db_pool)
    .await
}

/// Maps a sender address to a subscriber, creating an active one if absent.
/// The insert is an insert-or-no-op keyed on the email uniqueness constraint:
/// two concurrent resolves for a new address serialize to a single winner and
/// the loser re-reads the winner's row.
#[tracing::instrument(name = "Resolve a subscriber by email", skip(db_pool))]
pub async fn resolve_subscriber(db_pool: &PgPool, email: &str) -> Result<Subscriber, sqlx::Error> {
    if let Some(subscriber) = find_subscriber_by_email(db_pool, email).await? {
        return Ok(subscriber);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO subscribers (id, email, status, subscribed_at)
        VALUES ($1, $2, 'active', $3)
        ON CONFLICT (email) DO NOTHING
        RETURNING id, email, status, subscribed_at, last_prompt_sent_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(Utc::now())
    .map(map_subscriber_row)
    .fetch_optional(db_pool)
    .await?;

    match inserted {
        Some(subscriber) => Ok(subscriber),
        // Lost the insert race: another delivery created the row first.
        None => find_subscriber_by_email(db_pool, email)
            .await?
            .ok_or(sqlx::Error::RowNotFound),
    }
}

#[tracing::instrument(name = "Insert a response", skip(db_pool, response))]
pub async fn create_response(db_pool: &PgPool, response: &NewResponse) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO responses
            (id, subscriber_id, prompt_id, provider_message_id, from_email, subject, body_text, received_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(response.subscriber_id)
    .bind(response.prompt_id)
    .bind(response.provider_message_id.as_deref())
    .bind(response.from_email.as_str())
    .bind(response.subject.as_str())
    .bind(response.body_text.as_str())
    .bind(response.received_at)
    .execute(db_pool)
    .await?;

    Ok(())
}

#[tracing::instrument(name = "Insert a prompt", skip(db_pool, prompt_text))]
pub async fn create_prompt(
    db_pool: &PgPool,
    prompt_text: &PromptText,
) -> Result<Prompt, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO prompts (id, prompt_text, sent_at)
        VALUES ($1, $2, $3)
        RETURNING id, prompt_text, sent_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(prompt_text.as_ref())
    .bind(Utc::now())
    .map(|row: PgRow| Prompt {
        id: row.get("id"),
        prompt_text: row.get("prompt_text"),
        sent_at: row.get("sent_at"),
    })
    .fetch_one(db_pool)
    .await
}

#[tracing::instrument(name = "List active subscribers", skip(db_pool))]
pub async fn get_active_subscribers(db_pool: &PgPool) -> Result<Vec<Subscriber>, sqlx::Error> {
    sqlx::query(
        r#"
        SELECT id, email, status, subscribed_at, last_prompt_sent_at
        FROM subscribers
        WHERE status = 'active'
        "#,
    )
    .map(map_subscriber_row)
    .fetch_all(db_pool)
    .await
}

#[tracing::instrument(name = "Stamp last prompt sent at", skip(db_pool, subscriber_ids))]
pub async fn set_last_prompt_sent_at(
    db_pool: &PgPool,
    subscriber_ids: &[Uuid],
    sent_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    if subscriber_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        UPDATE subscribers
        SET last_prompt_sent_at = $1
        WHERE id = ANY($2)
        "#,
    )
    .bind(sent_at)
    .bind(subscriber_ids)
    .execute(db_pool)
    .await?;

    Ok(())
}
