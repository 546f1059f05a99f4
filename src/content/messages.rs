use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete as delete_route, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::ListParams;
use crate::{
    auth::{repo_types::User, AdminUser},
    error::{ApiResult, AppError, Envelope},
    mailer::reply_mail,
    state::AppState,
    validation::{not_blank, one_of, ApiPath, ApiQuery, ValidJson},
};

pub const MESSAGE_STATUSES: &[&str] = &["UNREAD", "READ", "REPLIED", "ARCHIVED"];

const COLUMNS: &str = "id, user_id, name, email, subject, message, status, replied_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub replied_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn message_status(value: &str) -> Result<(), ValidationError> {
    one_of(value, MESSAGE_STATUSES, "status")
}

/// Body of the public contact form.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ContactInput {
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[validate(length(min = 1, max = 5000), custom(function = "not_blank"))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StatusInput {
    #[validate(custom(function = "message_status"))]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReplyInput {
    #[validate(length(min = 1, max = 10000), custom(function = "not_blank"))]
    pub body: String,
}

// ---- repo ----

pub async fn list(db: &PgPool, owner: Uuid, status: Option<&str>) -> Result<Vec<ContactMessage>, sqlx::Error> {
    sqlx::query_as::<_, ContactMessage>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM contact_messages
         WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
         ORDER BY created_at DESC
        "#
    ))
    .bind(owner)
    .bind(status)
    .fetch_all(db)
    .await
}

pub async fn find(db: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<ContactMessage>, sqlx::Error> {
    sqlx::query_as::<_, ContactMessage>(&format!(
        "SELECT {COLUMNS} FROM contact_messages WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(owner)
    .fetch_optional(db)
    .await
}

pub async fn create(db: &PgPool, owner: Uuid, m: &ContactInput) -> Result<ContactMessage, sqlx::Error> {
    sqlx::query_as::<_, ContactMessage>(&format!(
        r#"
        INSERT INTO contact_messages (user_id, name, email, subject, message)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(m.name.trim())
    .bind(m.email.trim().to_lowercase())
    .bind(m.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(&m.message)
    .fetch_one(db)
    .await
}

pub async fn set_status(
    db: &PgPool,
    owner: Uuid,
    id: Uuid,
    status: &str,
) -> Result<Option<ContactMessage>, sqlx::Error> {
    sqlx::query_as::<_, ContactMessage>(&format!(
        r#"
        UPDATE contact_messages SET status = $3, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .bind(status)
    .fetch_optional(db)
    .await
}

pub async fn mark_replied(db: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<ContactMessage>, sqlx::Error> {
    sqlx::query_as::<_, ContactMessage>(&format!(
        r#"
        UPDATE contact_messages
           SET status = 'REPLIED', replied_at = now(), updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, owner: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM contact_messages WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---- handlers ----

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/messages", get(list_messages))
        .route("/admin/messages/:id", delete_route(delete_message))
        .route("/admin/messages/:id/status", put(update_status))
        .route("/admin/messages/:id/reply", post(reply))
}

pub fn contact_routes() -> Router<AppState> {
    Router::new().route("/contact", post(submit_contact))
}

/// Public contact form; the message lands in the portfolio owner's inbox.
#[instrument(skip(state, input))]
pub async fn submit_contact(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<ContactInput>,
) -> Result<(StatusCode, Json<Envelope<()>>), AppError> {
    let owner = User::find_owner(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Portfolio owner not found".into()))?;
    let msg = create(&state.db, owner.id, &input).await?;
    info!(message_id = %msg.id, from = %msg.email, "contact message received");
    Ok((StatusCode::CREATED, Json(Envelope::done())))
}

#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Vec<ContactMessage>> {
    let status = params.status(MESSAGE_STATUSES)?;
    Ok(Json(Envelope::ok(list(&state.db, admin.user_id, status).await?)))
}

#[instrument(skip(state, input))]
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<StatusInput>,
) -> ApiResult<ContactMessage> {
    let msg = set_status(&state.db, admin.user_id, id, &input.status)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
    Ok(Json(Envelope::ok(msg)))
}

/// Emails the sender, then marks the message replied. A failed send leaves
/// the status untouched.
#[instrument(skip(state, input))]
pub async fn reply(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<ReplyInput>,
) -> ApiResult<ContactMessage> {
    let original = find(&state.db, admin.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

    let mail = reply_mail(&original.email, original.subject.as_deref(), &input.body);
    state.mailer.send(mail).await.map_err(|e| {
        error!(error = %e, message_id = %id, "reply could not be sent");
        AppError::Internal(anyhow::Error::new(e).context("sending reply"))
    })?;

    let msg = mark_replied(&state.db, admin.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
    info!(message_id = %id, "contact message replied");
    Ok(Json(Envelope::ok(msg)))
}

#[instrument(skip(state))]
pub async fn delete_message(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    if !delete(&state.db, admin.user_id, id).await? {
        return Err(AppError::NotFound("Message not found".into()));
    }
    Ok(Json(Envelope::done()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_form_requires_email_and_message() {
        let ok: ContactInput = serde_json::from_value(serde_json::json!({
            "name": "Ada", "email": "ada@example.com", "message": "Hi there"
        }))
        .unwrap();
        assert!(ok.validate().is_ok());

        let bad_email: ContactInput = serde_json::from_value(serde_json::json!({
            "name": "Ada", "email": "nope", "message": "Hi"
        }))
        .unwrap();
        assert!(bad_email.validate().is_err());

        let blank: ContactInput = serde_json::from_value(serde_json::json!({
            "name": "Ada", "email": "ada@example.com", "message": "   "
        }))
        .unwrap();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn status_must_be_known() {
        let s: StatusInput = serde_json::from_value(serde_json::json!({"status": "ARCHIVED"})).unwrap();
        assert!(s.validate().is_ok());
        let s: StatusInput = serde_json::from_value(serde_json::json!({"status": "SPAM"})).unwrap();
        assert!(s.validate().is_err());
    }
}
