use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AdminUser,
    error::{ApiResult, AppError, Envelope},
    state::AppState,
    uploads::services::remove_by_url,
    validation::{ApiPath, ValidJson},
};

const COLUMNS: &str = "id, user_id, title, file_url, is_default, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub file_url: String,
    pub is_default: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResumeInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 500))]
    pub file_url: String,
    #[serde(default)]
    pub is_default: bool,
}

// ---- repo ----

pub async fn list(db: &PgPool, owner: Uuid) -> Result<Vec<Resume>, sqlx::Error> {
    sqlx::query_as::<_, Resume>(&format!(
        "SELECT {COLUMNS} FROM resumes WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(owner)
    .fetch_all(db)
    .await
}

pub async fn find_default(db: &PgPool, owner: Uuid) -> Result<Option<Resume>, sqlx::Error> {
    sqlx::query_as::<_, Resume>(&format!(
        "SELECT {COLUMNS} FROM resumes WHERE user_id = $1 AND is_default ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(owner)
    .fetch_optional(db)
    .await
}

pub async fn find(db: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<Resume>, sqlx::Error> {
    sqlx::query_as::<_, Resume>(&format!("SELECT {COLUMNS} FROM resumes WHERE id = $1 AND user_id = $2"))
        .bind(id)
        .bind(owner)
        .fetch_optional(db)
        .await
}

/// At most one default per owner: clearing and setting share a transaction.
pub async fn create(db: &PgPool, owner: Uuid, r: &ResumeInput) -> Result<Resume, sqlx::Error> {
    let mut tx = db.begin().await?;
    if r.is_default {
        sqlx::query("UPDATE resumes SET is_default = false WHERE user_id = $1 AND is_default")
            .bind(owner)
            .execute(&mut *tx)
            .await?;
    }
    let resume = sqlx::query_as::<_, Resume>(&format!(
        r#"
        INSERT INTO resumes (user_id, title, file_url, is_default)
        VALUES ($1, $2, $3, $4)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(&r.title)
    .bind(&r.file_url)
    .bind(r.is_default)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(resume)
}

pub async fn update(db: &PgPool, owner: Uuid, id: Uuid, r: &ResumeInput) -> Result<Option<Resume>, sqlx::Error> {
    let mut tx = db.begin().await?;
    if r.is_default {
        sqlx::query("UPDATE resumes SET is_default = false WHERE user_id = $1 AND id <> $2 AND is_default")
            .bind(owner)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    let resume = sqlx::query_as::<_, Resume>(&format!(
        r#"
        UPDATE resumes
           SET title = $3, file_url = $4, is_default = $5, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .bind(&r.title)
    .bind(&r.file_url)
    .bind(r.is_default)
    .fetch_optional(&mut *tx)
    .await?;
    // Nothing matched: roll back the cleared default.
    if resume.is_some() {
        tx.commit().await?;
    }
    Ok(resume)
}

pub async fn set_default(db: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<Resume>, sqlx::Error> {
    let mut tx = db.begin().await?;
    sqlx::query("UPDATE resumes SET is_default = false WHERE user_id = $1 AND id <> $2 AND is_default")
        .bind(owner)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let resume = sqlx::query_as::<_, Resume>(&format!(
        r#"
        UPDATE resumes SET is_default = true, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .fetch_optional(&mut *tx)
    .await?;
    if resume.is_some() {
        tx.commit().await?;
    }
    Ok(resume)
}

pub async fn delete(db: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<Resume>, sqlx::Error> {
    sqlx::query_as::<_, Resume>(&format!(
        "DELETE FROM resumes WHERE id = $1 AND user_id = $2 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(owner)
    .fetch_optional(db)
    .await
}

// ---- handlers ----

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/resumes", get(list_resumes).post(create_resume))
        .route("/admin/resumes/:id", put(update_resume).delete(delete_resume))
        .route("/admin/resumes/:id/default", put(make_default))
}

#[instrument(skip(state))]
pub async fn list_resumes(State(state): State<AppState>, AdminUser(admin): AdminUser) -> ApiResult<Vec<Resume>> {
    Ok(Json(Envelope::ok(list(&state.db, admin.user_id).await?)))
}

#[instrument(skip(state, input))]
pub async fn create_resume(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(input): ValidJson<ResumeInput>,
) -> Result<(StatusCode, Json<Envelope<Resume>>), AppError> {
    let resume = create(&state.db, admin.user_id, &input).await?;
    info!(resume_id = %resume.id, is_default = resume.is_default, "resume created");
    Ok((StatusCode::CREATED, Json(Envelope::ok(resume))))
}

#[instrument(skip(state, input))]
pub async fn update_resume(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<ResumeInput>,
) -> ApiResult<Resume> {
    let previous = find(&state.db, admin.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Resume not found".into()))?;
    let resume = update(&state.db, admin.user_id, id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound("Resume not found".into()))?;
    if previous.file_url != resume.file_url {
        remove_by_url(&state, Some(&previous.file_url)).await;
    }
    Ok(Json(Envelope::ok(resume)))
}

#[instrument(skip(state))]
pub async fn make_default(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Resume> {
    let resume = set_default(&state.db, admin.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Resume not found".into()))?;
    info!(resume_id = %id, "default resume changed");
    Ok(Json(Envelope::ok(resume)))
}

#[instrument(skip(state))]
pub async fn delete_resume(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let removed = delete(&state.db, admin.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Resume not found".into()))?;
    remove_by_url(&state, Some(&removed.file_url)).await;
    info!(resume_id = %id, "resume deleted");
    Ok(Json(Envelope::done()))
}
