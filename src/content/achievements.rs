use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AdminUser,
    error::{ApiResult, AppError, Envelope},
    state::AppState,
    validation::{iso_date, ApiPath, ValidJson},
};

const COLUMNS: &str = "id, user_id, title, description, achieved_on, url, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "iso_date::option")]
    #[sqlx(rename = "achieved_on")]
    pub date: Option<Date>,
    pub url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AchievementInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub date: Option<Date>,
    #[validate(url)]
    pub url: Option<String>,
}

// ---- repo ----

pub async fn list(db: &PgPool, owner: Uuid) -> Result<Vec<Achievement>, sqlx::Error> {
    sqlx::query_as::<_, Achievement>(&format!(
        "SELECT {COLUMNS} FROM achievements WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(owner)
    .fetch_all(db)
    .await
}

pub async fn create(db: &PgPool, owner: Uuid, a: &AchievementInput) -> Result<Achievement, sqlx::Error> {
    sqlx::query_as::<_, Achievement>(&format!(
        r#"
        INSERT INTO achievements (user_id, title, description, achieved_on, url)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(&a.title)
    .bind(&a.description)
    .bind(a.date)
    .bind(&a.url)
    .fetch_one(db)
    .await
}

pub async fn update(
    db: &PgPool,
    owner: Uuid,
    id: Uuid,
    a: &AchievementInput,
) -> Result<Option<Achievement>, sqlx::Error> {
    sqlx::query_as::<_, Achievement>(&format!(
        r#"
        UPDATE achievements
           SET title = $3, description = $4, achieved_on = $5, url = $6, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .bind(&a.title)
    .bind(&a.description)
    .bind(a.date)
    .bind(&a.url)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, owner: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM achievements WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---- handlers ----

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/achievements", get(list_achievements).post(create_achievement))
        .route("/admin/achievements/:id", put(update_achievement).delete(delete_achievement))
}

#[instrument(skip(state))]
pub async fn list_achievements(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<Vec<Achievement>> {
    Ok(Json(Envelope::ok(list(&state.db, admin.user_id).await?)))
}

#[instrument(skip(state, input))]
pub async fn create_achievement(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(input): ValidJson<AchievementInput>,
) -> Result<(StatusCode, Json<Envelope<Achievement>>), AppError> {
    let achievement = create(&state.db, admin.user_id, &input).await?;
    info!(achievement_id = %achievement.id, "achievement created");
    Ok((StatusCode::CREATED, Json(Envelope::ok(achievement))))
}

#[instrument(skip(state, input))]
pub async fn update_achievement(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<AchievementInput>,
) -> ApiResult<Achievement> {
    let achievement = update(&state.db, admin.user_id, id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound("Achievement not found".into()))?;
    Ok(Json(Envelope::ok(achievement)))
}

#[instrument(skip(state))]
pub async fn delete_achievement(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    if !delete(&state.db, admin.user_id, id).await? {
        return Err(AppError::NotFound("Achievement not found".into()));
    }
    Ok(Json(Envelope::done()))
}
