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
    validation::{not_blank, ApiPath, ValidJson},
};

const COLUMNS: &str = "id, user_id, name, level, category, icon, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub level: i32,
    pub category: String,
    pub icon: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SkillInput {
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    #[validate(range(min = 0, max = 100))]
    pub level: i32,
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub category: String,
    #[validate(length(max = 200))]
    pub icon: Option<String>,
}

// ---- repo ----

/// Strongest skills first.
pub async fn list(db: &PgPool, owner: Uuid) -> Result<Vec<Skill>, sqlx::Error> {
    sqlx::query_as::<_, Skill>(&format!(
        "SELECT {COLUMNS} FROM skills WHERE user_id = $1 ORDER BY level DESC, created_at DESC"
    ))
    .bind(owner)
    .fetch_all(db)
    .await
}

pub async fn create(db: &PgPool, owner: Uuid, s: &SkillInput) -> Result<Skill, sqlx::Error> {
    sqlx::query_as::<_, Skill>(&format!(
        r#"
        INSERT INTO skills (user_id, name, level, category, icon)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(s.name.trim())
    .bind(s.level)
    .bind(s.category.trim())
    .bind(&s.icon)
    .fetch_one(db)
    .await
}

pub async fn update(db: &PgPool, owner: Uuid, id: Uuid, s: &SkillInput) -> Result<Option<Skill>, sqlx::Error> {
    sqlx::query_as::<_, Skill>(&format!(
        r#"
        UPDATE skills
           SET name = $3, level = $4, category = $5, icon = $6, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .bind(s.name.trim())
    .bind(s.level)
    .bind(s.category.trim())
    .bind(&s.icon)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, owner: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM skills WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---- handlers ----

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/skills", get(list_skills).post(create_skill))
        .route("/admin/skills/:id", put(update_skill).delete(delete_skill))
}

#[instrument(skip(state))]
pub async fn list_skills(State(state): State<AppState>, AdminUser(admin): AdminUser) -> ApiResult<Vec<Skill>> {
    Ok(Json(Envelope::ok(list(&state.db, admin.user_id).await?)))
}

#[instrument(skip(state, input))]
pub async fn create_skill(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(input): ValidJson<SkillInput>,
) -> Result<(StatusCode, Json<Envelope<Skill>>), AppError> {
    let skill = create(&state.db, admin.user_id, &input).await?;
    info!(skill_id = %skill.id, "skill created");
    Ok((StatusCode::CREATED, Json(Envelope::ok(skill))))
}

#[instrument(skip(state, input))]
pub async fn update_skill(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<SkillInput>,
) -> ApiResult<Skill> {
    let skill = update(&state.db, admin.user_id, id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound("Skill not found".into()))?;
    Ok(Json(Envelope::ok(skill)))
}

#[instrument(skip(state))]
pub async fn delete_skill(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    if !delete(&state.db, admin.user_id, id).await? {
        return Err(AppError::NotFound("Skill not found".into()));
    }
    Ok(Json(Envelope::done()))
}
