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
use validator::{Validate, ValidationError};

use super::ListParams;
use crate::{
    auth::AdminUser,
    error::{ApiResult, AppError, Envelope},
    state::AppState,
    validation::{iso_date, one_of, ApiPath, ApiQuery, ValidJson},
};

pub const TIMELINE_KINDS: &[&str] = &["WORK", "EDUCATION"];

const COLUMNS: &str = "id, user_id, kind, title, organization, description, start_date, end_date, \
     is_current, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub organization: String,
    pub description: Option<String>,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date::option")]
    pub end_date: Option<Date>,
    #[sqlx(rename = "is_current")]
    pub current: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn timeline_kind(value: &str) -> Result<(), ValidationError> {
    one_of(value, TIMELINE_KINDS, "kind")
}

fn date_range(item: &TimelineInput) -> Result<(), ValidationError> {
    match (item.current, item.end_date) {
        (true, Some(_)) => Err(ValidationError::new("current_with_end_date")),
        (false, Some(end)) if end < item.start_date => Err(ValidationError::new("end_before_start")),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[validate(schema(function = "date_range"))]
pub struct TimelineInput {
    #[validate(custom(function = "timeline_kind"))]
    pub kind: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 200))]
    pub organization: String,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(default, with = "iso_date::option")]
    pub end_date: Option<Date>,
    #[serde(default)]
    pub current: bool,
}

// ---- repo ----

/// Most recent first.
pub async fn list(db: &PgPool, owner: Uuid, kind: Option<&str>) -> Result<Vec<TimelineItem>, sqlx::Error> {
    sqlx::query_as::<_, TimelineItem>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM timeline_items
         WHERE user_id = $1 AND ($2::text IS NULL OR kind = $2)
         ORDER BY start_date DESC, created_at DESC
        "#
    ))
    .bind(owner)
    .bind(kind)
    .fetch_all(db)
    .await
}

pub async fn create(db: &PgPool, owner: Uuid, t: &TimelineInput) -> Result<TimelineItem, sqlx::Error> {
    sqlx::query_as::<_, TimelineItem>(&format!(
        r#"
        INSERT INTO timeline_items (user_id, kind, title, organization, description,
                                    start_date, end_date, is_current)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(&t.kind)
    .bind(&t.title)
    .bind(&t.organization)
    .bind(&t.description)
    .bind(t.start_date)
    .bind(t.end_date)
    .bind(t.current)
    .fetch_one(db)
    .await
}

pub async fn update(
    db: &PgPool,
    owner: Uuid,
    id: Uuid,
    t: &TimelineInput,
) -> Result<Option<TimelineItem>, sqlx::Error> {
    sqlx::query_as::<_, TimelineItem>(&format!(
        r#"
        UPDATE timeline_items
           SET kind = $3, title = $4, organization = $5, description = $6,
               start_date = $7, end_date = $8, is_current = $9, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .bind(&t.kind)
    .bind(&t.title)
    .bind(&t.organization)
    .bind(&t.description)
    .bind(t.start_date)
    .bind(t.end_date)
    .bind(t.current)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, owner: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM timeline_items WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---- handlers ----

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/timeline", get(list_timeline).post(create_item))
        .route("/admin/timeline/:id", put(update_item).delete(delete_item))
}

#[instrument(skip(state))]
pub async fn list_timeline(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Vec<TimelineItem>> {
    let kind = params.kind(TIMELINE_KINDS)?;
    Ok(Json(Envelope::ok(list(&state.db, admin.user_id, kind).await?)))
}

#[instrument(skip(state, input))]
pub async fn create_item(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(input): ValidJson<TimelineInput>,
) -> Result<(StatusCode, Json<Envelope<TimelineItem>>), AppError> {
    let item = create(&state.db, admin.user_id, &input).await?;
    info!(item_id = %item.id, kind = %item.kind, "timeline item created");
    Ok((StatusCode::CREATED, Json(Envelope::ok(item))))
}

#[instrument(skip(state, input))]
pub async fn update_item(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<TimelineInput>,
) -> ApiResult<TimelineItem> {
    let item = update(&state.db, admin.user_id, id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound("Timeline item not found".into()))?;
    Ok(Json(Envelope::ok(item)))
}

#[instrument(skip(state))]
pub async fn delete_item(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    if !delete(&state.db, admin.user_id, id).await? {
        return Err(AppError::NotFound("Timeline item not found".into()));
    }
    Ok(Json(Envelope::done()))
}
