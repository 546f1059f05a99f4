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

use crate::{
    auth::AdminUser,
    error::{ApiResult, AppError, Envelope},
    state::AppState,
    uploads::services::remove_by_url,
    validation::{iso_date, ApiPath, ValidJson},
};

const COLUMNS: &str = "id, user_id, name, issuer, issue_date, expiry_date, credential_url, \
     image_url, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Certification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub issuer: String,
    #[serde(with = "iso_date::option")]
    pub issue_date: Option<Date>,
    #[serde(with = "iso_date::option")]
    pub expiry_date: Option<Date>,
    pub credential_url: Option<String>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn expiry_after_issue(c: &CertificationInput) -> Result<(), ValidationError> {
    match (c.issue_date, c.expiry_date) {
        (Some(issued), Some(expires)) if expires < issued => Err(ValidationError::new("expiry_before_issue")),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[validate(schema(function = "expiry_after_issue"))]
pub struct CertificationInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub issuer: String,
    #[serde(default, with = "iso_date::option")]
    pub issue_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub expiry_date: Option<Date>,
    #[validate(url)]
    pub credential_url: Option<String>,
    /// Usually a URL returned by the upload endpoint.
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
}

// ---- repo ----

pub async fn list(db: &PgPool, owner: Uuid) -> Result<Vec<Certification>, sqlx::Error> {
    sqlx::query_as::<_, Certification>(&format!(
        "SELECT {COLUMNS} FROM certifications WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(owner)
    .fetch_all(db)
    .await
}

pub async fn find(db: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<Certification>, sqlx::Error> {
    sqlx::query_as::<_, Certification>(&format!(
        "SELECT {COLUMNS} FROM certifications WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(owner)
    .fetch_optional(db)
    .await
}

pub async fn create(db: &PgPool, owner: Uuid, c: &CertificationInput) -> Result<Certification, sqlx::Error> {
    sqlx::query_as::<_, Certification>(&format!(
        r#"
        INSERT INTO certifications (user_id, name, issuer, issue_date, expiry_date,
                                    credential_url, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(&c.name)
    .bind(&c.issuer)
    .bind(c.issue_date)
    .bind(c.expiry_date)
    .bind(&c.credential_url)
    .bind(&c.image_url)
    .fetch_one(db)
    .await
}

pub async fn update(
    db: &PgPool,
    owner: Uuid,
    id: Uuid,
    c: &CertificationInput,
) -> Result<Option<Certification>, sqlx::Error> {
    sqlx::query_as::<_, Certification>(&format!(
        r#"
        UPDATE certifications
           SET name = $3, issuer = $4, issue_date = $5, expiry_date = $6,
               credential_url = $7, image_url = $8, updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .bind(&c.name)
    .bind(&c.issuer)
    .bind(c.issue_date)
    .bind(c.expiry_date)
    .bind(&c.credential_url)
    .bind(&c.image_url)
    .fetch_optional(db)
    .await
}

/// Returns the deleted row so its image can be cleaned up.
pub async fn delete(db: &PgPool, owner: Uuid, id: Uuid) -> Result<Option<Certification>, sqlx::Error> {
    sqlx::query_as::<_, Certification>(&format!(
        "DELETE FROM certifications WHERE id = $1 AND user_id = $2 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(owner)
    .fetch_optional(db)
    .await
}

// ---- handlers ----

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/certifications", get(list_certifications).post(create_certification))
        .route(
            "/admin/certifications/:id",
            put(update_certification).delete(delete_certification),
        )
}

#[instrument(skip(state))]
pub async fn list_certifications(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<Vec<Certification>> {
    Ok(Json(Envelope::ok(list(&state.db, admin.user_id).await?)))
}

#[instrument(skip(state, input))]
pub async fn create_certification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(input): ValidJson<CertificationInput>,
) -> Result<(StatusCode, Json<Envelope<Certification>>), AppError> {
    let cert = create(&state.db, admin.user_id, &input).await?;
    info!(certification_id = %cert.id, "certification created");
    Ok((StatusCode::CREATED, Json(Envelope::ok(cert))))
}

#[instrument(skip(state, input))]
pub async fn update_certification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<CertificationInput>,
) -> ApiResult<Certification> {
    let previous = find(&state.db, admin.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Certification not found".into()))?;
    let cert = update(&state.db, admin.user_id, id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound("Certification not found".into()))?;

    if previous.image_url != cert.image_url {
        remove_by_url(&state, previous.image_url.as_deref()).await;
    }
    Ok(Json(Envelope::ok(cert)))
}

#[instrument(skip(state))]
pub async fn delete_certification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    let removed = delete(&state.db, admin.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Certification not found".into()))?;
    remove_by_url(&state, removed.image_url.as_deref()).await;
    info!(certification_id = %id, "certification deleted");
    Ok(Json(Envelope::done()))
}
