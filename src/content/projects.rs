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
use validator::{Validate, ValidationError};

use super::ListParams;
use crate::{
    auth::AdminUser,
    error::{ApiResult, AppError, Envelope},
    state::AppState,
    validation::{one_of, ApiPath, ApiQuery, ValidJson},
};

pub const PROJECT_STATUSES: &[&str] = &["DRAFT", "PUBLISHED"];

const COLUMNS: &str = "id, user_id, title, description, content, image_url, github_url, live_url, \
     technologies, category, featured, status, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub technologies: Vec<String>,
    pub category: Option<String>,
    pub featured: bool,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn project_status(value: &str) -> Result<(), ValidationError> {
    one_of(value, PROJECT_STATUSES, "status")
}

fn technologies(values: &[String]) -> Result<(), ValidationError> {
    if values.iter().any(|t| t.trim().is_empty() || t.len() > 50) {
        return Err(ValidationError::new("technologies"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    pub content: Option<String>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
    #[validate(url)]
    pub github_url: Option<String>,
    #[validate(url)]
    pub live_url: Option<String>,
    #[serde(default)]
    #[validate(length(max = 30), custom(function = "technologies"))]
    pub technologies: Vec<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[validate(custom(function = "project_status"))]
    pub status: String,
}

// ---- repo ----

pub async fn list(db: &PgPool, owner: Uuid, status: Option<&str>) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM projects
         WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
         ORDER BY created_at DESC
        "#
    ))
    .bind(owner)
    .bind(status)
    .fetch_all(db)
    .await
}

pub async fn create(db: &PgPool, owner: Uuid, p: &ProjectInput) -> Result<Project, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!(
        r#"
        INSERT INTO projects (user_id, title, description, content, image_url, github_url,
                              live_url, technologies, category, featured, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(&p.title)
    .bind(&p.description)
    .bind(&p.content)
    .bind(&p.image_url)
    .bind(&p.github_url)
    .bind(&p.live_url)
    .bind(&p.technologies)
    .bind(&p.category)
    .bind(p.featured)
    .bind(&p.status)
    .fetch_one(db)
    .await
}

pub async fn update(db: &PgPool, owner: Uuid, id: Uuid, p: &ProjectInput) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(&format!(
        r#"
        UPDATE projects
           SET title = $3, description = $4, content = $5, image_url = $6, github_url = $7,
               live_url = $8, technologies = $9, category = $10, featured = $11, status = $12,
               updated_at = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(owner)
    .bind(&p.title)
    .bind(&p.description)
    .bind(&p.content)
    .bind(&p.image_url)
    .bind(&p.github_url)
    .bind(&p.live_url)
    .bind(&p.technologies)
    .bind(&p.category)
    .bind(p.featured)
    .bind(&p.status)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, owner: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM projects WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---- handlers ----

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/projects", get(list_projects).post(create_project))
        .route("/admin/projects/:id", put(update_project).delete(delete_project))
}

#[instrument(skip(state))]
pub async fn list_projects(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Vec<Project>> {
    let status = params.status(PROJECT_STATUSES)?;
    let rows = list(&state.db, admin.user_id, status).await?;
    Ok(Json(Envelope::ok(rows)))
}

#[instrument(skip(state, input))]
pub async fn create_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(input): ValidJson<ProjectInput>,
) -> Result<(StatusCode, Json<Envelope<Project>>), AppError> {
    let project = create(&state.db, admin.user_id, &input).await?;
    info!(project_id = %project.id, user_id = %admin.user_id, "project created");
    Ok((StatusCode::CREATED, Json(Envelope::ok(project))))
}

#[instrument(skip(state, input))]
pub async fn update_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<ProjectInput>,
) -> ApiResult<Project> {
    let project = update(&state.db, admin.user_id, id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    Ok(Json(Envelope::ok(project)))
}

#[instrument(skip(state))]
pub async fn delete_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    if !delete(&state.db, admin.user_id, id).await? {
        return Err(AppError::NotFound("Project not found".into()));
    }
    info!(project_id = %id, "project deleted");
    Ok(Json(Envelope::done()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(json: serde_json::Value) -> Result<ProjectInput, String> {
        let p: ProjectInput = serde_json::from_value(json).map_err(|e| e.to_string())?;
        p.validate().map_err(|e| e.to_string())?;
        Ok(p)
    }

    #[test]
    fn accepts_minimal_project() {
        let p = input(serde_json::json!({
            "title": "Compiler",
            "description": "A toy compiler",
            "status": "PUBLISHED",
            "technologies": ["rust", "llvm"],
            "githubUrl": "https://github.com/me/compiler"
        }))
        .unwrap();
        assert_eq!(p.technologies.len(), 2);
        assert!(!p.featured);
    }

    #[test]
    fn rejects_bad_status_url_and_unknown_fields() {
        assert!(input(serde_json::json!({"title": "t", "description": "d", "status": "LIVE"})).is_err());
        assert!(input(serde_json::json!({
            "title": "t", "description": "d", "status": "DRAFT", "liveUrl": "not a url"
        }))
        .is_err());
        assert!(input(serde_json::json!({
            "title": "t", "description": "d", "status": "DRAFT", "owner": "someone"
        }))
        .is_err());
        assert!(input(serde_json::json!({"description": "d", "status": "DRAFT"})).is_err());
    }

    #[test]
    fn rejects_blank_technology() {
        assert!(input(serde_json::json!({
            "title": "t", "description": "d", "status": "DRAFT", "technologies": ["rust", " "]
        }))
        .is_err());
    }
}
