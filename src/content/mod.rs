use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    error::{ApiResult, AppError, Envelope},
    state::AppState,
};

pub mod achievements;
pub mod certifications;
pub mod messages;
pub mod profile;
pub mod projects;
pub mod resumes;
pub mod skills;
pub mod timeline;

/// Optional list filters shared by the admin list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub kind: Option<String>,
}

fn filter<'a>(value: Option<&'a str>, allowed: &[&str], field: &str) -> Result<Option<&'a str>, AppError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if allowed.contains(&v) => Ok(Some(v)),
        Some(v) => Err(AppError::BadRequest(format!(
            "unknown {field} '{v}', expected one of {}",
            allowed.join(", ")
        ))),
    }
}

impl ListParams {
    pub fn status(&self, allowed: &[&str]) -> Result<Option<&str>, AppError> {
        filter(self.status.as_deref(), allowed, "status")
    }

    pub fn kind(&self, allowed: &[&str]) -> Result<Option<&str>, AppError> {
        filter(self.kind.as_deref(), allowed, "kind")
    }
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub projects: i64,
    pub published_projects: i64,
    pub skills: i64,
    pub timeline_items: i64,
    pub achievements: i64,
    pub certifications: i64,
    pub resumes: i64,
    pub messages: i64,
    pub unread_messages: i64,
}

/// All counts come from one repeatable-read snapshot.
pub async fn stats(db: &PgPool, owner: Uuid) -> Result<Stats, sqlx::Error> {
    let mut tx = db.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .execute(&mut *tx)
        .await?;

    let count = |sql: &'static str| sqlx::query_scalar::<_, i64>(sql).bind(owner);
    let projects = count("SELECT COUNT(*) FROM projects WHERE user_id = $1")
        .fetch_one(&mut *tx)
        .await?;
    let published_projects = count("SELECT COUNT(*) FROM projects WHERE user_id = $1 AND status = 'PUBLISHED'")
        .fetch_one(&mut *tx)
        .await?;
    let skills = count("SELECT COUNT(*) FROM skills WHERE user_id = $1")
        .fetch_one(&mut *tx)
        .await?;
    let timeline_items = count("SELECT COUNT(*) FROM timeline_items WHERE user_id = $1")
        .fetch_one(&mut *tx)
        .await?;
    let achievements = count("SELECT COUNT(*) FROM achievements WHERE user_id = $1")
        .fetch_one(&mut *tx)
        .await?;
    let certifications = count("SELECT COUNT(*) FROM certifications WHERE user_id = $1")
        .fetch_one(&mut *tx)
        .await?;
    let resumes = count("SELECT COUNT(*) FROM resumes WHERE user_id = $1")
        .fetch_one(&mut *tx)
        .await?;
    let messages = count("SELECT COUNT(*) FROM contact_messages WHERE user_id = $1")
        .fetch_one(&mut *tx)
        .await?;
    let unread_messages = count("SELECT COUNT(*) FROM contact_messages WHERE user_id = $1 AND status = 'UNREAD'")
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Stats {
        projects,
        published_projects,
        skills,
        timeline_items,
        achievements,
        certifications,
        resumes,
        messages,
        unread_messages,
    })
}

#[instrument(skip(state))]
pub async fn get_stats(State(state): State<AppState>, AdminUser(admin): AdminUser) -> ApiResult<Stats> {
    Ok(Json(Envelope::ok(stats(&state.db, admin.user_id).await?)))
}

/// Admin CRUD routes plus the public contact form.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(projects::routes())
        .merge(skills::routes())
        .merge(timeline::routes())
        .merge(achievements::routes())
        .merge(certifications::routes())
        .merge(resumes::routes())
        .merge(messages::routes())
        .merge(messages::contact_routes())
        .merge(profile::routes())
        .route("/admin/stats", get(get_stats))
}
