//! Read-only view of the portfolio owner's published content.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use crate::{
    auth::{dto::PublicUser, repo_types::User},
    content::{
        achievements::{self, Achievement},
        certifications::{self, Certification},
        projects::{self, Project},
        resumes::{self, Resume},
        skills::{self, Skill},
        timeline::{self, TimelineItem},
    },
    error::{ApiResult, AppError, Envelope},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct Portfolio {
    pub user: PublicUser,
    pub projects: Vec<Project>,
    pub skills: Vec<Skill>,
    pub timeline: Vec<TimelineItem>,
    pub achievements: Vec<Achievement>,
    pub resume: Option<Resume>,
    pub certifications: Vec<Certification>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/public/portfolio", get(get_portfolio))
}

#[instrument(skip(state))]
pub async fn get_portfolio(State(state): State<AppState>) -> ApiResult<Portfolio> {
    let owner = User::find_owner(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Portfolio not found".into()))?;
    let id = owner.id;
    let db = &state.db;

    let (projects, skills, timeline, achievements, resume, certifications) = tokio::try_join!(
        projects::list(db, id, Some("PUBLISHED")),
        skills::list(db, id),
        timeline::list(db, id, None),
        achievements::list(db, id),
        resumes::find_default(db, id),
        certifications::list(db, id),
    )?;

    Ok(Json(Envelope::ok(Portfolio {
        user: owner.into(),
        projects,
        skills,
        timeline,
        achievements,
        resume,
        certifications,
    })))
}
