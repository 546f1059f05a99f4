use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    auth::{dto::PublicUser, repo_types::ProfileFields, repo_types::User, AdminUser},
    error::{ApiResult, AppError, Envelope},
    state::AppState,
    uploads::services::remove_by_url,
    validation::{not_blank, ValidJson},
};

/// The admin "about" edit. Email and role are not editable here.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileInput {
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub bio: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 500))]
    pub avatar_url: Option<String>,
    #[validate(url)]
    pub github_url: Option<String>,
    #[validate(url)]
    pub linkedin_url: Option<String>,
    #[validate(url)]
    pub twitter_url: Option<String>,
    #[validate(url)]
    pub website_url: Option<String>,
}

impl From<ProfileInput> for ProfileFields {
    fn from(p: ProfileInput) -> Self {
        Self {
            name: p.name.trim().to_string(),
            title: p.title,
            bio: p.bio,
            location: p.location,
            avatar_url: p.avatar_url,
            github_url: p.github_url,
            linkedin_url: p.linkedin_url,
            twitter_url: p.twitter_url,
            website_url: p.website_url,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/profile", get(get_profile).put(update_profile))
}

#[instrument(skip(state))]
pub async fn get_profile(State(state): State<AppState>, AdminUser(admin): AdminUser) -> ApiResult<PublicUser> {
    let user = User::find_by_id(&state.db, admin.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(Envelope::ok(user.into())))
}

#[instrument(skip(state, input))]
pub async fn update_profile(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(input): ValidJson<ProfileInput>,
) -> ApiResult<PublicUser> {
    let previous = User::find_by_id(&state.db, admin.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let user = User::update_profile(&state.db, admin.user_id, &input.into()).await?;
    if previous.avatar_url != user.avatar_url {
        remove_by_url(&state, previous.avatar_url.as_deref()).await;
    }
    info!(user_id = %user.id, "profile updated");
    Ok(Json(Envelope::ok(user.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_and_role_cannot_be_edited() {
        let attempt = serde_json::from_value::<ProfileInput>(serde_json::json!({
            "name": "Ada", "role": "ADMIN"
        }));
        assert!(attempt.is_err());
    }

    #[test]
    fn social_links_must_be_urls() {
        let p: ProfileInput = serde_json::from_value(serde_json::json!({
            "name": "Ada", "githubUrl": "github.com/ada"
        }))
        .unwrap();
        assert!(p.validate().is_err());

        let p: ProfileInput = serde_json::from_value(serde_json::json!({
            "name": "Ada", "githubUrl": "https://github.com/ada", "bio": "Engineer"
        }))
        .unwrap();
        assert!(p.validate().is_ok());
        assert_eq!(ProfileFields::from(p).bio.as_deref(), Some("Engineer"));
    }
}
