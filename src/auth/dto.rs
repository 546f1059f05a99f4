use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{claims::Role, repo_types::User};
use crate::validation::not_blank;

/// Request body for user registration.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
}

/// Request body for login.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Response returned after login, register, or `/me`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub website_url: Option<String>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        let role = u.role();
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role,
            title: u.title,
            bio: u.bio,
            location: u.location,
            avatar_url: u.avatar_url,
            github_url: u.github_url,
            linkedin_url: u.linkedin_url,
            twitter_url: u.twitter_url,
            website_url: u.website_url,
        }
    }
}
