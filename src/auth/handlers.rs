use axum::{
    extract::{FromRef, State},
    http::header,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        cookie::{clear_session_cookie, session_cookie},
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password, verify_unknown_account},
        repo_types::User,
    },
    error::{AppError, Envelope},
    state::AppState,
    validation::ValidJson,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

fn signed_in(state: &AppState, user: User) -> Result<impl IntoResponse, AppError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id, user.role()).map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign failed");
        AppError::Internal(e.into())
    })?;
    let cookie = session_cookie(&state.config.cookie, &token, keys.ttl_secs());
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(AuthResponse {
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ValidJson(mut payload): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.email = payload.email.trim().to_lowercase();
    let name = payload.name.trim();

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::register(&state.db, &payload.email, &hash, name).await?;

    info!(user_id = %user.id, email = %user.email, role = %user.role(), "user registered");
    signed_in(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(mut payload): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            verify_unknown_account(&payload.password);
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    signed_in(&state, user)
}

/// Clears the session cookie. Tokens are stateless, so nothing is revoked
/// server-side.
#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&state.config.cookie))]),
        Json(Envelope::done()),
    )
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<AuthResponse>, AppError> {
    let user = User::find_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %identity.user_id, "session for missing user");
            AppError::Unauthorized("User not found".into())
        })?;

    Ok(Json(AuthResponse {
        user: PublicUser::from(user),
    }))
}
