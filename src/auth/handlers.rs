use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, PublicUser, RegisterRequest,
            ResetPasswordRequest,
        },
        extractors::{AuthUser, SessionToken},
        password::hash_password,
        repo::normalize_email,
        repo_types::User,
    },
    error::Error,
    galleries::{handlers::blocking, repo::Gallery},
    mailer::reset_url,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).delete(delete_me))
}

async fn start_session(state: &AppState, user: User) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let session = state.sessions.create(user.id).await?;
    Ok(Json(AuthResponse {
        session_token: session.token,
        user: PublicUser {
            id: user.id,
            email: user.email,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = match User::create(&state.db, &payload.email, &hash).await {
        Ok(u) => u,
        Err(Error::EmailTaken) => {
            warn!(email = %payload.email, "email already registered");
            return Err(Error::EmailTaken.into());
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    let body = start_session(&state, user).await?;
    Ok((StatusCode::CREATED, body))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    let user = match User::authenticate(&state.db, &email, &payload.password).await {
        Ok(u) => u,
        Err(Error::NotFound) => {
            warn!(%email, "login rejected");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, "user logged in");
    start_session(&state, user).await
}

#[instrument(skip(state, token))]
pub async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<StatusCode, (StatusCode, String)> {
    state.sessions.delete(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(user))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(PublicUser {
        id: user.id,
        email: user.email,
    })
}

/// Removes the account, its galleries and their images. Sessions and resets cascade.
#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode, (StatusCode, String)> {
    let gallery_ids = Gallery::delete_by_user(&state.db, user.id).await?;
    let images = state.images.clone();
    blocking(move || {
        for id in gallery_ids {
            images.delete_all(id)?;
        }
        Ok(())
    })
    .await?;

    User::delete(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Always 202 so the endpoint cannot be used to probe for accounts.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    let reset = match state.resets.create(&email).await {
        Ok(r) => r,
        Err(Error::NotFound) => {
            info!(%email, "password reset requested for unknown email");
            return Ok(StatusCode::ACCEPTED);
        }
        Err(e) => return Err(e.into()),
    };

    let url = reset_url(&state.config.base_url, &reset.token);
    if let Err(e) = state.mailer.forgot_password(&email, &url).await {
        error!(error = %e, user_id = %reset.user_id, "sending reset email failed");
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".into()));
    }
    debug!(user_id = %reset.user_id, expires_at = %reset.expires_at, "reset link sent");
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let user = match state.resets.consume(&payload.token).await {
        Ok(u) => u,
        Err(Error::NotFound) => {
            warn!("unknown password reset token");
            return Err((StatusCode::BAD_REQUEST, "Invalid reset link".into()));
        }
        Err(e) => return Err(e.into()),
    };

    User::update_password(&state.db, user.id, &payload.password).await?;
    info!(user_id = %user.id, "password reset");
    start_session(&state, user).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("link@hyrule.com"));
        assert!(!is_valid_email("link@hyrule"));
        assert!(!is_valid_email("link hyrule.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn public_user_serialization() {
        let response = PublicUser {
            id: uuid::Uuid::new_v4(),
            email: "test@example.com".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("id"));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: uuid::Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            created_at: time::OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
    }
}
