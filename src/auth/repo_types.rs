use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                     // unique user ID
    pub email: String,                // lower-cased, unique
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub created_at: OffsetDateTime,   // creation timestamp
}

/// Freshly started session. The raw token is only available here.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
}

/// Pending password reset. `token` is only populated right after creation.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Reset row as stored, joined with its owner.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetRow {
    pub expires_at: OffsetDateTime,
    #[sqlx(flatten)]
    pub user: User,
}
