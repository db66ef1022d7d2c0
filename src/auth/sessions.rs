use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::{Session, User};
use crate::auth::token::{hash_token, new_token};
use crate::error::{Error, Result};

/// Session tokens never carry less entropy than this.
pub const MIN_SESSION_TOKEN_BYTES: usize = 32;

/// Persistence needed by [`SessionStore`]. Only token hashes cross this seam.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn insert(&self, user_id: Uuid, token_hash: &str) -> Result<()>;
    async fn user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>>;
    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepo>,
    bytes_per_token: usize,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepo>, bytes_per_token: usize) -> Self {
        Self {
            repo,
            bytes_per_token: bytes_per_token.max(MIN_SESSION_TOKEN_BYTES),
        }
    }

    /// Start a session. The returned raw token cannot be recovered later.
    pub async fn create(&self, user_id: Uuid) -> Result<Session> {
        let token = new_token(self.bytes_per_token)?;
        self.repo.insert(user_id, &hash_token(&token)).await?;
        debug!(%user_id, "session created");
        Ok(Session { token })
    }

    /// `NotFound` means the caller is anonymous.
    pub async fn fetch_user(&self, token: &str) -> Result<User> {
        self.repo
            .user_by_token_hash(&hash_token(token))
            .await?
            .ok_or(Error::NotFound)
    }

    /// Idempotent.
    pub async fn delete(&self, token: &str) -> Result<()> {
        self.repo.delete_by_token_hash(&hash_token(token)).await
    }
}

pub struct PgSessionRepo {
    db: PgPool,
}

impl PgSessionRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn insert(&self, user_id: Uuid, token_hash: &str) -> Result<()> {
        sqlx::query(r#"INSERT INTO sessions (user_id, token_hash) VALUES ($1, $2)"#)
            .bind(user_id)
            .bind(token_hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT users.id, users.email, users.password_hash, users.created_at
            FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM sessions WHERE token_hash = $1"#)
            .bind(token_hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
