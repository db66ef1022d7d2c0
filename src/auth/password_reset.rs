use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::repo::normalize_email;
use crate::auth::repo_types::{PasswordReset, PasswordResetRow, User};
use crate::auth::token::{hash_token, new_token};
use crate::error::{Error, Result};

pub const MIN_RESET_TOKEN_BYTES: usize = 16;
pub const DEFAULT_RESET_TTL: Duration = Duration::hours(1);
pub const MAX_RESET_TTL: Duration = Duration::days(30);

/// Persistence needed by [`PasswordResetStore`].
#[async_trait]
pub trait PasswordResetRepo: Send + Sync {
    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>>;

    /// Insert or replace the user's pending reset in one atomic statement.
    async fn upsert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<()>;

    /// Remove the reset matching `token_hash` and return it with its owner.
    /// Concurrent callers race for the row; at most one gets it.
    async fn take_by_token_hash(&self, token_hash: &str) -> Result<Option<PasswordResetRow>>;
}

#[derive(Clone)]
pub struct PasswordResetStore {
    repo: Arc<dyn PasswordResetRepo>,
    bytes_per_token: usize,
    ttl: Duration,
}

impl PasswordResetStore {
    /// Non-positive `ttl` falls back to [`DEFAULT_RESET_TTL`]; longer than
    /// [`MAX_RESET_TTL`] is capped.
    pub fn new(repo: Arc<dyn PasswordResetRepo>, bytes_per_token: usize, ttl: Duration) -> Self {
        Self {
            repo,
            bytes_per_token: bytes_per_token.max(MIN_RESET_TOKEN_BYTES),
            ttl: if ttl.is_positive() {
                ttl.min(MAX_RESET_TTL)
            } else {
                DEFAULT_RESET_TTL
            },
        }
    }

    /// Issue a reset for the account behind `email`, replacing any pending one.
    pub async fn create(&self, email: &str) -> Result<PasswordReset> {
        let email = normalize_email(email);
        let user_id = self
            .repo
            .user_id_by_email(&email)
            .await?
            .ok_or(Error::NotFound)?;

        let token = new_token(self.bytes_per_token)?;
        let expires_at = OffsetDateTime::now_utc() + self.ttl;

        self.repo.upsert(user_id, &hash_token(&token), expires_at).await?;
        info!(%user_id, %expires_at, "password reset issued");

        Ok(PasswordReset {
            user_id,
            token,
            expires_at,
        })
    }

    /// Trade a raw token for its user. Succeeds at most once per token.
    ///
    /// An expired row is removed on the spot, so a retry sees `NotFound`.
    pub async fn consume(&self, token: &str) -> Result<User> {
        let row = self
            .repo
            .take_by_token_hash(&hash_token(token))
            .await?
            .ok_or(Error::NotFound)?;

        if OffsetDateTime::now_utc() > row.expires_at {
            debug!(user_id = %row.user.id, "password reset expired");
            return Err(Error::Expired);
        }

        info!(user_id = %row.user.id, "password reset consumed");
        Ok(row.user)
    }
}

pub struct PgPasswordResetRepo {
    db: PgPool,
}

impl PgPasswordResetRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PasswordResetRepo for PgPasswordResetRepo {
    async fn user_id_by_email(&self, email: &str) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM users WHERE email = $1"#)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(id)
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn take_by_token_hash(&self, token_hash: &str) -> Result<Option<PasswordResetRow>> {
        let row = sqlx::query_as::<_, PasswordResetRow>(
            r#"
            WITH taken AS (
                DELETE FROM password_resets
                WHERE token_hash = $1
                RETURNING user_id, expires_at
            )
            SELECT taken.expires_at,
                   users.id, users.email, users.password_hash, users.created_at
            FROM taken
            JOIN users ON users.id = taken.user_id
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryAuthDb;

    fn store(db: &Arc<MemoryAuthDb>) -> PasswordResetStore {
        PasswordResetStore::new(db.clone(), MIN_RESET_TOKEN_BYTES, DEFAULT_RESET_TTL)
    }

    #[tokio::test]
    async fn create_then_consume_returns_user_once() {
        let db = Arc::new(MemoryAuthDb::default());
        let user = db.add_user("zelda@hyrule.com");
        let resets = store(&db);

        let reset = resets.create("zelda@hyrule.com").await.expect("create");
        assert_eq!(reset.user_id, user.id);
        assert!(reset.expires_at > OffsetDateTime::now_utc());

        let consumed = resets.consume(&reset.token).await.expect("consume");
        assert_eq!(consumed.id, user.id);

        let again = resets.consume(&reset.token).await.unwrap_err();
        assert!(matches!(again, Error::NotFound));
    }

    #[tokio::test]
    async fn email_lookup_ignores_case() {
        let db = Arc::new(MemoryAuthDb::default());
        let user = db.add_user("zelda@hyrule.com");
        let reset = store(&db).create("  ZELDA@Hyrule.com").await.unwrap();
        assert_eq!(reset.user_id, user.id);
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let db = Arc::new(MemoryAuthDb::default());
        let err = store(&db).create("ganon@hyrule.com").await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn second_request_overwrites_first() {
        let db = Arc::new(MemoryAuthDb::default());
        let user = db.add_user("zelda@hyrule.com");
        let resets = store(&db);

        let first = resets.create("zelda@hyrule.com").await.unwrap();
        let second = resets.create("zelda@hyrule.com").await.unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(db.reset_count(), 1);

        let err = resets.consume(&first.token).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));

        let consumed = resets.consume(&second.token).await.expect("second token");
        assert_eq!(consumed.id, user.id);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_purged() {
        let db = Arc::new(MemoryAuthDb::default());
        let user = db.add_user("zelda@hyrule.com");
        let token = "stale-token";
        db.insert_reset(
            user.id,
            &hash_token(token),
            OffsetDateTime::now_utc() - Duration::minutes(5),
        );
        let resets = store(&db);

        let err = resets.consume(token).await.unwrap_err();
        assert!(matches!(err, Error::Expired));
        assert_eq!(db.reset_count(), 0);

        let err = resets.consume(token).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let db = Arc::new(MemoryAuthDb::default());
        let err = store(&db).consume("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn non_positive_ttl_uses_default() {
        let db = Arc::new(MemoryAuthDb::default());
        let resets = PasswordResetStore::new(db, 4, Duration::ZERO);
        assert_eq!(resets.ttl, DEFAULT_RESET_TTL);
        assert_eq!(resets.bytes_per_token, MIN_RESET_TOKEN_BYTES);
    }

    #[tokio::test]
    async fn huge_ttl_is_capped() {
        let db = Arc::new(MemoryAuthDb::default());
        db.add_user("zelda@hyrule.com");
        let resets = PasswordResetStore::new(db, MIN_RESET_TOKEN_BYTES, Duration::MAX);
        assert_eq!(resets.ttl, MAX_RESET_TTL);

        let reset = resets.create("zelda@hyrule.com").await.expect("no overflow");
        assert!(reset.expires_at <= OffsetDateTime::now_utc() + MAX_RESET_TTL);
    }
}
