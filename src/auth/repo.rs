use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo_types::User;
use crate::error::{Error, Result};

impl User {
    /// Find a user by email (case-insensitive).
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with an already hashed password.
    pub async fn create(db: &PgPool, email: &str, password_hash: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(normalize_email(email))
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => Error::EmailTaken,
            other => Error::Storage(other),
        })?;
        Ok(user)
    }

    /// Hash and store a new password for `user_id`.
    pub async fn update_password(db: &PgPool, user_id: Uuid, password: &str) -> Result<()> {
        let hash = hash_password(password)?;
        sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(user_id)
            .bind(hash)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Sessions, resets and galleries go with the user via ON DELETE CASCADE.
    pub async fn delete(db: &PgPool, user_id: Uuid) -> Result<()> {
        sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Resolve credentials to a user. Unknown email and wrong password look the same.
    pub async fn authenticate(db: &PgPool, email: &str, password: &str) -> Result<User> {
        let user = User::find_by_email(db, email).await?.ok_or(Error::NotFound)?;
        if verify_password(password, &user.password_hash)? {
            Ok(user)
        } else {
            Err(Error::NotFound)
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::normalize_email;

    #[test]
    fn emails_are_case_normalized() {
        assert_eq!(normalize_email("  Zelda@Hyrule.COM "), "zelda@hyrule.com");
    }
}
