use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Gallery {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Column a gallery listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Title,
    CreatedAt,
}

impl SortColumn {
    /// Unknown columns fall back to `created_at`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("title") => SortColumn::Title,
            _ => SortColumn::CreatedAt,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortColumn::Title => "title",
            SortColumn::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything other than `asc` sorts descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("ASC") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl Gallery {
    pub async fn create(db: &PgPool, user_id: Uuid, title: &str) -> Result<Gallery> {
        let gallery = sqlx::query_as::<_, Gallery>(
            r#"
            INSERT INTO galleries (user_id, title)
            VALUES ($1, $2)
            RETURNING id, user_id, title, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(db)
        .await?;
        Ok(gallery)
    }

    pub async fn by_id(db: &PgPool, id: Uuid) -> Result<Option<Gallery>> {
        let gallery = sqlx::query_as::<_, Gallery>(
            r#"SELECT id, user_id, title, created_at, updated_at FROM galleries WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(gallery)
    }

    pub async fn by_user(
        db: &PgPool,
        user_id: Uuid,
        sort: SortColumn,
        order: SortOrder,
    ) -> Result<Vec<Gallery>> {
        // Both fragments come from closed enums, never from the request.
        let query = format!(
            "SELECT id, user_id, title, created_at, updated_at FROM galleries \
             WHERE user_id = $1 ORDER BY {} {}",
            sort.sql(),
            order.sql()
        );
        let rows = sqlx::query_as::<_, Gallery>(&query)
            .bind(user_id)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }

    pub async fn update_title(db: &PgPool, id: Uuid, title: &str) -> Result<Gallery> {
        let gallery = sqlx::query_as::<_, Gallery>(
            r#"
            UPDATE galleries
            SET title = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, title, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(title)
        .fetch_one(db)
        .await?;
        Ok(gallery)
    }

    /// Deletes the row only; the caller removes the image directory.
    pub async fn delete(db: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query(r#"DELETE FROM galleries WHERE id = $1"#)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Deletes every gallery owned by `user_id`, returning their ids so the
    /// caller can remove the image directories.
    pub async fn delete_by_user(db: &PgPool, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"DELETE FROM galleries WHERE user_id = $1 RETURNING id"#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_column_is_whitelisted() {
        assert_eq!(SortColumn::parse(Some("TITLE")), SortColumn::Title);
        assert_eq!(SortColumn::parse(Some("created_at")), SortColumn::CreatedAt);
        assert_eq!(
            SortColumn::parse(Some("title; DROP TABLE users")),
            SortColumn::CreatedAt
        );
        assert_eq!(SortColumn::parse(None), SortColumn::CreatedAt);
    }

    #[test]
    fn gallery_timestamps_are_rfc3339() {
        let gallery = Gallery {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Hyrule Field".into(),
            created_at: time::macros::datetime!(2024-03-01 12:30:00 UTC),
            updated_at: time::macros::datetime!(2024-03-02 08:00:00 UTC),
        };
        let json = serde_json::to_value(&gallery).unwrap();
        assert_eq!(json["created_at"], "2024-03-01T12:30:00Z");
        assert_eq!(json["updated_at"], "2024-03-02T08:00:00Z");
    }

    #[test]
    fn sort_order_defaults_to_desc() {
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("sideways")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }
}
