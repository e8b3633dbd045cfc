use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use psikotes_core::{StoreError, User, UserDirectory, UserId};

use super::{decode_error, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, display_name: &str) -> Result<User, RepositoryError> {
        let created_at = Utc::now();
        let inserted = sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?)")
            .bind(display_name)
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(User {
            id: UserId(inserted.last_insert_rowid()),
            display_name: display_name.to_string(),
            created_at,
        })
    }

    async fn select(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, username, created_at FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let username: String = row.try_get("username").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    Ok(User {
        id: UserId(id),
        display_name: username,
        created_at: parse_timestamp("users.created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl UserDirectory for SqlUserRepository {
    async fn register_user(&self, display_name: &str) -> Result<User, StoreError> {
        Ok(self.insert(display_name).await?)
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.select(user_id).await?)
    }
}
