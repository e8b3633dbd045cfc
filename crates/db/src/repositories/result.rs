use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};

use psikotes_core::{PersonalityResult, PutOutcome, ResultSource, ResultStore, StoreError, UserId};

use super::{decode_error, parse_timestamp, RepositoryError};
use crate::DbPool;

/// SQLite-backed result store. `results.user_id` is the primary key, so the conditional insert
/// is decided by SQLite rather than by a read in application code.
pub struct SqlResultStore {
    pool: DbPool,
}

impl SqlResultStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn select(&self, user_id: UserId) -> Result<Option<PersonalityResult>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                user_id,
                username,
                personality_type,
                interest_category,
                summary,
                recommendations_json,
                analysis_json,
                source,
                created_at
            FROM results
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_result).transpose()
    }

    async fn insert_if_absent(
        &self,
        result: &PersonalityResult,
    ) -> Result<PutOutcome, RepositoryError> {
        let recommendations_json =
            serde_json::to_string(&result.recommendations).map_err(decode_error)?;
        let analysis_json = serde_json::to_string(&result.analysis_json).map_err(decode_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO results (
                user_id,
                username,
                personality_type,
                interest_category,
                summary,
                recommendations_json,
                analysis_json,
                source,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(result.user_id.0)
        .bind(&result.username)
        .bind(&result.personality_type)
        .bind(&result.interest_category)
        .bind(&result.summary)
        .bind(recommendations_json)
        .bind(analysis_json)
        .bind(result.source.as_str())
        .bind(result.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(match inserted.rows_affected() {
            0 => PutOutcome::AlreadyExists,
            _ => PutOutcome::Inserted,
        })
    }
}

fn row_to_result(row: &SqliteRow) -> Result<PersonalityResult, RepositoryError> {
    let user_id: i64 = row.try_get("user_id").map_err(decode_error)?;
    let recommendations_json: String = row.try_get("recommendations_json").map_err(decode_error)?;
    let analysis_json: String = row.try_get("analysis_json").map_err(decode_error)?;
    let source: String = row.try_get("source").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let recommendations: Vec<String> =
        serde_json::from_str(&recommendations_json).map_err(|error| {
            RepositoryError::Decode(format!("failed to decode recommendations_json: {error}"))
        })?;
    let analysis_json: BTreeMap<String, f64> =
        serde_json::from_str(&analysis_json).map_err(|error| {
            RepositoryError::Decode(format!("failed to decode analysis_json: {error}"))
        })?;
    let source = ResultSource::parse(&source)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown result source `{source}`")))?;

    Ok(PersonalityResult {
        user_id: UserId(user_id),
        username: row.try_get("username").map_err(decode_error)?,
        personality_type: row.try_get("personality_type").map_err(decode_error)?,
        interest_category: row.try_get("interest_category").map_err(decode_error)?,
        summary: row.try_get("summary").map_err(decode_error)?,
        recommendations,
        analysis_json,
        source,
        created_at: parse_timestamp("results.created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl ResultStore for SqlResultStore {
    async fn get(&self, user_id: UserId) -> Result<Option<PersonalityResult>, StoreError> {
        Ok(self.select(user_id).await?)
    }

    async fn put_if_absent(&self, result: &PersonalityResult) -> Result<PutOutcome, StoreError> {
        Ok(self.insert_if_absent(result).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use psikotes_core::{
        synthesize_fallback, PersonalityResult, PutOutcome, ReportContent, ResultSource,
        ResultStore, UserDirectory, UserId,
    };

    use super::SqlResultStore;
    use crate::repositories::SqlUserRepository;
    use crate::{connect_in_memory, migrations::run_pending, DbPool};

    async fn pool_with_user(name: &str) -> (DbPool, UserId) {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let user = SqlUserRepository::new(pool.clone()).register_user(name).await.expect("user");
        (pool, user.id)
    }

    fn ai_result(user_id: UserId, personality_type: &str) -> PersonalityResult {
        let content = ReportContent {
            personality_type: personality_type.to_string(),
            interest_category: "Sosial".to_string(),
            summary: "Kamu senang membantu orang lain.".to_string(),
            recommendations: vec!["Guru".to_string(), "Konselor".to_string()],
            analysis_json: [("Empati", 50.0), ("Komunikasi", 30.5), ("Kesabaran", 19.5)]
                .into_iter()
                .map(|(aspect, weight)| (aspect.to_string(), weight))
                .collect(),
        };
        PersonalityResult::from_content(
            user_id,
            "Rina",
            content,
            ResultSource::AiGenerated,
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).single().expect("timestamp"),
        )
    }

    #[tokio::test]
    async fn get_returns_none_before_first_put() {
        let (pool, user_id) = pool_with_user("Rina").await;
        let store = SqlResultStore::new(pool);

        assert!(store.get(user_id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_every_field() {
        let (pool, user_id) = pool_with_user("Rina").await;
        let store = SqlResultStore::new(pool);
        let result = ai_result(user_id, "Sang Penolong");

        assert_eq!(store.put_if_absent(&result).await.expect("put"), PutOutcome::Inserted);
        assert_eq!(store.get(user_id).await.expect("get"), Some(result));
    }

    #[tokio::test]
    async fn second_put_never_overwrites() {
        let (pool, user_id) = pool_with_user("Rina").await;
        let store = SqlResultStore::new(pool.clone());
        let first = ai_result(user_id, "Sang Penolong");

        store.put_if_absent(&first).await.expect("first put");
        let second = PersonalityResult::from_content(
            user_id,
            "Rina",
            synthesize_fallback("TRANSPORT_ERROR: timed out"),
            ResultSource::Fallback,
            Utc::now(),
        );

        assert_eq!(
            store.put_if_absent(&second).await.expect("second put"),
            PutOutcome::AlreadyExists
        );
        assert_eq!(store.get(user_id).await.expect("get"), Some(first));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn concurrent_puts_insert_exactly_once() {
        let (pool, user_id) = pool_with_user("Rina").await;
        let store = Arc::new(SqlResultStore::new(pool));

        let handles: Vec<_> = (0..8)
            .map(|attempt| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .put_if_absent(&ai_result(user_id, &format!("Tipe {attempt}")))
                        .await
                        .expect("put")
                })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.expect("join") == PutOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn result_for_unregistered_user_is_a_backend_error() {
        let (pool, _) = pool_with_user("Rina").await;
        let store = SqlResultStore::new(pool);

        assert!(store.put_if_absent(&ai_result(UserId(404), "x")).await.is_err());
    }
}
