use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::Row;

use psikotes_core::{AnswerSet, AnswerStore, OptionId, QuestionId, StoreError, UserId};

use super::{decode_error, RepositoryError};
use crate::DbPool;

pub struct SqlAnswerRepository {
    pool: DbPool,
}

impl SqlAnswerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn upsert(
        &self,
        user_id: UserId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO answers (user_id, question_id, option_id, answered_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, question_id) DO UPDATE SET
                 option_id = excluded.option_id,
                 answered_at = excluded.answered_at",
        )
        .bind(user_id.0)
        .bind(&question_id.0)
        .bind(&option_id.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn select_for_user(&self, user_id: UserId) -> Result<AnswerSet, RepositoryError> {
        let rows = sqlx::query("SELECT question_id, option_id FROM answers WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;

        let mut answers = BTreeMap::new();
        for row in rows {
            let question_id: String = row.try_get("question_id").map_err(decode_error)?;
            let option_id: String = row.try_get("option_id").map_err(decode_error)?;
            answers.insert(QuestionId(question_id), OptionId(option_id));
        }
        Ok(AnswerSet::new(user_id, answers))
    }
}

#[async_trait::async_trait]
impl AnswerStore for SqlAnswerRepository {
    async fn save_answer(
        &self,
        user_id: UserId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), StoreError> {
        Ok(self.upsert(user_id, question_id, option_id).await?)
    }

    async fn load_answers(&self, user_id: UserId) -> Result<AnswerSet, StoreError> {
        Ok(self.select_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use psikotes_core::{AnswerStore, OptionId, QuestionId, UserDirectory, UserId};

    use super::SqlAnswerRepository;
    use crate::repositories::SqlUserRepository;
    use crate::{connect_in_memory, migrations::run_pending};

    fn q(id: &str) -> QuestionId {
        QuestionId(id.to_string())
    }

    fn o(id: &str) -> OptionId {
        OptionId(id.to_string())
    }

    #[tokio::test]
    async fn latest_answer_per_question_wins() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let user = SqlUserRepository::new(pool.clone()).register_user("Rina").await.expect("user");
        let answers = SqlAnswerRepository::new(pool);

        answers.save_answer(user.id, &q("1"), &o("1")).await.expect("first answer");
        answers.save_answer(user.id, &q("2"), &o("7")).await.expect("second question");
        answers.save_answer(user.id, &q("1"), &o("4")).await.expect("changed mind");

        let set = answers.load_answers(user.id).await.expect("load");
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(&q("1")), Some(&o("4")));
        assert_eq!(set.get(&q("2")), Some(&o("7")));
    }

    #[tokio::test]
    async fn user_without_answers_loads_empty_set() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let set = SqlAnswerRepository::new(pool).load_answers(UserId(5)).await.expect("load");
        assert!(set.is_empty());
        assert_eq!(set.user_id(), UserId(5));
    }

    #[tokio::test]
    async fn unknown_user_is_rejected_by_foreign_key() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let result = SqlAnswerRepository::new(pool).save_answer(UserId(77), &q("1"), &o("1")).await;
        assert!(result.is_err());
    }
}
