use sqlx::Row;

use psikotes_core::{
    OptionId, Question, QuestionBank, QuestionCatalog, QuestionId, QuestionOption, StoreError,
};

use super::{decode_error, RepositoryError};
use crate::DbPool;

/// Reads the seeded questionnaire. Questions come back ordered by position, options by their
/// position within the question.
pub struct SqlQuestionRepository {
    pool: DbPool,
}

impl SqlQuestionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_bank(&self) -> Result<QuestionBank, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                q.id AS question_id,
                q.text AS question_text,
                o.id AS option_id,
                o.text AS option_text
            FROM questions q
            LEFT JOIN question_options o ON o.question_id = q.id
            ORDER BY q.position, q.id, o.position, o.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut questions: Vec<Question> = Vec::new();
        for row in rows {
            let question_id: String = row.try_get("question_id").map_err(decode_error)?;
            let option_id: Option<String> = row.try_get("option_id").map_err(decode_error)?;
            let option_text: Option<String> = row.try_get("option_text").map_err(decode_error)?;

            let starts_new_question =
                questions.last().map_or(true, |question| question.id.0 != question_id);
            if starts_new_question {
                let question_text: String = row.try_get("question_text").map_err(decode_error)?;
                questions.push(Question {
                    id: QuestionId(question_id),
                    text: question_text,
                    options: Vec::new(),
                });
            }

            if let (Some(option_id), Some(option_text), Some(question)) =
                (option_id, option_text, questions.last_mut())
            {
                question
                    .options
                    .push(QuestionOption { id: OptionId(option_id), text: option_text });
            }
        }

        Ok(QuestionBank::new(questions))
    }
}

#[async_trait::async_trait]
impl QuestionCatalog for SqlQuestionRepository {
    async fn question_bank(&self) -> Result<QuestionBank, StoreError> {
        Ok(self.load_bank().await?)
    }
}

#[cfg(test)]
mod tests {
    use psikotes_core::{OptionId, QuestionCatalog, QuestionId};

    use super::SqlQuestionRepository;
    use crate::{connect_in_memory, migrations::run_pending};

    #[tokio::test]
    async fn seeded_bank_is_ordered_with_options() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let bank = SqlQuestionRepository::new(pool).question_bank().await.expect("bank");

        assert_eq!(bank.len(), 30);
        let ids: Vec<&str> = bank.questions().iter().map(|q| q.id.0.as_str()).collect();
        assert_eq!(ids[..3], ["1", "2", "3"]);
        assert_eq!(ids[29], "30");

        let first = bank.get(&QuestionId("1".to_string())).expect("question 1");
        assert_eq!(first.options.len(), 5);
        assert_eq!(first.options[0].id, OptionId("1".to_string()));
        assert_eq!(first.options[0].text, "Mencoba memahaminya sendiri dulu");
        assert!(bank.questions().iter().all(|question| question.options.len() == 5));
    }
}
