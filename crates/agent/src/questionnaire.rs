use std::sync::Arc;

use psikotes_core::{
    AnswerSet, AnswerStore, OptionId, PipelineError, QuestionBank, QuestionCatalog, QuestionId,
    User, UserDirectory, UserId, ValidationError,
};

/// Registration, question listing and incremental answer capture. These feed the analysis
/// pipeline but never call the model.
pub struct QuestionnaireService {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn QuestionCatalog>,
    answers: Arc<dyn AnswerStore>,
}

impl QuestionnaireService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn QuestionCatalog>,
        answers: Arc<dyn AnswerStore>,
    ) -> Self {
        Self { users, catalog, answers }
    }

    pub async fn register_user(&self, username: &str) -> Result<User, PipelineError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::MissingUsername.into());
        }
        let user = self.users.register_user(username).await?;
        tracing::info!(
            event_name = "questionnaire.user.registered",
            user_id = user.id.0,
            "registered questionnaire user"
        );
        Ok(user)
    }

    pub async fn questions(&self) -> Result<QuestionBank, PipelineError> {
        Ok(self.catalog.question_bank().await?)
    }

    pub async fn save_answer(
        &self,
        user_id: UserId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), PipelineError> {
        if self.users.find_user(user_id).await?.is_none() {
            return Err(ValidationError::UnknownUser(user_id).into());
        }

        let bank = self.catalog.question_bank().await?;
        let belongs = bank
            .get(question_id)
            .is_some_and(|question| question.option(option_id).is_some());
        if !belongs {
            return Err(ValidationError::InvalidAnswer {
                question_id: question_id.clone(),
                option_id: option_id.clone(),
            }
            .into());
        }

        self.answers.save_answer(user_id, question_id, option_id).await?;
        tracing::debug!(
            event_name = "questionnaire.answer.saved",
            user_id = user_id.0,
            question_id = %question_id,
            option_id = %option_id,
            "saved answer"
        );
        Ok(())
    }

    pub async fn saved_answers(&self, user_id: UserId) -> Result<AnswerSet, PipelineError> {
        Ok(self.answers.load_answers(user_id).await?)
    }
}
