//! Storage seams used by the analysis pipeline and the questionnaire host. SQL and in-memory
//! implementations live in `psikotes-db`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::answer::AnswerSet;
use crate::domain::question::{OptionId, QuestionBank, QuestionId};
use crate::domain::result::PersonalityResult;
use crate::domain::user::{User, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Corrupt(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    AlreadyExists,
}

/// Holds exactly one [`PersonalityResult`] per user.
///
/// `put_if_absent` must be atomic at the storage layer: of any number of concurrent calls
/// for the same user, exactly one observes [`PutOutcome::Inserted`] and an existing record
/// is never overwritten.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<PersonalityResult>, StoreError>;

    async fn put_if_absent(&self, result: &PersonalityResult) -> Result<PutOutcome, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Assigns a fresh id. The name is stored as given; callers validate it first.
    async fn register_user(&self, display_name: &str) -> Result<User, StoreError>;

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    async fn question_bank(&self) -> Result<QuestionBank, StoreError>;
}

/// Incrementally saved quiz answers. The latest answer per (user, question) wins.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    async fn save_answer(
        &self,
        user_id: UserId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), StoreError>;

    async fn load_answers(&self, user_id: UserId) -> Result<AnswerSet, StoreError>;
}
