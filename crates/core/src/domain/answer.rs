use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::question::{OptionId, QuestionId};
use crate::domain::user::UserId;

/// One user's chosen option per answered question. Immutable once handed to the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSet {
    user_id: UserId,
    answers: BTreeMap<QuestionId, OptionId>,
}

impl AnswerSet {
    pub fn new(user_id: UserId, answers: BTreeMap<QuestionId, OptionId>) -> Self {
        Self { user_id, answers }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn get(&self, question_id: &QuestionId) -> Option<&OptionId> {
        self.answers.get(question_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &OptionId)> {
        self.answers.iter()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}
