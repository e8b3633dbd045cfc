use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;

use psikotes_core::{
    AnswerSet, AnswerStore, OptionId, PersonalityResult, PutOutcome, QuestionBank,
    QuestionCatalog, QuestionId, ResultStore, StoreError, User, UserDirectory, UserId,
};

/// The existence check and the insert happen under one write guard, which is what makes
/// `put_if_absent` atomic here.
#[derive(Default)]
pub struct InMemoryResultStore {
    results: RwLock<HashMap<UserId, PersonalityResult>>,
}

#[async_trait::async_trait]
impl ResultStore for InMemoryResultStore {
    async fn get(&self, user_id: UserId) -> Result<Option<PersonalityResult>, StoreError> {
        let results = self.results.read().await;
        Ok(results.get(&user_id).cloned())
    }

    async fn put_if_absent(&self, result: &PersonalityResult) -> Result<PutOutcome, StoreError> {
        let mut results = self.results.write().await;
        if results.contains_key(&result.user_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        results.insert(result.user_id, result.clone());
        Ok(PutOutcome::Inserted)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<UserId, User>>,
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn register_user(&self, display_name: &str) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let next_id = users.keys().next_back().map_or(1, |last| last.0 + 1);
        let user = User {
            id: UserId(next_id),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&user_id).cloned())
    }
}

pub struct InMemoryQuestionCatalog {
    bank: QuestionBank,
}

impl InMemoryQuestionCatalog {
    pub fn new(bank: QuestionBank) -> Self {
        Self { bank }
    }
}

#[async_trait::async_trait]
impl QuestionCatalog for InMemoryQuestionCatalog {
    async fn question_bank(&self) -> Result<QuestionBank, StoreError> {
        Ok(self.bank.clone())
    }
}

#[derive(Default)]
pub struct InMemoryAnswerStore {
    answers: RwLock<HashMap<UserId, BTreeMap<QuestionId, OptionId>>>,
}

#[async_trait::async_trait]
impl AnswerStore for InMemoryAnswerStore {
    async fn save_answer(
        &self,
        user_id: UserId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), StoreError> {
        let mut answers = self.answers.write().await;
        answers.entry(user_id).or_default().insert(question_id.clone(), option_id.clone());
        Ok(())
    }

    async fn load_answers(&self, user_id: UserId) -> Result<AnswerSet, StoreError> {
        let answers = self.answers.read().await;
        Ok(AnswerSet::new(user_id, answers.get(&user_id).cloned().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use psikotes_core::{
        synthesize_fallback, AnswerStore, OptionId, PersonalityResult, PutOutcome, QuestionId,
        ResultSource, ResultStore, UserDirectory, UserId,
    };

    use super::{InMemoryAnswerStore, InMemoryResultStore, InMemoryUserDirectory};

    fn fallback_result(user_id: UserId, cause: &str) -> PersonalityResult {
        PersonalityResult::from_content(
            user_id,
            "Dimas",
            synthesize_fallback(cause),
            ResultSource::Fallback,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn result_store_keeps_first_write() {
        let store = InMemoryResultStore::default();
        let first = fallback_result(UserId(1), "first");

        assert_eq!(store.put_if_absent(&first).await.expect("put"), PutOutcome::Inserted);
        assert_eq!(
            store.put_if_absent(&fallback_result(UserId(1), "second")).await.expect("put"),
            PutOutcome::AlreadyExists
        );
        assert_eq!(store.get(UserId(1)).await.expect("get"), Some(first));
        assert_eq!(store.get(UserId(2)).await.expect("get"), None);
    }

    #[tokio::test]
    async fn concurrent_puts_have_one_winner() {
        let store = Arc::new(InMemoryResultStore::default());
        let handles: Vec<_> = (0..16)
            .map(|attempt| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .put_if_absent(&fallback_result(UserId(3), &format!("attempt {attempt}")))
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
    async fn user_directory_assigns_sequential_ids() {
        let users = InMemoryUserDirectory::default();
        let first = users.register_user("Ani").await.expect("register");
        let second = users.register_user("Budi").await.expect("register");

        assert_eq!(first.id, UserId(1));
        assert_eq!(second.id, UserId(2));
        assert_eq!(
            users.find_user(UserId(2)).await.expect("find").map(|user| user.display_name),
            Some("Budi".to_string())
        );
    }

    #[tokio::test]
    async fn answer_store_overwrites_per_question() {
        let answers = InMemoryAnswerStore::default();
        let question = QuestionId("4".to_string());

        answers.save_answer(UserId(1), &question, &OptionId("16".to_string())).await.expect("save");
        answers.save_answer(UserId(1), &question, &OptionId("18".to_string())).await.expect("save");

        let set = answers.load_answers(UserId(1)).await.expect("load");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&question), Some(&OptionId("18".to_string())));
        assert!(answers.load_answers(UserId(2)).await.expect("load").is_empty());
    }
}
