use chrono::{DateTime, Utc};
use thiserror::Error;

use psikotes_core::StoreError;

pub mod answer;
pub mod memory;
pub mod question;
pub mod result;
pub mod user;

pub use answer::SqlAnswerRepository;
pub use memory::{
    InMemoryAnswerStore, InMemoryQuestionCatalog, InMemoryResultStore, InMemoryUserDirectory,
};
pub use question::SqlQuestionRepository;
pub use result::SqlResultStore;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Backend(error.to_string()),
            RepositoryError::Decode(message) => Self::Corrupt(message),
        }
    }
}

fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

/// Timestamps are stored as RFC 3339 text.
fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("{column} `{raw}` is not RFC 3339: {error}"))
        })
}
