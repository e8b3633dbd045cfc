pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{
    connect, connect_in_memory, connect_with_config, connect_with_settings, DbPool,
};
pub use repositories::{
    InMemoryAnswerStore, InMemoryQuestionCatalog, InMemoryResultStore, InMemoryUserDirectory,
    RepositoryError, SqlAnswerRepository, SqlQuestionRepository, SqlResultStore,
    SqlUserRepository,
};
