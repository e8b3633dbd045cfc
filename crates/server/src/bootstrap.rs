use std::sync::Arc;

use psikotes_agent::{
    AnalysisRuntime, GeminiGateway, InvocationPolicy, QuestionGenerator, QuestionnaireService,
    RetryPolicy,
};
use psikotes_core::config::{AppConfig, ConfigError, LoadOptions};
use psikotes_db::{
    connect_with_config, migrations, DbPool, SqlAnswerRepository, SqlQuestionRepository,
    SqlResultStore, SqlUserRepository,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AnalysisRuntime>,
    pub questionnaire: Arc<QuestionnaireService>,
    pub generator: Arc<QuestionGenerator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model gateway client could not be built: {0}")]
    Gateway(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let gateway =
        Arc::new(GeminiGateway::from_config(&config.llm).map_err(BootstrapError::Gateway)?);
    let invocation = InvocationPolicy::from_config(&config.llm);
    let retry = RetryPolicy::from_config(&config.llm);
    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let catalog = Arc::new(SqlQuestionRepository::new(db_pool.clone()));

    let runtime = AnalysisRuntime::new(
        gateway.clone(),
        Arc::new(SqlResultStore::new(db_pool.clone())),
        users.clone(),
        catalog.clone(),
    )
    .with_policies(invocation, retry);
    let generator = QuestionGenerator::new(gateway).with_policies(invocation, retry);

    let questionnaire = QuestionnaireService::new(
        users,
        catalog,
        Arc::new(SqlAnswerRepository::new(db_pool.clone())),
    );

    Ok(Application {
        config,
        db_pool,
        runtime: Arc::new(runtime),
        questionnaire: Arc::new(questionnaire),
        generator: Arc::new(generator),
    })
}

#[cfg(test)]
mod tests {
    use psikotes_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str, api_key: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_api_key: api_key.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_unsupported_database_url() {
        let result = bootstrap(options("postgres://localhost/psikotes", Some("test-key"))).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_wires_seeded_questionnaire_and_empty_results() {
        let app = bootstrap(options("sqlite::memory:", Some("test-key")))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let bank = app.questionnaire.questions().await.expect("question bank");
        assert_eq!(bank.len(), 30);

        let user = app.questionnaire.register_user("Sari").await.expect("register");
        let result = app.runtime.get_result("bootstrap-test", user.id).await.expect("read");
        assert_eq!(result, None);

        app.db_pool.close().await;
    }
}
