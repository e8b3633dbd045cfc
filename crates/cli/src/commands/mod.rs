pub mod config;
pub mod doctor;
pub mod migrate;

use std::future::Future;

use psikotes_core::config::{AppConfig, DatabaseConfig, LoadOptions};
use psikotes_db::{connect_with_config, DbPool};
use serde::Serialize;
use thiserror::Error;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECT: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Plain-text output that is not wrapped in the JSON outcome envelope.
    pub fn text(exit_code: u8, output: impl Into<String>) -> Self {
        Self { exit_code, output: output.into() }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\
             \"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    })
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Failures that stop a database-backed command before its own work runs.
#[derive(Debug, Error)]
pub(crate) enum PoolError {
    #[error("failed to initialize async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),
}

impl PoolError {
    pub(crate) fn into_failure(self, command: &str) -> CommandResult {
        match self {
            Self::Runtime(_) => {
                CommandResult::failure(command, "runtime_init", self.to_string(), EXIT_RUNTIME)
            }
            Self::Connect(_) => CommandResult::failure(
                command,
                "db_connectivity",
                self.to_string(),
                EXIT_DB_CONNECT,
            ),
        }
    }
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

/// Connects on a single-threaded runtime, runs `work` and closes the pool whatever `work`
/// returned.
pub(crate) fn with_pool<T, F, Fut>(config: &DatabaseConfig, work: F) -> Result<T, PoolError>
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = T>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(PoolError::Runtime)?;

    runtime.block_on(async {
        let pool = connect_with_config(config).await.map_err(PoolError::Connect)?;
        let output = work(pool.clone()).await;
        pool.close().await;
        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use psikotes_core::config::DatabaseConfig;

    use super::{with_pool, EXIT_DB_CONNECT};

    fn database(url: &str) -> DatabaseConfig {
        DatabaseConfig { url: url.to_string(), max_connections: 1, timeout_secs: 1 }
    }

    #[test]
    fn work_runs_against_a_connected_pool() {
        let answer = with_pool(&database("sqlite::memory:"), |pool| async move {
            sqlx::query_scalar::<_, i64>("SELECT 41 + 1").fetch_one(&pool).await
        });

        assert_eq!(answer.expect("connected").expect("query"), 42);
    }

    #[test]
    fn unreachable_database_is_a_connectivity_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}", dir.path().join("missing").join("psikotes.db").display());

        let error = with_pool(&database(&url), |_pool| async {}).expect_err("no database file");
        let failure = error.into_failure("doctor");

        assert_eq!(failure.exit_code, EXIT_DB_CONNECT);
        assert!(failure.output.contains("\"error_class\":\"db_connectivity\""));
        assert!(failure.output.contains("failed to connect to database"));
    }
}
