use psikotes_db::migrations;

use crate::commands::{load_config, with_pool, CommandResult, EXIT_MIGRATION};

const COMMAND: &str = "migrate";

pub fn run() -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let applied = with_pool(&config.database, |pool| async move {
        migrations::run_pending(&pool).await
    });

    match applied {
        Ok(Ok(())) => CommandResult::success(
            COMMAND,
            format!("schema and question bank are current at `{}`", config.database.url),
        ),
        Ok(Err(error)) => {
            CommandResult::failure(COMMAND, "migration", error.to_string(), EXIT_MIGRATION)
        }
        Err(error) => error.into_failure(COMMAND),
    }
}
