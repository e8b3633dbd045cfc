use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use psikotes_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::text(2, format!("config validation failed: {error}")),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    CommandResult::text(0, render(&config, config_file_doc.as_ref(), config_file_path.as_deref()))
}

pub fn render(config: &AppConfig, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];

    for field in fields(config) {
        let source = field_source(field.key, field.env_keys, file_doc, file_path);
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn field(key: &'static str, env_keys: &'static [&'static str], value: String) -> Field {
    Field { key, env_keys, value }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("database.url", &["PSIKOTES_DATABASE_URL"], config.database.url.clone()),
        field(
            "database.max_connections",
            &["PSIKOTES_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            &["PSIKOTES_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        field(
            "llm.api_key",
            &["PSIKOTES_LLM_API_KEY"],
            redact_secret(config.llm.api_key.expose_secret()),
        ),
        field("llm.base_url", &["PSIKOTES_LLM_BASE_URL"], config.llm.base_url.clone()),
        field("llm.model", &["PSIKOTES_LLM_MODEL"], config.llm.model.clone()),
        field(
            "llm.timeout_secs",
            &["PSIKOTES_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        field(
            "llm.max_output_tokens",
            &["PSIKOTES_LLM_MAX_OUTPUT_TOKENS"],
            config.llm.max_output_tokens.to_string(),
        ),
        field(
            "llm.temperature",
            &["PSIKOTES_LLM_TEMPERATURE"],
            config.llm.temperature.to_string(),
        ),
        field("llm.max_retries", &["PSIKOTES_LLM_MAX_RETRIES"], config.llm.max_retries.to_string()),
        field(
            "llm.retry_backoff_ms",
            &["PSIKOTES_LLM_RETRY_BACKOFF_MS"],
            config.llm.retry_backoff_ms.to_string(),
        ),
        field(
            "llm.safety_threshold",
            &["PSIKOTES_LLM_SAFETY_THRESHOLD"],
            config.llm.safety_threshold.as_str().to_string(),
        ),
        field(
            "server.bind_address",
            &["PSIKOTES_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        field("server.port", &["PSIKOTES_SERVER_PORT"], config.server.port.to_string()),
        field(
            "logging.level",
            &["PSIKOTES_LOGGING_LEVEL", "PSIKOTES_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["PSIKOTES_LOGGING_FORMAT", "PSIKOTES_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) =
        env_keys.iter().find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()))
    {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps only a short prefix so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    match trimmed.char_indices().nth(4) {
        None if trimmed.is_empty() => "<empty>".to_string(),
        Some((cut, _)) if trimmed.chars().count() >= 12 => format!("{}***", &trimmed[..cut]),
        _ => "<redacted>".to_string(),
    }
}
