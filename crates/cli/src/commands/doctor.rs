use psikotes_core::config::{AppConfig, LoadOptions};
use psikotes_db::DbPool;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{escape_json, with_pool, CommandResult};

const EXPECTED_QUESTION_COUNT: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\
                 \"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::text(exit_code, output);
    }

    CommandResult::text(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_model_credential(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["model_credential", "database_connectivity", "question_bank"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Only the shape of the credential is checked; no request is sent to the provider.
fn check_model_credential(config: &AppConfig) -> DoctorCheck {
    let key = config.llm.api_key.expose_secret().trim();
    if key.chars().any(char::is_whitespace) {
        return DoctorCheck::fail("model_credential", "llm.api_key contains whitespace");
    }

    DoctorCheck::pass(
        "model_credential",
        format!(
            "api key present for model `{}` at {} (safety threshold {})",
            config.llm.model,
            config.llm.base_url,
            config.llm.safety_threshold.as_str()
        ),
    )
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let bank = with_pool(&config.database, |pool| async move { check_question_bank(&pool).await });

    match bank {
        Ok(bank) => vec![
            DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            bank,
        ],
        Err(error) => vec![
            DoctorCheck::fail("database_connectivity", error.to_string()),
            DoctorCheck::skipped("question_bank", "the database was not reachable"),
        ],
    }
}

async fn check_question_bank(pool: &DbPool) -> DoctorCheck {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT (SELECT COUNT(*) FROM questions), (SELECT COUNT(*) FROM question_options)",
    )
    .fetch_one(pool)
    .await;

    match counts {
        Ok((questions, options)) if questions >= EXPECTED_QUESTION_COUNT => DoctorCheck::pass(
            "question_bank",
            format!("{questions} questions with {options} options seeded"),
        ),
        Ok((questions, _)) => DoctorCheck::fail(
            "question_bank",
            format!(
                "expected {EXPECTED_QUESTION_COUNT} seeded questions, found {questions}; \
                 run `psikotes migrate`"
            ),
        ),
        Err(error) => DoctorCheck::fail(
            "question_bank",
            format!("question bank is not readable ({error}); run `psikotes migrate`"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
