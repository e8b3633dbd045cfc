//! JSON API for the questionnaire front-end.
//!
//! - `POST /api/v1/users`              register a respondent
//! - `GET  /api/v1/questions`          ordered question bank with lettered options
//! - `GET  /api/v1/questions/generate` fresh model-authored bank, returned but not stored
//! - `POST /api/v1/answers`            save one answer (latest per question wins)
//! - `POST /api/v1/analysis`           run the analysis pipeline once for a user
//! - `GET  /api/v1/results/{user_id}`  read the stored report, never computes
//!
//! Every body is an envelope `{ status, result?, message? }`. Identifiers are accepted as
//! JSON numbers or numeric strings.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use psikotes_agent::{AnalysisRuntime, QuestionGenerator, QuestionnaireService};
use psikotes_core::domain::question::option_label;
use psikotes_core::{
    AnalysisFailure, AnswerSet, InterfaceError, OptionId, PersonalityResult, PipelineError,
    QuestionBank, QuestionId, ResultSource, UserId, ValidationError,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

const MESSAGE_STORED: &str = "Analisis kepribadian berhasil disimpan.";
const MESSAGE_STORED_FALLBACK: &str =
    "Analisis kepribadian berhasil disimpan (menggunakan data default karena kendala AI).";
const MESSAGE_ANSWER_SAVED: &str = "Jawaban berhasil disimpan.";
const MESSAGE_USER_REGISTERED: &str = "Pengguna berhasil didaftarkan.";
const MESSAGE_NOT_AVAILABLE: &str = "not yet available";

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AnalysisRuntime>,
    questionnaire: Arc<QuestionnaireService>,
    generator: Arc<QuestionGenerator>,
}

impl ApiState {
    pub fn new(
        runtime: Arc<AnalysisRuntime>,
        questionnaire: Arc<QuestionnaireService>,
        generator: Arc<QuestionGenerator>,
    ) -> Self {
        Self { runtime, questionnaire, generator }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    fn into_user_id(self) -> Result<UserId, ValidationError> {
        match self {
            Self::Number(value) if value > 0 => Ok(UserId(value)),
            Self::Number(value) => Err(ValidationError::InvalidUserId(value.to_string())),
            Self::Text(raw) => UserId::parse(&raw),
        }
    }

    fn into_key(self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(raw) => raw.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveAnswerRequest {
    #[serde(default)]
    pub user_id: Option<WireId>,
    pub question_id: WireId,
    pub option_id: WireId,
}

/// `answers` may be omitted, in which case the answers saved so far are analysed.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswersRequest {
    #[serde(default)]
    pub user_id: Option<WireId>,
    #[serde(default)]
    pub answers: Option<BTreeMap<String, WireId>>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    fn success(result: Option<T>, message: Option<&str>) -> Self {
        Self { status: "success", result, message: message.map(str::to_string) }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub status: &'static str,
    pub user_id: i64,
    pub username: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WireResult {
    pub user_id: i64,
    pub username: String,
    pub personality_type: String,
    pub interest_category: String,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub analysis_json: BTreeMap<String, f64>,
    pub source: &'static str,
    pub created_at: String,
}

impl From<PersonalityResult> for WireResult {
    fn from(result: PersonalityResult) -> Self {
        Self {
            user_id: result.user_id.0,
            username: result.username,
            personality_type: result.personality_type,
            interest_category: result.interest_category,
            summary: result.summary,
            recommendations: result.recommendations,
            analysis_json: result.analysis_json,
            source: result.source.as_str(),
            created_at: result.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WireQuestion {
    pub question_id: String,
    pub question_text: String,
    pub options: Vec<WireOption>,
}

#[derive(Debug, Serialize)]
pub struct WireOption {
    pub label: String,
    pub option_id: String,
    pub option_text: String,
}

fn wire_questions(bank: QuestionBank) -> Vec<WireQuestion> {
    bank.questions()
        .iter()
        .map(|question| WireQuestion {
            question_id: question.id.0.clone(),
            question_text: question.text.clone(),
            options: question
                .options
                .iter()
                .enumerate()
                .map(|(position, option)| WireOption {
                    label: option_label(position),
                    option_id: option.id.0.clone(),
                    option_text: option.text.clone(),
                })
                .collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn pipeline(error: PipelineError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    fn validation(error: ValidationError, correlation_id: &str) -> Self {
        Self::pipeline(error.into(), correlation_id)
    }

    /// A provider outage is retryable; a refused or unusable answer is not.
    fn generation(failure: AnalysisFailure, correlation_id: &str) -> Self {
        let message = format!("question generation failed: {failure}");
        match failure {
            AnalysisFailure::Transport { .. } => Self(InterfaceError::ServiceUnavailable {
                message,
                correlation_id: correlation_id.to_string(),
            }),
            _ => Self(InterfaceError::internal(message, correlation_id)),
        }
    }

    fn malformed_body(rejection: JsonRejection, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: rejection.body_text(),
            correlation_id: correlation_id.to_string(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Caller input problems are echoed; backend detail stays in the logs.
        let message = match &self.0 {
            InterfaceError::BadRequest { .. } | InterfaceError::NotFound { .. } => {
                self.0.message().to_string()
            }
            other => {
                warn!(
                    event_name = "api.request.failed",
                    correlation_id = other.correlation_id(),
                    error = %other,
                    "request failed"
                );
                other.user_message().to_string()
            }
        };

        let body = ErrorEnvelope {
            status: "error",
            message,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/users", post(register_user))
        .route("/api/v1/questions", get(list_questions))
        .route("/api/v1/questions/generate", get(generate_questions))
        .route("/api/v1/answers", post(save_answer))
        .route("/api/v1/analysis", post(submit_answers))
        .route("/api/v1/results/{user_id}", get(get_result))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

fn required_user_id(raw: Option<WireId>) -> Result<UserId, ValidationError> {
    raw.ok_or(ValidationError::MissingUserId)?.into_user_id()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn register_user(
    State(state): State<ApiState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let correlation_id = new_correlation_id();
    let Json(request) =
        payload.map_err(|rejection| ApiError::malformed_body(rejection, &correlation_id))?;

    let user = state
        .questionnaire
        .register_user(request.username.as_deref().unwrap_or_default())
        .await
        .map_err(|error| ApiError::pipeline(error, &correlation_id))?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredUser {
            status: "success",
            user_id: user.id.0,
            username: user.display_name,
            message: MESSAGE_USER_REGISTERED,
        }),
    ))
}

async fn list_questions(
    State(state): State<ApiState>,
) -> Result<Json<Envelope<Vec<WireQuestion>>>, ApiError> {
    let correlation_id = new_correlation_id();
    let bank = state
        .questionnaire
        .questions()
        .await
        .map_err(|error| ApiError::pipeline(error, &correlation_id))?;

    Ok(Json(Envelope::success(Some(wire_questions(bank)), None)))
}

async fn generate_questions(
    State(state): State<ApiState>,
) -> Result<Json<Envelope<Vec<WireQuestion>>>, ApiError> {
    let correlation_id = new_correlation_id();
    let bank = state
        .generator
        .generate(&correlation_id)
        .await
        .map_err(|failure| ApiError::generation(failure, &correlation_id))?;

    Ok(Json(Envelope::success(Some(wire_questions(bank)), None)))
}

async fn save_answer(
    State(state): State<ApiState>,
    payload: Result<Json<SaveAnswerRequest>, JsonRejection>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let correlation_id = new_correlation_id();
    let Json(request) =
        payload.map_err(|rejection| ApiError::malformed_body(rejection, &correlation_id))?;
    let user_id = required_user_id(request.user_id)
        .map_err(|error| ApiError::validation(error, &correlation_id))?;

    state
        .questionnaire
        .save_answer(
            user_id,
            &QuestionId(request.question_id.into_key()),
            &OptionId(request.option_id.into_key()),
        )
        .await
        .map_err(|error| ApiError::pipeline(error, &correlation_id))?;

    Ok(Json(Envelope::success(None, Some(MESSAGE_ANSWER_SAVED))))
}

async fn submit_answers(
    State(state): State<ApiState>,
    payload: Result<Json<SubmitAnswersRequest>, JsonRejection>,
) -> Result<Json<Envelope<WireResult>>, ApiError> {
    let correlation_id = new_correlation_id();
    let Json(request) =
        payload.map_err(|rejection| ApiError::malformed_body(rejection, &correlation_id))?;
    let user_id = required_user_id(request.user_id)
        .map_err(|error| ApiError::validation(error, &correlation_id))?;

    let answers = match request.answers {
        Some(answers) => AnswerSet::new(
            user_id,
            answers
                .into_iter()
                .map(|(question, option)| {
                    (QuestionId(question.trim().to_string()), OptionId(option.into_key()))
                })
                .collect(),
        ),
        None => state
            .questionnaire
            .saved_answers(user_id)
            .await
            .map_err(|error| ApiError::pipeline(error, &correlation_id))?,
    };

    info!(
        event_name = "api.analysis.requested",
        correlation_id = %correlation_id,
        user_id = user_id.0,
        answer_count = answers.len(),
        "analysis requested"
    );

    // Detached so a disconnecting caller cannot cancel the store write.
    let runtime = Arc::clone(&state.runtime);
    let task_correlation_id = correlation_id.clone();
    let outcome =
        tokio::spawn(async move { runtime.submit_answers(&task_correlation_id, answers).await })
            .await
            .map_err(|error| {
                ApiError(InterfaceError::internal(
                    format!("analysis task aborted: {error}"),
                    &correlation_id,
                ))
            })?
            .map_err(|error| ApiError::pipeline(error, &correlation_id))?;

    let message = match outcome.result.source {
        ResultSource::AiGenerated => MESSAGE_STORED,
        ResultSource::Fallback => MESSAGE_STORED_FALLBACK,
    };
    Ok(Json(Envelope::success(Some(WireResult::from(outcome.result)), Some(message))))
}

async fn get_result(
    State(state): State<ApiState>,
    Path(raw_user_id): Path<String>,
) -> Result<Json<Envelope<WireResult>>, ApiError> {
    let correlation_id = new_correlation_id();
    let user_id = UserId::parse(&raw_user_id)
        .map_err(|error| ApiError::validation(error, &correlation_id))?;

    match state
        .runtime
        .get_result(&correlation_id, user_id)
        .await
        .map_err(|error| ApiError::pipeline(error, &correlation_id))?
    {
        Some(result) => Ok(Json(Envelope::success(Some(WireResult::from(result)), None))),
        None => Err(ApiError(InterfaceError::not_found(MESSAGE_NOT_AVAILABLE, &correlation_id))),
    }
}
