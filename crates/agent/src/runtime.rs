use std::sync::Arc;

use chrono::Utc;
use psikotes_core::{
    build_prompt, normalize, synthesize_fallback, AnalysisFailure, AnswerSet, PersonalityResult,
    PipelineError, PutOutcome, QuestionCatalog, ReportContent, ResultSource, ResultStore,
    SkippedAnswer, UserDirectory, UserId, ValidationError,
};

use crate::gateway::{invoke_with_retry, ModelGateway, RawModelOutput};
use crate::policy::{InvocationPolicy, RetryPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    AiCalled,
    Normalized,
    Fallback,
    Stored,
    Done,
    RequestFailed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::AiCalled => "AI_CALLED",
            Self::Normalized => "NORMALIZED",
            Self::Fallback => "FALLBACK",
            Self::Stored => "STORED",
            Self::Done => "DONE",
            Self::RequestFailed => "REQUEST_FAILED",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitOutcome {
    pub result: PersonalityResult,
    /// False when an earlier submission's result was returned instead of this run's.
    pub newly_stored: bool,
}

/// Orchestrates one submission: validate, prompt, invoke, normalize or fall back, store.
pub struct AnalysisRuntime {
    gateway: Arc<dyn ModelGateway>,
    results: Arc<dyn ResultStore>,
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn QuestionCatalog>,
    invocation: InvocationPolicy,
    retry: RetryPolicy,
}

impl AnalysisRuntime {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        results: Arc<dyn ResultStore>,
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn QuestionCatalog>,
    ) -> Self {
        Self {
            gateway,
            results,
            users,
            catalog,
            invocation: InvocationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policies(mut self, invocation: InvocationPolicy, retry: RetryPolicy) -> Self {
        self.invocation = invocation;
        self.retry = retry;
        self
    }

    pub async fn submit_answers(
        &self,
        correlation_id: &str,
        answers: AnswerSet,
    ) -> Result<SubmitOutcome, PipelineError> {
        let user_id = answers.user_id();
        if answers.is_empty() {
            return Err(ValidationError::EmptyAnswers.into());
        }
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(ValidationError::UnknownUser(user_id))?;

        if let Some(existing) = self.results.get(user_id).await? {
            tracing::info!(
                event_name = "analysis.store.cache_hit",
                correlation_id,
                user_id = user_id.0,
                source = existing.source.as_str(),
                "returning stored result without model call"
            );
            transition(correlation_id, user_id, PipelineState::Start, PipelineState::Done);
            return Ok(SubmitOutcome { result: existing, newly_stored: false });
        }

        let bank = self.catalog.question_bank().await?;
        let prompt = build_prompt(&user.display_name, &answers, &bank);
        for skipped in &prompt.skipped {
            log_skipped_answer(correlation_id, user_id, skipped);
        }
        tracing::debug!(
            event_name = "analysis.prompt.built",
            correlation_id,
            user_id = user_id.0,
            prompt_fingerprint = %prompt.fingerprint(),
            prompt_chars = prompt.text.chars().count(),
            rendered_answers = prompt.rendered_answers,
            "built analysis prompt"
        );

        let output = invoke_with_retry(
            self.gateway.as_ref(),
            &prompt.text,
            &self.invocation,
            &self.retry,
            |attempt, output| {
                tracing::info!(
                    event_name = "analysis.gateway.outcome",
                    correlation_id,
                    user_id = user_id.0,
                    attempt,
                    finish_reason = output.finish_reason.as_str(),
                    detail = output.detail.as_deref().unwrap_or(""),
                    "model call finished"
                );
            },
        )
        .await;
        transition(correlation_id, user_id, PipelineState::Start, PipelineState::AiCalled);

        let (content, source, state) = match evaluate(output) {
            Ok(content) => (content, ResultSource::AiGenerated, PipelineState::Normalized),
            Err(failure) => {
                if let AnalysisFailure::Normalization(error) = &failure {
                    tracing::warn!(
                        event_name = "analysis.normalize.failed",
                        correlation_id,
                        user_id = user_id.0,
                        error_kind = error.kind(),
                        "model answered but the payload is unusable"
                    );
                }
                tracing::warn!(
                    event_name = "analysis.fallback.applied",
                    correlation_id,
                    user_id = user_id.0,
                    failure_kind = failure.kind(),
                    cause = %failure,
                    "model output unusable, applying fallback template"
                );
                let content = synthesize_fallback(&failure.to_string());
                (content, ResultSource::Fallback, PipelineState::Fallback)
            }
        };
        transition(correlation_id, user_id, PipelineState::AiCalled, state);

        let candidate = PersonalityResult::from_content(
            user_id,
            user.display_name,
            content,
            source,
            Utc::now(),
        );

        match self.results.put_if_absent(&candidate).await {
            Ok(PutOutcome::Inserted) => {
                tracing::info!(
                    event_name = "analysis.store.inserted",
                    correlation_id,
                    user_id = user_id.0,
                    source = source.as_str(),
                    "stored personality result"
                );
                transition(correlation_id, user_id, state, PipelineState::Stored);
                transition(correlation_id, user_id, PipelineState::Stored, PipelineState::Done);
                Ok(SubmitOutcome { result: candidate, newly_stored: true })
            }
            Ok(PutOutcome::AlreadyExists) => {
                tracing::info!(
                    event_name = "analysis.store.already_exists",
                    correlation_id,
                    user_id = user_id.0,
                    discarded_source = source.as_str(),
                    "another submission stored first, returning its result"
                );
                let existing = self.results.get(user_id).await.map_err(|error| {
                    self.request_failed(correlation_id, user_id, state, error.to_string())
                })?;
                let existing = existing.ok_or_else(|| {
                    self.request_failed(
                        correlation_id,
                        user_id,
                        state,
                        "store reported an existing result that could not be read".to_string(),
                    )
                })?;
                transition(correlation_id, user_id, state, PipelineState::Done);
                Ok(SubmitOutcome { result: existing, newly_stored: false })
            }
            Err(error) => {
                Err(self.request_failed(correlation_id, user_id, state, error.to_string()))
            }
        }
    }

    /// Pure read. Never invokes the model; `None` means no submission has completed yet.
    pub async fn get_result(
        &self,
        correlation_id: &str,
        user_id: UserId,
    ) -> Result<Option<PersonalityResult>, PipelineError> {
        let result = self.results.get(user_id).await?;
        tracing::debug!(
            event_name = "analysis.result.read",
            correlation_id,
            user_id = user_id.0,
            found = result.is_some(),
            "read personality result"
        );
        Ok(result)
    }

    fn request_failed(
        &self,
        correlation_id: &str,
        user_id: UserId,
        from: PipelineState,
        message: String,
    ) -> PipelineError {
        tracing::error!(
            event_name = "analysis.store.failed",
            correlation_id,
            user_id = user_id.0,
            error = %message,
            "result could not be persisted"
        );
        transition(correlation_id, user_id, from, PipelineState::RequestFailed);
        PipelineError::Persistence(message)
    }
}

fn evaluate(output: RawModelOutput) -> Result<ReportContent, AnalysisFailure> {
    Ok(normalize(&output.into_text()?)?)
}

fn transition(correlation_id: &str, user_id: UserId, from: PipelineState, to: PipelineState) {
    tracing::info!(
        event_name = "analysis.pipeline.transition",
        correlation_id,
        user_id = user_id.0,
        from = from.as_str(),
        to = to.as_str(),
        "pipeline state changed"
    );
}

fn log_skipped_answer(correlation_id: &str, user_id: UserId, skipped: &SkippedAnswer) {
    match skipped {
        SkippedAnswer::QuestionNotInBank { question_id } => tracing::warn!(
            event_name = "prompt.question_missing",
            correlation_id,
            user_id = user_id.0,
            question_id = %question_id,
            "answered question is not in the question bank"
        ),
        SkippedAnswer::OptionNotInQuestion { question_id, option_id } => tracing::warn!(
            event_name = "prompt.option_missing",
            correlation_id,
            user_id = user_id.0,
            question_id = %question_id,
            option_id = %option_id,
            "chosen option does not belong to the question"
        ),
    }
}
