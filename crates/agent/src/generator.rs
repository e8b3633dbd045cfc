use std::sync::Arc;

use psikotes_core::{
    build_question_prompt, parse_question_bank, AnalysisFailure, QuestionBank,
    GENERATED_QUESTION_COUNT,
};

use crate::gateway::{invoke_with_retry, ModelGateway};
use crate::policy::{InvocationPolicy, RetryPolicy};

/// Thirty questions with four options each do not fit the analysis output budget.
pub const QUESTION_OUTPUT_TOKENS: u32 = 8192;

/// Asks the model for a fresh question bank. Unlike analysis there is no fallback: a
/// refused, truncated or unparseable answer is returned to the caller as the failure.
pub struct QuestionGenerator {
    gateway: Arc<dyn ModelGateway>,
    invocation: InvocationPolicy,
    retry: RetryPolicy,
    count: usize,
}

impl QuestionGenerator {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            invocation: InvocationPolicy {
                max_output_tokens: QUESTION_OUTPUT_TOKENS,
                ..InvocationPolicy::default()
            },
            retry: RetryPolicy::default(),
            count: GENERATED_QUESTION_COUNT,
        }
    }

    /// The output budget is raised to [`QUESTION_OUTPUT_TOKENS`] when `invocation` allows less.
    pub fn with_policies(mut self, invocation: InvocationPolicy, retry: RetryPolicy) -> Self {
        self.invocation = InvocationPolicy {
            max_output_tokens: invocation.max_output_tokens.max(QUESTION_OUTPUT_TOKENS),
            ..invocation
        };
        self.retry = retry;
        self
    }

    pub async fn generate(&self, correlation_id: &str) -> Result<QuestionBank, AnalysisFailure> {
        let prompt = build_question_prompt(self.count);
        let output = invoke_with_retry(
            self.gateway.as_ref(),
            &prompt,
            &self.invocation,
            &self.retry,
            |attempt, output| {
                tracing::info!(
                    event_name = "questions.gateway.outcome",
                    correlation_id,
                    attempt,
                    finish_reason = output.finish_reason.as_str(),
                    detail = output.detail.as_deref().unwrap_or(""),
                    "model call finished"
                );
            },
        )
        .await;

        let generated = output
            .into_text()
            .and_then(|text| parse_question_bank(&text).map_err(AnalysisFailure::from));
        match &generated {
            Ok(bank) => tracing::info!(
                event_name = "questions.generated",
                correlation_id,
                question_count = bank.len(),
                "generated question bank"
            ),
            Err(failure) => tracing::warn!(
                event_name = "questions.generation.failed",
                correlation_id,
                failure_kind = failure.kind(),
                cause = %failure,
                "model could not produce a question bank"
            ),
        }
        generated
    }
}
