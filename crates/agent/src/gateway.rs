use std::collections::BTreeSet;

use async_trait::async_trait;
use psikotes_core::config::LlmConfig;
use psikotes_core::AnalysisFailure;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::policy::{InvocationPolicy, RetryPolicy};

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const ERROR_BODY_LIMIT: usize = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Safety,
    MaxTokens,
    TransportError,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "STOP",
            Self::Safety => "SAFETY",
            Self::MaxTokens => "MAX_TOKENS",
            Self::TransportError => "TRANSPORT_ERROR",
        }
    }
}

/// Classified result of exactly one model call. `detail` explains transport failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawModelOutput {
    pub text: Option<String>,
    pub finish_reason: FinishReason,
    pub safety_flags: BTreeSet<String>,
    pub detail: Option<String>,
}

impl RawModelOutput {
    pub fn stop(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            finish_reason: FinishReason::Stop,
            safety_flags: BTreeSet::new(),
            detail: None,
        }
    }

    pub fn safety(flags: impl IntoIterator<Item = String>) -> Self {
        Self {
            text: None,
            finish_reason: FinishReason::Safety,
            safety_flags: flags.into_iter().collect(),
            detail: None,
        }
    }

    pub fn max_tokens(text: Option<String>) -> Self {
        Self {
            text,
            finish_reason: FinishReason::MaxTokens,
            safety_flags: BTreeSet::new(),
            detail: None,
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            text: None,
            finish_reason: FinishReason::TransportError,
            safety_flags: BTreeSet::new(),
            detail: Some(detail.into()),
        }
    }

    /// Text of a completed response, or the failure that stands in for it.
    pub fn into_text(self) -> Result<String, AnalysisFailure> {
        match self.finish_reason {
            FinishReason::Stop => Ok(self.text.unwrap_or_default()),
            FinishReason::Safety => Err(AnalysisFailure::SafetyBlocked {
                categories: self.safety_flags.into_iter().collect(),
            }),
            FinishReason::MaxTokens => Err(AnalysisFailure::Truncated),
            FinishReason::TransportError => Err(AnalysisFailure::Transport {
                reason: self.detail.unwrap_or_else(|| "unknown transport failure".to_string()),
            }),
        }
    }
}

/// One network call per `invoke`, no internal retry. Failures are reported through
/// [`FinishReason`], never as an `Err`.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(&self, prompt: &str, policy: &InvocationPolicy) -> RawModelOutput;
}

/// Calls the gateway until it reports something other than a transport failure or the
/// retry budget is spent. `on_outcome` sees every attempt, numbered from zero.
pub(crate) async fn invoke_with_retry(
    gateway: &dyn ModelGateway,
    prompt: &str,
    invocation: &InvocationPolicy,
    retry: &RetryPolicy,
    mut on_outcome: impl FnMut(u32, &RawModelOutput) + Send,
) -> RawModelOutput {
    let mut attempt = 0;
    loop {
        let output = gateway.invoke(prompt, invocation).await;
        on_outcome(attempt, &output);

        if output.finish_reason != FinishReason::TransportError || attempt >= retry.max_retries {
            return output;
        }

        attempt += 1;
        tokio::time::sleep(retry.delay_before(attempt)).await;
    }
}

/// `generateContent` client for Gemini models.
pub struct GeminiGateway {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiGateway {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("psikotes/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, base_url: base_url.into(), model: model.into(), api_key })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.base_url.clone(), config.model.clone(), config.api_key.clone())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn request_body(prompt: &str, policy: &InvocationPolicy) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                temperature: policy.temperature,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: policy.max_output_tokens,
                response_mime_type: "application/json",
            },
            safety_settings: HARM_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: policy.safety_threshold.api_value(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn invoke(&self, prompt: &str, policy: &InvocationPolicy) -> RawModelOutput {
        tracing::debug!(
            event_name = "analysis.gateway.request",
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            timeout_ms = policy.timeout.as_millis() as u64,
            "sending generateContent request"
        );

        let sent = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .timeout(policy.timeout)
            .json(&Self::request_body(prompt, policy))
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(error) if error.is_timeout() => {
                return RawModelOutput::transport(format!(
                    "request timed out after {}s",
                    policy.timeout.as_secs_f32()
                ))
            }
            Err(error) => return RawModelOutput::transport(format!("request failed: {error}")),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) if error.is_timeout() => {
                return RawModelOutput::transport("timed out while reading the response body")
            }
            Err(error) => {
                return RawModelOutput::transport(format!("could not read response body: {error}"))
            }
        };

        if !status.is_success() {
            return RawModelOutput::transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                provider_error_message(&body)
            ));
        }

        match serde_json::from_str::<GenerateContentResponse>(&body) {
            Ok(parsed) => classify(parsed),
            Err(error) => {
                RawModelOutput::transport(format!("unreadable response payload: {error}"))
            }
        }
    }
}

fn classify(response: GenerateContentResponse) -> RawModelOutput {
    if let Some(error) = response.error {
        return RawModelOutput::transport(format!("provider error: {}", error.message));
    }

    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            let mut flags = triggered_categories(&feedback.safety_ratings);
            if flags.is_empty() {
                flags.insert(reason);
            }
            return RawModelOutput::safety(flags);
        }
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return RawModelOutput::transport("response contained no candidates");
    };

    let text = candidate.content.map(|content| {
        content.parts.into_iter().filter_map(|part| part.text).collect::<String>()
    });

    match candidate.finish_reason.as_deref() {
        None | Some("STOP") => RawModelOutput::stop(text.unwrap_or_default()),
        Some("SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII") => {
            RawModelOutput::safety(triggered_categories(&candidate.safety_ratings))
        }
        // Content refusals without a harm category; the same prompt would be refused again.
        Some(reason @ ("RECITATION" | "OTHER")) => {
            let mut flags = triggered_categories(&candidate.safety_ratings);
            flags.insert(reason.to_string());
            RawModelOutput::safety(flags)
        }
        Some("MAX_TOKENS") => RawModelOutput::max_tokens(text),
        Some(other) => RawModelOutput::transport(format!("unexpected finish reason `{other}`")),
    }
}

fn triggered_categories(ratings: &[SafetyRating]) -> BTreeSet<String> {
    ratings
        .iter()
        .filter(|rating| rating.blocked || rating.probability.as_deref() == Some("HIGH"))
        .map(|rating| rating.category.clone())
        .collect()
}

fn provider_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<GenerateContentResponse>(body) {
        if let Some(error) = parsed.error {
            return error.message;
        }
    }
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Deserialize)]
struct SafetyRating {
    category: String,
    probability: Option<String>,
    #[serde(default)]
    blocked: bool,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}
