//! Pure stages of the analysis pipeline: prompt construction, response normalization and
//! the fallback template, plus parsing of model-authored question banks. None of these
//! perform I/O.

pub mod fallback;
pub mod normalize;
pub mod prompt;
pub mod questions;

use thiserror::Error;

pub use fallback::synthesize_fallback;
pub use normalize::{normalize, NormalizationError};
pub use prompt::{build_prompt, AnalysisPrompt, SkippedAnswer};
pub use questions::{build_question_prompt, parse_question_bank, GENERATED_QUESTION_COUNT};

/// Why a model-backed report could not be produced. Always absorbed by the fallback
/// template; the `Display` text becomes the cause embedded in the fallback summary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalysisFailure {
    #[error("SAFETY: response blocked by the content filter{}", category_suffix(.categories))]
    SafetyBlocked { categories: Vec<String> },
    #[error("MAX_TOKENS: response was truncated at the output limit")]
    Truncated,
    #[error("TRANSPORT_ERROR: {reason}")]
    Transport { reason: String },
    #[error("{}: {}", .0.kind(), .0)]
    Normalization(#[from] NormalizationError),
}

impl AnalysisFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SafetyBlocked { .. } => "SAFETY",
            Self::Truncated => "MAX_TOKENS",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Normalization(error) => error.kind(),
        }
    }
}

fn category_suffix(categories: &[String]) -> String {
    if categories.is_empty() {
        String::new()
    } else {
        format!(" ({})", categories.join(", "))
    }
}
