//! Turns untrusted model text into a [`ReportContent`] or a single tagged failure.
//!
//! No partial output: the first failing step discards everything parsed so far.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::result::{ReportContent, MIN_ANALYSIS_ASPECTS, MIN_RECOMMENDATIONS};

const REQUIRED_FIELDS: [&str; 5] =
    ["personality_type", "interest_category", "summary", "recommendations", "analysis_json"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("response is not a JSON object: {0}")]
    MalformedJson(String),
    #[error("required field `{field}` is missing")]
    MissingField { field: String },
    #[error("field `{field}` must be a non-blank string")]
    InvalidField { field: String },
    #[error("recommendations {0}")]
    BadRecommendations(String),
    #[error("analysis_json {0}")]
    BadAnalysis(String),
    #[error("question bank {0}")]
    BadQuestions(String),
}

impl NormalizationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::MalformedJson(_) => "MALFORMED_JSON",
            Self::MissingField { .. } => "MISSING_FIELD",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::BadRecommendations(_) => "BAD_RECOMMENDATIONS",
            Self::BadAnalysis(_) => "BAD_ANALYSIS",
            Self::BadQuestions(_) => "BAD_QUESTIONS",
        }
    }
}

pub fn normalize(raw: &str) -> Result<ReportContent, NormalizationError> {
    let stripped = strip_code_fence(raw);
    if stripped.is_empty() {
        return Err(NormalizationError::EmptyResponse);
    }

    let object = parse_object(stripped)?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(NormalizationError::MissingField { field: field.to_string() });
        }
    }

    Ok(ReportContent {
        personality_type: required_text(&object, "personality_type")?,
        interest_category: required_text(&object, "interest_category")?,
        summary: required_text(&object, "summary")?,
        recommendations: coerce_recommendations(&object["recommendations"])?,
        analysis_json: coerce_analysis(&object["analysis_json"])?,
    })
}

pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening fence line.
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses `text` as JSON, falling back to the outermost `open`..`close` span when the
/// model wrapped the payload in prose.
pub(crate) fn parse_with_recovery(
    text: &str,
    open: char,
    close: char,
) -> Result<Value, NormalizationError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(error) => match embedded_span(text, open, close) {
            Some(span) => serde_json::from_str::<Value>(span)
                .map_err(|_| NormalizationError::MalformedJson(error.to_string())),
            None => Err(NormalizationError::MalformedJson(error.to_string())),
        },
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, NormalizationError> {
    match parse_with_recovery(text, '{', '}')? {
        Value::Object(object) => Ok(object),
        other => Err(NormalizationError::MalformedJson(format!(
            "expected an object, found {}",
            json_type_name(&other)
        ))),
    }
}

fn embedded_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn required_text(object: &Map<String, Value>, field: &str) -> Result<String, NormalizationError> {
    match object.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(NormalizationError::InvalidField { field: field.to_string() }),
    }
}

fn coerce_recommendations(value: &Value) -> Result<Vec<String>, NormalizationError> {
    let recommendations: Vec<String> = match value {
        Value::Array(items) => {
            let mut collected = Vec::with_capacity(items.len());
            for item in items {
                let Value::String(text) = item else {
                    return Err(NormalizationError::BadRecommendations(format!(
                        "must contain only strings, found {}",
                        json_type_name(item)
                    )));
                };
                let text = text.trim();
                if !text.is_empty() {
                    collected.push(text.to_string());
                }
            }
            collected
        }
        Value::String(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        other => {
            return Err(NormalizationError::BadRecommendations(format!(
                "must be a list or a comma-separated string, found {}",
                json_type_name(other)
            )))
        }
    };

    if recommendations.len() < MIN_RECOMMENDATIONS {
        return Err(NormalizationError::BadRecommendations(format!(
            "must contain at least {MIN_RECOMMENDATIONS} entry"
        )));
    }
    Ok(recommendations)
}

fn coerce_analysis(value: &Value) -> Result<BTreeMap<String, f64>, NormalizationError> {
    let Value::Object(entries) = value else {
        return Err(NormalizationError::BadAnalysis(format!(
            "must be an object, found {}",
            json_type_name(value)
        )));
    };

    let mut analysis = BTreeMap::new();
    for (aspect, weight) in entries {
        let aspect = aspect.trim();
        if aspect.is_empty() {
            return Err(NormalizationError::BadAnalysis("has a blank aspect name".to_string()));
        }
        let weight = weight
            .as_f64()
            .filter(|weight| weight.is_finite() && *weight >= 0.0)
            .ok_or_else(|| {
                NormalizationError::BadAnalysis(format!(
                    "aspect `{aspect}` must have a non-negative number, found {weight}"
                ))
            })?;
        analysis.insert(aspect.to_string(), weight);
    }

    if analysis.len() < MIN_ANALYSIS_ASPECTS {
        return Err(NormalizationError::BadAnalysis(format!(
            "must contain at least {MIN_ANALYSIS_ASPECTS} aspects, found {}",
            analysis.len()
        )));
    }
    Ok(analysis)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
