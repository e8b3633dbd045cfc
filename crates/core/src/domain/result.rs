use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

pub const MIN_RECOMMENDATIONS: usize = 1;
pub const MIN_ANALYSIS_ASPECTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    AiGenerated,
    Fallback,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiGenerated => "ai_generated",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ai_generated" => Some(Self::AiGenerated),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// The interpretive part of a report, produced whole either by normalization or by the
/// fallback template. Aspect weights are relative and need not sum to 100.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportContent {
    pub personality_type: String,
    pub interest_category: String,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub analysis_json: BTreeMap<String, f64>,
}

impl ReportContent {
    pub fn is_schema_valid(&self) -> bool {
        self.recommendations.len() >= MIN_RECOMMENDATIONS
            && self.analysis_json.len() >= MIN_ANALYSIS_ASPECTS
            && self.analysis_json.values().all(|weight| weight.is_finite() && *weight >= 0.0)
    }
}

/// The persisted personality report. Exactly one exists per user and it is never updated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonalityResult {
    pub user_id: UserId,
    pub username: String,
    pub personality_type: String,
    pub interest_category: String,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub analysis_json: BTreeMap<String, f64>,
    pub source: ResultSource,
    pub created_at: DateTime<Utc>,
}

impl PersonalityResult {
    pub fn from_content(
        user_id: UserId,
        username: impl Into<String>,
        content: ReportContent,
        source: ResultSource,
        created_at: DateTime<Utc>,
    ) -> Self {
        let ReportContent {
            personality_type,
            interest_category,
            summary,
            recommendations,
            analysis_json,
        } = content;

        Self {
            user_id,
            username: username.into(),
            personality_type,
            interest_category,
            summary,
            recommendations,
            analysis_json,
            source,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::{PersonalityResult, ReportContent, ResultSource};
    use crate::domain::user::UserId;

    fn content(aspects: &[(&str, f64)], recommendations: &[&str]) -> ReportContent {
        ReportContent {
            personality_type: "Analitis".to_string(),
            interest_category: "Investigatif".to_string(),
            summary: "Kamu senang memecahkan masalah.".to_string(),
            recommendations: recommendations.iter().map(ToString::to_string).collect(),
            analysis_json: aspects
                .iter()
                .map(|(name, weight)| (name.to_string(), *weight))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn schema_validity_requires_recommendation_and_three_aspects() {
        let valid = content(
            &[("Logika", 45.0), ("Kreativitas", 25.0), ("Ketelitian", 20.0)],
            &["Peneliti"],
        );
        assert!(valid.is_schema_valid());

        let too_few = content(&[("Logika", 45.0), ("Kreativitas", 25.0)], &["Peneliti"]);
        assert!(!too_few.is_schema_valid());

        let no_recommendation = content(&[("A", 1.0), ("B", 2.0), ("C", 3.0)], &[]);
        assert!(!no_recommendation.is_schema_valid());

        let negative = content(&[("A", 1.0), ("B", -2.0), ("C", 3.0)], &["x"]);
        assert!(!negative.is_schema_valid());
    }

    #[test]
    fn from_content_keeps_every_field() {
        let report = content(&[("A", 1.0), ("B", 2.0), ("C", 3.0)], &["Programmer"]);
        let result = PersonalityResult::from_content(
            UserId(9),
            "dina",
            report.clone(),
            ResultSource::AiGenerated,
            Utc::now(),
        );

        assert_eq!(result.user_id, UserId(9));
        assert_eq!(result.username, "dina");
        assert_eq!(result.personality_type, report.personality_type);
        assert_eq!(result.interest_category, report.interest_category);
        assert_eq!(result.summary, report.summary);
        assert_eq!(result.recommendations, report.recommendations);
        assert_eq!(result.analysis_json, report.analysis_json);
        assert_eq!(result.source.as_str(), "ai_generated");
        assert_eq!(ResultSource::parse("fallback"), Some(ResultSource::Fallback));
        assert_eq!(ResultSource::parse("cache"), None);
    }
}
