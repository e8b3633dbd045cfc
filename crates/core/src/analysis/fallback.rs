use std::collections::BTreeMap;

use crate::domain::result::ReportContent;

pub const FALLBACK_PERSONALITY_TYPE: &str = "Pembelajar Adaptif";
pub const FALLBACK_INTEREST_CATEGORY: &str = "Generalis";
pub const FALLBACK_RECOMMENDATIONS: [&str; 3] =
    ["Pekerjaan Umum", "Pekerjaan Fleksibel", "Pengembangan Diri Berkelanjutan"];
pub const FALLBACK_ANALYSIS: [(&str, f64); 3] =
    [("Adaptabilitas", 40.0), ("Minat_Luas", 30.0), ("Potensi_Belajar", 30.0)];

const FALLBACK_APOLOGY: &str = "Maaf, kami tidak dapat menganalisis kepribadian Anda secara \
mendalam saat ini karena kendala teknis pada layanan AI. Namun, berdasarkan jawaban Anda, Anda \
tampak memiliki minat yang luas dan kemampuan adaptasi yang baik.";

/// Fixed, schema-valid report used whenever the model path fails. Only `summary` depends on
/// the input, and only by appending `cause` verbatim.
pub fn synthesize_fallback(cause: &str) -> ReportContent {
    ReportContent {
        personality_type: FALLBACK_PERSONALITY_TYPE.to_string(),
        interest_category: FALLBACK_INTEREST_CATEGORY.to_string(),
        summary: format!("{FALLBACK_APOLOGY} (Detail error: {cause})"),
        recommendations: FALLBACK_RECOMMENDATIONS.iter().map(ToString::to_string).collect(),
        analysis_json: FALLBACK_ANALYSIS
            .iter()
            .map(|(aspect, weight)| (aspect.to_string(), *weight))
            .collect::<BTreeMap<_, _>>(),
    }
}

#[cfg(test)]
mod tests {
    use super::synthesize_fallback;

    #[test]
    fn template_is_schema_valid() {
        let content = synthesize_fallback("TRANSPORT_ERROR: connection refused");
        assert!(content.is_schema_valid());
        assert_eq!(content.personality_type, "Pembelajar Adaptif");
        assert_eq!(content.analysis_json.get("Adaptabilitas"), Some(&40.0));
    }

    #[test]
    fn only_summary_varies_with_cause() {
        let first = synthesize_fallback("TRANSPORT_ERROR: timed out");
        let second = synthesize_fallback("SAFETY: response blocked by the content filter");

        assert_eq!(first.personality_type, second.personality_type);
        assert_eq!(first.interest_category, second.interest_category);
        assert_eq!(first.recommendations, second.recommendations);
        assert_eq!(first.analysis_json, second.analysis_json);
        assert_ne!(first.summary, second.summary);
        assert!(first.summary.starts_with("Maaf, kami tidak dapat menganalisis"));
        assert!(first.summary.ends_with("(Detail error: TRANSPORT_ERROR: timed out)"));
    }

    #[test]
    fn same_cause_is_byte_identical() {
        assert_eq!(synthesize_fallback("MAX_TOKENS"), synthesize_fallback("MAX_TOKENS"));
    }
}
