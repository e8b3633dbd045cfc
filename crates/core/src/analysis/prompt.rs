use crate::domain::answer::AnswerSet;
use crate::domain::question::{OptionId, QuestionBank, QuestionId};
use crate::domain::result::{MIN_ANALYSIS_ASPECTS, MIN_RECOMMENDATIONS};

const PROMPT_HEADER: &str = "Analisis kepribadian dari jawaban kuesioner berikut. \
Output harus dalam format JSON yang spesifik.";

const OUTPUT_SCHEMA: &str = r#"Format Output JSON:
{
  "personality_type": "[string: tipe kepribadian singkat, misal: The Innovator]",
  "interest_category": "[string: kategori minat umum, misal: Technology, Arts, Social]",
  "summary": "[string: ringkasan kepribadian]",
  "recommendations": ["[string: profesi 1]", "[string: profesi 2]"],
  "analysis_json": { "[aspek 1]": 40, "[aspek 2]": 35, "[aspek 3]": 25 }
}"#;

/// Answer that could not be rendered into the prompt. Reported to the caller for logging;
/// never a processing failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkippedAnswer {
    QuestionNotInBank { question_id: QuestionId },
    OptionNotInQuestion { question_id: QuestionId, option_id: OptionId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisPrompt {
    pub text: String,
    pub rendered_answers: usize,
    pub skipped: Vec<SkippedAnswer>,
}

impl AnalysisPrompt {
    /// Stable hex digest of the prompt text, suitable as an exact-match cache key or a log
    /// field in place of the prompt itself.
    pub fn fingerprint(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }
}

/// Renders the analysis prompt. Answers are emitted in question-bank order so the same
/// inputs always produce byte-identical text.
pub fn build_prompt(
    display_name: &str,
    answers: &AnswerSet,
    bank: &QuestionBank,
) -> AnalysisPrompt {
    let mut text = String::with_capacity(2048);
    text.push_str(PROMPT_HEADER);
    text.push_str("\n\n");
    text.push_str(OUTPUT_SCHEMA);
    text.push_str("\n\n");
    text.push_str(&output_rules());
    text.push_str("\n\n");
    text.push_str(&format!("Jawaban kuesioner untuk pengguna {}:\n", display_name.trim()));

    let mut rendered_answers = 0;
    let mut skipped = Vec::new();

    for (index, question) in bank.questions().iter().enumerate() {
        let Some(option_id) = answers.get(&question.id) else {
            continue;
        };
        match question.option(option_id) {
            Some(option) => {
                rendered_answers += 1;
                text.push_str(&format!(
                    "{}. {}\n   Jawaban: {}\n",
                    index + 1,
                    question.text.trim(),
                    option.text.trim()
                ));
            }
            None => skipped.push(SkippedAnswer::OptionNotInQuestion {
                question_id: question.id.clone(),
                option_id: option_id.clone(),
            }),
        }
    }

    for (question_id, _) in answers.iter() {
        if bank.get(question_id).is_none() {
            skipped.push(SkippedAnswer::QuestionNotInBank { question_id: question_id.clone() });
        }
    }

    AnalysisPrompt { text, rendered_answers, skipped }
}

fn output_rules() -> String {
    format!(
        "Aturan output:\n\
         - Semua field di atas wajib ada.\n\
         - \"recommendations\" adalah array string dengan minimal {MIN_RECOMMENDATIONS} \
         rekomendasi profesi.\n\
         - \"analysis_json\" adalah objek dengan minimal {MIN_ANALYSIS_ASPECTS} aspek; \
         setiap nilai adalah angka non-negatif \
         yang menunjukkan bobot relatif (totalnya tidak harus 100).\n\
         - Keluarkan HANYA objek JSON tersebut, tanpa teks lain dan tanpa markdown."
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{build_prompt, SkippedAnswer};
    use crate::domain::answer::AnswerSet;
    use crate::domain::question::{OptionId, Question, QuestionBank, QuestionId, QuestionOption};
    use crate::domain::user::UserId;

    fn bank() -> QuestionBank {
        let question = |id: &str, text: &str, options: &[(&str, &str)]| Question {
            id: QuestionId(id.to_string()),
            text: text.to_string(),
            options: options
                .iter()
                .map(|(option_id, option_text)| QuestionOption {
                    id: OptionId(option_id.to_string()),
                    text: option_text.to_string(),
                })
                .collect(),
        };

        QuestionBank::new(vec![
            question(
                "1",
                "Ketika menghadapi tugas baru, apa yang kamu lakukan?",
                &[("1", "Mencoba memahaminya sendiri dulu"), ("2", "Bertanya pada guru")],
            ),
            question(
                "2",
                "Dalam bekerja kelompok, kamu lebih suka...",
                &[("6", "Memimpin dan mengatur tugas"), ("7", "Menjalankan tugas")],
            ),
        ])
    }

    fn answers(pairs: &[(&str, &str)]) -> AnswerSet {
        AnswerSet::new(
            UserId(1),
            pairs
                .iter()
                .map(|(q, o)| (QuestionId(q.to_string()), OptionId(o.to_string())))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn prompt_embeds_question_and_chosen_option_text() {
        let prompt = build_prompt("Rina", &answers(&[("2", "6"), ("1", "2")]), &bank());

        assert!(prompt.text.contains("pengguna Rina"));
        assert!(prompt.text.contains(
            "1. Ketika menghadapi tugas baru, \
             apa yang kamu lakukan?\n   Jawaban: Bertanya pada guru"
        ));
        assert!(prompt.text.contains(
            "2. Dalam bekerja kelompok, kamu lebih suka...\n   Jawaban: Memimpin dan mengatur tugas"
        ));
        assert!(!prompt.text.contains("Mencoba memahaminya"));
        assert_eq!(prompt.rendered_answers, 2);
        assert!(prompt.skipped.is_empty());
    }

    #[test]
    fn prompt_carries_schema_and_json_only_directive() {
        let prompt = build_prompt("Rina", &answers(&[("1", "1")]), &bank());

        for field in
            ["personality_type", "interest_category", "summary", "recommendations", "analysis_json"]
        {
            assert!(prompt.text.contains(field), "schema should name `{field}`");
        }
        assert!(prompt.text.contains("minimal 3 aspek"));
        assert!(prompt.text.contains("minimal 1 rekomendasi"));
        assert!(prompt.text.contains("Keluarkan HANYA objek JSON"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let first = build_prompt("Rina", &answers(&[("1", "1"), ("2", "7")]), &bank());
        let second = build_prompt("Rina", &answers(&[("2", "7"), ("1", "1")]), &bank());

        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }

    #[test]
    fn unknown_questions_and_options_are_skipped_not_fatal() {
        let answers = answers(&[("1", "99"), ("2", "7"), ("77", "1")]);
        let prompt = build_prompt("Rina", &answers, &bank());

        assert_eq!(prompt.rendered_answers, 1);
        assert_eq!(
            prompt.skipped,
            vec![
                SkippedAnswer::OptionNotInQuestion {
                    question_id: QuestionId("1".to_string()),
                    option_id: OptionId("99".to_string()),
                },
                SkippedAnswer::QuestionNotInBank { question_id: QuestionId("77".to_string()) },
            ]
        );
        assert!(prompt.text.contains("Menjalankan tugas"));
    }
}
