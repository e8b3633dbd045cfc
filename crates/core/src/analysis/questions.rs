//! Model-authored question banks: the generation prompt and the parser that turns the
//! model's array into a [`QuestionBank`] with sequential ids.

use serde_json::{Map, Value};

use crate::analysis::normalize::{
    json_type_name, parse_with_recovery, strip_code_fence, NormalizationError,
};
use crate::domain::question::{
    option_label, OptionId, Question, QuestionBank, QuestionId, QuestionOption,
};

pub const GENERATED_QUESTION_COUNT: usize = 30;
pub const GENERATED_OPTION_COUNT: usize = 4;
pub const MIN_GENERATED_OPTIONS: usize = 2;

const OUTPUT_EXAMPLE: &str = r#"[
  {
    "question_id": 1,
    "question_text": "Saat menghadapi tugas baru yang menantang, reaksi pertamamu adalah...",
    "options": [
      {"option_id": 1, "option_text": "A. Merasa cemas dan ragu untuk memulai"},
      {"option_id": 2, "option_text": "B. Antusias dan segera mencari cara menyelesaikannya"},
      {"option_id": 3, "option_text": "C. Mencari bantuan orang lain sebelum mencoba sendiri"},
      {"option_id": 4, "option_text": "D. Menunda hingga menit terakhir"}
    ]
  }
]"#;

pub fn build_question_prompt(count: usize) -> String {
    let labels: Vec<String> = (0..GENERATED_OPTION_COUNT).map(option_label).collect();
    format!(
        "Buatkan {count} pertanyaan pilihan ganda untuk menggali potensi diri, minat, dan \
         karakter psikologis seseorang.\n\
         Setiap pertanyaan harus memiliki {GENERATED_OPTION_COUNT} pilihan jawaban ({}) yang \
         relevan dan mencerminkan spektrum respons.\n\n\
         Format Output JSON:\n{OUTPUT_EXAMPLE}\n\n\
         Aturan output:\n\
         - Setiap pertanyaan memiliki \"question_id\" berurutan, \"question_text\", dan array \
         \"options\" berisi objek dengan \"option_id\" dan \"option_text\".\n\
         - Keluarkan HANYA array JSON tersebut, tanpa teks lain dan tanpa markdown.",
        labels.join(", ")
    )
}

/// Parses a generated question array. Questions and options are renumbered by position,
/// so ids chosen by the model are ignored; a leading `A.`-style label is removed from
/// option text because the label is derived from position when the bank is served.
pub fn parse_question_bank(raw: &str) -> Result<QuestionBank, NormalizationError> {
    let stripped = strip_code_fence(raw);
    if stripped.is_empty() {
        return Err(NormalizationError::EmptyResponse);
    }

    let entries = match parse_with_recovery(stripped, '[', ']')? {
        Value::Array(entries) => entries,
        Value::Object(mut wrapper) => match wrapper.remove("questions") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(NormalizationError::MalformedJson(
                    "expected an array, found an object".to_string(),
                ))
            }
        },
        other => {
            return Err(NormalizationError::MalformedJson(format!(
                "expected an array, found {}",
                json_type_name(&other)
            )))
        }
    };

    if entries.is_empty() {
        return Err(NormalizationError::BadQuestions(
            "must contain at least one question".to_string(),
        ));
    }

    let mut questions = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let number = index + 1;
        let Value::Object(entry) = entry else {
            return Err(NormalizationError::BadQuestions(format!(
                "entry {number} must be an object, found {}",
                json_type_name(entry)
            )));
        };
        questions.push(parse_question(number, entry)?);
    }

    Ok(QuestionBank::new(questions))
}

fn parse_question(
    number: usize,
    entry: &Map<String, Value>,
) -> Result<Question, NormalizationError> {
    let text = match entry.get("question_text") {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        _ => {
            return Err(NormalizationError::BadQuestions(format!(
                "question {number} has no question_text"
            )))
        }
    };

    let raw_options: &[Value] = match entry.get("options") {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    };
    let mut options = Vec::with_capacity(raw_options.len());
    for (position, item) in raw_options.iter().enumerate() {
        let raw_text = match item {
            Value::String(text) => text.as_str(),
            Value::Object(option) => match option.get("option_text") {
                Some(Value::String(text)) => text.as_str(),
                _ => continue,
            },
            _ => continue,
        };
        let text = strip_label(raw_text, &option_label(position));
        if text.is_empty() {
            continue;
        }
        options.push(QuestionOption { id: OptionId((options.len() + 1).to_string()), text });
    }

    if options.len() < MIN_GENERATED_OPTIONS {
        return Err(NormalizationError::BadQuestions(format!(
            "question {number} needs at least {MIN_GENERATED_OPTIONS} options, found {}",
            options.len()
        )));
    }

    Ok(Question { id: QuestionId(number.to_string()), text, options })
}

fn strip_label(text: &str, label: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix(label)
        .and_then(|rest| rest.strip_prefix(&['.', ')'][..]))
        .map(str::trim_start)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{build_question_prompt, parse_question_bank, GENERATED_QUESTION_COUNT};
    use crate::analysis::normalize::NormalizationError;
    use crate::domain::question::{OptionId, QuestionId};

    const GENERATED: &str = r#"[
        {
            "question_id": 7,
            "question_text": "Saat libur panjang, kamu lebih suka...",
            "options": [
                {"option_id": 11, "option_text": "A. Membaca buku"},
                {"option_id": 12, "option_text": "B) Mendaki gunung"},
                {"option_id": 13, "option_text": "Antusias mencoba resep baru"},
                {"option_id": 14, "option_text": "D. Bermain gim bersama teman"}
            ]
        },
        {
            "question_text": "Kamu merasa paling produktif ketika...",
            "options": ["A. Bekerja sendiri", "B. Bekerja dalam tim", 42, {"label": "C"}]
        }
    ]"#;

    #[test]
    fn prompt_asks_for_the_requested_count_and_json_only() {
        let prompt = build_question_prompt(GENERATED_QUESTION_COUNT);

        assert!(prompt.starts_with("Buatkan 30 pertanyaan pilihan ganda"));
        assert!(prompt.contains("4 pilihan jawaban (A, B, C, D)"));
        assert!(prompt.contains("\"question_text\""));
        assert!(prompt.contains("Keluarkan HANYA array JSON"));
    }

    #[test]
    fn generated_questions_are_renumbered_and_unlabelled() {
        let bank = parse_question_bank(GENERATED).expect("valid bank");

        assert_eq!(bank.len(), 2);
        let first = &bank.questions()[0];
        assert_eq!(first.id, QuestionId("1".to_string()));
        let texts: Vec<&str> = first.options.iter().map(|option| option.text.as_str()).collect();
        assert_eq!(
            texts,
            [
                "Membaca buku",
                "Mendaki gunung",
                "Antusias mencoba resep baru",
                "Bermain gim bersama teman"
            ]
        );
        assert_eq!(first.options[3].id, OptionId("4".to_string()));

        let second = &bank.questions()[1];
        assert_eq!(second.id, QuestionId("2".to_string()));
        assert_eq!(second.options.len(), 2, "unusable option entries are skipped");
        assert_eq!(second.options[1].text, "Bekerja dalam tim");
    }

    #[test]
    fn fenced_or_chatty_arrays_are_recovered() {
        let expected = parse_question_bank(GENERATED);

        assert_eq!(parse_question_bank(&format!("```json\n{GENERATED}\n```")), expected);
        assert_eq!(
            parse_question_bank(&format!("Berikut soalnya:\n{GENERATED}\nSelamat mengerjakan!")),
            expected
        );
        assert_eq!(parse_question_bank(&format!("{{\"questions\": {GENERATED}}}")), expected);
    }

    #[test]
    fn unusable_payloads_are_rejected_with_a_kind() {
        assert_eq!(parse_question_bank(" ```json\n``` "), Err(NormalizationError::EmptyResponse));
        assert_eq!(
            parse_question_bank("tidak ada soal").map_err(|error| error.kind()),
            Err("MALFORMED_JSON")
        );
        assert_eq!(
            parse_question_bank(r#"{"question_text": "x"}"#).map_err(|error| error.kind()),
            Err("MALFORMED_JSON")
        );

        for payload in [
            "[]",
            r#"["Apa hobimu?"]"#,
            r#"[{"question_text": "  ", "options": ["A. Ya", "B. Tidak"]}]"#,
            r#"[{"question_text": "Apa hobimu?", "options": ["A. Membaca"]}]"#,
            r#"[{"question_text": "Apa hobimu?"}]"#,
        ] {
            assert_eq!(
                parse_question_bank(payload).map_err(|error| error.kind()),
                Err("BAD_QUESTIONS"),
                "payload {payload}"
            );
        }
    }
}
