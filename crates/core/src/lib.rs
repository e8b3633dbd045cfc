pub mod analysis;
pub mod config;
pub mod domain;
pub mod errors;
pub mod store;

pub use analysis::{
    build_prompt, build_question_prompt, normalize, parse_question_bank, synthesize_fallback,
    AnalysisFailure, AnalysisPrompt, NormalizationError, SkippedAnswer, GENERATED_QUESTION_COUNT,
};
pub use domain::answer::AnswerSet;
pub use domain::question::{OptionId, Question, QuestionBank, QuestionId, QuestionOption};
pub use domain::result::{PersonalityResult, ReportContent, ResultSource};
pub use domain::user::{User, UserId};
pub use errors::{InterfaceError, PipelineError, ValidationError};
pub use store::{AnswerStore, PutOutcome, QuestionCatalog, ResultStore, StoreError, UserDirectory};
