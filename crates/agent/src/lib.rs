//! Analysis runtime - model invocation and the write-once result pipeline
//!
//! This crate turns a user's questionnaire answers into exactly one stored personality
//! report:
//! - Invokes the generative model through a narrow gateway that classifies every call
//! - Absorbs every model-side failure into a deterministic fallback report
//! - Persists through an atomic put-if-absent so retries and duplicate submissions converge
//!
//! # Architecture
//!
//! The pipeline is a fixed state machine:
//! 1. **Prompt** (`psikotes_core::analysis::prompt`) - answers + question bank -> prompt text
//! 2. **Gateway** (`gateway`) - prompt -> `RawModelOutput` tagged with a `FinishReason`
//! 3. **Normalize or fall back** (`psikotes_core::analysis`) - raw text -> `ReportContent`
//! 4. **Store** (`runtime`) - `put_if_absent`, re-reading the winner on conflict
//!
//! # Key Types
//!
//! - `AnalysisRuntime` - the orchestrator (see `runtime` module)
//! - `ModelGateway` - pluggable trait; `GeminiGateway` is the HTTP implementation
//! - `InvocationPolicy` / `RetryPolicy` - per-call limits and the bounded transport retry
//! - `QuestionnaireService` - registration, question listing and incremental answers
//! - `QuestionGenerator` - asks the model for a fresh 30-question bank, no fallback
//!
//! # Safety Principle
//!
//! The model is an unreliable text function. Its output never reaches storage without
//! passing normalization, and a report is never a mix of model and fallback fields.

pub mod gateway;
pub mod generator;
pub mod policy;
pub mod questionnaire;
pub mod runtime;

pub use gateway::{FinishReason, GeminiGateway, ModelGateway, RawModelOutput};
pub use generator::QuestionGenerator;
pub use policy::{InvocationPolicy, RetryPolicy};
pub use questionnaire::QuestionnaireService;
pub use runtime::{AnalysisRuntime, PipelineState, SubmitOutcome};
