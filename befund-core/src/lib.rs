//! Core of the befund report drafting tool.
//!
//! Takes raw radiology dictation, normalizes it, picks a matching template, merges the
//! dictation into the template (through a language model or the deterministic
//! fallback) and renders the result with every inserted passage highlighted.

pub mod assembler;
pub mod corrections;
pub mod diff;
pub mod dictation;
pub mod fallback;
pub mod generation;
pub mod html;
pub mod matcher;
pub mod models;
pub mod normalizer;
pub mod processor;
pub mod report;
pub mod store;


pub use corrections::{default_corrections, CorrectionSet};
pub use diff::{diff_segments, highlight_differences, DiffSegment};
pub use dictation::DictationSession;
pub use fallback::compose_fallback_report;
pub use generation::{
    build_report_prompt, parse_generated_report, GeneratedReport, GenerationError, GenerationRequest,
    ModelMode, ReportGenerator, SchemaError,
};
pub use matcher::{rank_templates, Confidence, TemplateScore};
pub use models::{ClinicalData, ComposedReport, CorrectionEntry, Macro, ReportSections, Template};
pub use normalizer::{process_transcript, TranscriptNormalizer};
pub use processor::{process_report, ProcessOutcome};
pub use report::{ReportDraft, ReportStatus};
pub use store::{JsonTemplateStore, MemoryTemplateStore, StoreError, TemplateStore};
