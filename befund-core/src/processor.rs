//! Report processing: model-backed merge with a deterministic fallback.
//!
//! The processor never fails. A missing generator, a transport error or a reply that
//! breaks the schema all route to [`compose_fallback_report`], and the outcome
//! records why.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assembler::assemble_report;
use crate::diff::highlight_differences;
use crate::fallback::{compose_fallback_report, UNKNOWN_STUDY};
use crate::generation::{
    DidYouKnow, GeneratedReport, GenerationError, GenerationRequest, ReportGenerator, DEFAULT_ICD10,
};
use crate::html::{decode_entities, sanitize_markup, strip_allowed_markup};
use crate::models::{ComposedReport, ReportSections};

/// Result of processing one report request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub report: ComposedReport,
    pub used_fallback: bool,
    /// Why the fallback was taken, if it was
    pub fallback_reason: Option<String>,
    pub did_you_know: DidYouKnow,
    pub icd10: String,
}

impl ProcessOutcome {
    fn fallback(request: &GenerationRequest, reason: String) -> Self {
        warn!("Using fallback report composer: {}", reason);
        let report = compose_fallback_report(
            &request.template_name,
            &request.baseline,
            &request.clinical_data,
            &request.transcript,
        );
        Self {
            report,
            used_fallback: true,
            fallback_reason: Some(reason),
            did_you_know: DidYouKnow::default(),
            icd10: DEFAULT_ICD10.to_string(),
        }
    }
}

/// Model text may echo markup back; diffing needs the plain revision
fn plain_revision(text: &str) -> String {
    decode_entities(&strip_allowed_markup(text))
}

/// Assemble a report from a schema-checked model reply
pub fn compose_generated_report(request: &GenerationRequest, generated: &GeneratedReport) -> ComposedReport {
    let study = if request.template_name.trim().is_empty() {
        UNKNOWN_STUDY
    } else {
        request.template_name.as_str()
    };

    let revised = plain_revision(&generated.revised_befund_text);
    let mut sections = ReportSections::administrative(study, &request.clinical_data);
    sections.befund = highlight_differences(&request.baseline, &revised);
    sections.beurteilung = sanitize_markup(&generated.beurteilung_text);
    assemble_report(sections)
}

/// Process a report request, falling back whenever the generator is unavailable
/// or misbehaves.
pub fn process_report(
    request: &GenerationRequest,
    generator: Option<&dyn ReportGenerator>,
) -> ProcessOutcome {
    let Some(generator) = generator else {
        let reason = GenerationError::NotConfigured("no report generator".to_string());
        return ProcessOutcome::fallback(request, reason.to_string());
    };

    debug!(
        "Generating report for '{}' ({} transcript chars, {:?} mode)",
        request.template_name,
        request.transcript.len(),
        request.model_mode
    );

    match generator.generate(request) {
        Ok(generated) => {
            let report = compose_generated_report(request, &generated);
            info!("Report generated for '{}' (ICD-10 {})", request.template_name, generated.icd10);
            ProcessOutcome {
                report,
                used_fallback: false,
                fallback_reason: None,
                did_you_know: generated.did_you_know,
                icd10: generated.icd10,
            }
        }
        Err(e) => ProcessOutcome::fallback(request, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::parse_generated_report;
    use crate::models::{fields, ClinicalData};

    struct CannedGenerator(&'static str);

    impl ReportGenerator for CannedGenerator {
        fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedReport, GenerationError> {
            Ok(parse_generated_report(self.0)?)
        }
    }

    struct FailingGenerator;

    impl ReportGenerator for FailingGenerator {
        fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedReport, GenerationError> {
            Err(GenerationError::RequestFailed("timeout".to_string()))
        }
    }

    fn request() -> GenerationRequest {
        let mut clinical = ClinicalData::new();
        clinical.insert(fields::KLINISCHE_ANGABEN.to_string(), "Schmerzen".to_string());
        GenerationRequest {
            template_name: "CT Abdomen".to_string(),
            baseline: "Leber unauffällig.".to_string(),
            clinical_data: clinical,
            transcript: "Milz vergrössert.".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_generated_path_highlights_insertions() {
        let generator = CannedGenerator(
            r#"{"revisedBefundText": "Leber unauffällig. Milz vergrössert.",
                "beurteilungText": "• Splenomegalie",
                "icd10": "R16.1"}"#,
        );
        let outcome = process_report(&request(), Some(&generator));
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.icd10, "R16.1");
        assert_eq!(
            outcome.report.sections.befund,
            "Leber unauffällig<mark class=\"hl\">. Milz vergrössert</mark>."
        );
        assert_eq!(outcome.report.sections.beurteilung, "• Splenomegalie");
        assert!(outcome.report.html.contains("Schmerzen"));
    }

    #[test]
    fn test_markup_in_revision_is_not_trusted() {
        let generator = CannedGenerator(
            r#"{"revisedBefundText": "Leber unauffällig.<br/><script>x</script>",
                "beurteilungText": "ok"}"#,
        );
        let outcome = process_report(&request(), Some(&generator));
        assert!(!outcome.report.html.contains("<script>"));
        assert!(outcome.report.sections.befund.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(outcome.report.sections.befund.starts_with("Leber unauffällig."));
    }

    #[test]
    fn test_comparison_signs_in_revision_survive() {
        let generator = CannedGenerator(
            r#"{"revisedBefundText": "Lymphknoten <1 cm, Zyste >2 cm.",
                "beurteilungText": "• Zyste"}"#,
        );
        let outcome = process_report(&request(), Some(&generator));
        assert!(!outcome.used_fallback);
        assert!(outcome
            .report
            .sections
            .befund
            .contains("&lt;1 cm, Zyste &gt;2 cm"));
    }

    #[test]
    fn test_highlight_marks_echoed_by_the_model_are_not_doubled() {
        let generator = CannedGenerator(
            r#"{"revisedBefundText": "Leber unauffällig.<br/><mark class=\"hl\">Milz vergrössert.</mark>",
                "beurteilungText": "ok"}"#,
        );
        let outcome = process_report(&request(), Some(&generator));
        assert_eq!(
            outcome.report.sections.befund,
            "Leber unauffällig.<mark class=\"hl\"><br/>Milz vergrössert</mark>."
        );
    }

    #[test]
    fn test_schema_violation_falls_back() {
        let generator = CannedGenerator(r#"{"revisedBefundText": "x"}"#);
        let outcome = process_report(&request(), Some(&generator));
        assert!(outcome.used_fallback);
        assert!(outcome.fallback_reason.unwrap().contains("beurteilungText"));
        assert!(outcome
            .report
            .sections
            .befund
            .contains("<mark class=\"hl\">Milz vergrössert.</mark>"));
    }

    #[test]
    fn test_generator_error_falls_back() {
        let outcome = process_report(&request(), Some(&FailingGenerator));
        assert!(outcome.used_fallback);
        assert_eq!(outcome.icd10, DEFAULT_ICD10);
        assert!(outcome.fallback_reason.unwrap().contains("timeout"));
    }

    #[test]
    fn test_missing_generator_falls_back() {
        let outcome = process_report(&request(), None);
        assert!(outcome.used_fallback);
        assert!(outcome.fallback_reason.unwrap().contains("not configured"));
        assert_eq!(outcome.did_you_know, DidYouKnow::default());
    }
}
