//! A report being drafted: transcript, template choice and the last rendered result.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::generation::{DidYouKnow, GenerationRequest, ModelMode};
use crate::html::html_to_plain_text;
use crate::matcher::TemplateScore;
use crate::models::{ClinicalData, Template};
use crate::processor::ProcessOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Draft,
    Final,
}

/// One report in the worklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDraft {
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub updated_at: i64,
    pub status: ReportStatus,
    pub template_id: Option<String>,
    /// When set, `template_id` was picked by hand and suggestions are ignored
    pub manual_template_override: bool,
    pub transcript_text: String,
    pub final_report_html: String,
    /// Transcript or template changed since the report was last rendered
    pub is_stale: bool,
    #[serde(default)]
    pub clinical_data: ClinicalData,
    pub label: String,
    #[serde(default)]
    pub did_you_know: Option<DidYouKnow>,
    #[serde(default)]
    pub icd10: Option<String>,
}

impl Default for ReportDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportDraft {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: format!("report-{}", Uuid::new_v4()),
            created_at: now.timestamp_millis(),
            updated_at: now.timestamp_millis(),
            status: ReportStatus::Draft,
            template_id: None,
            manual_template_override: false,
            transcript_text: String::new(),
            final_report_html: String::new(),
            is_stale: false,
            clinical_data: ClinicalData::new(),
            label: now.format("Bericht %d.%m.%Y %H:%M").to_string(),
            did_you_know: None,
            icd10: None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }

    pub fn set_transcript(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.transcript_text {
            self.transcript_text = text;
            self.is_stale = true;
            self.touch();
        }
    }

    pub fn set_clinical_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.clinical_data.insert(key.into(), value.into());
        self.is_stale = true;
        self.touch();
    }

    /// Pin a template chosen by hand
    pub fn choose_template(&mut self, template_id: impl Into<String>) {
        self.template_id = Some(template_id.into());
        self.manual_template_override = true;
        self.is_stale = true;
        self.touch();
    }

    /// Go back to following the matcher's suggestions
    pub fn enable_auto_template(&mut self) {
        self.manual_template_override = false;
        self.touch();
    }

    /// Template to render with: a manual pick wins, then the top suggestion, then
    /// whatever was stored last.
    pub fn effective_template_id<'a>(&'a self, ranking: &[TemplateScore<'a>]) -> Option<&'a str> {
        if self.manual_template_override {
            if let Some(id) = self.template_id.as_deref() {
                return Some(id);
            }
        }
        ranking
            .first()
            .map(|s| s.template.id.as_str())
            .or(self.template_id.as_deref())
    }

    /// Build the processing request for the given template
    pub fn generation_request(&self, template: &Template, model_mode: ModelMode) -> GenerationRequest {
        GenerationRequest {
            template_name: template.name.clone(),
            baseline: template.normal_befund_text.clone(),
            clinical_data: self.clinical_data.clone(),
            transcript: self.transcript_text.clone(),
            model_mode,
        }
    }

    /// Store a processing result for the template it was rendered with
    pub fn apply_outcome(&mut self, template_id: &str, outcome: ProcessOutcome) {
        debug!(
            "Applying outcome to {} (fallback: {})",
            self.id, outcome.used_fallback
        );
        self.template_id = Some(template_id.to_string());
        self.final_report_html = outcome.report.html;
        self.did_you_know = Some(outcome.did_you_know);
        self.icd10 = Some(outcome.icd10).filter(|c| !c.trim().is_empty());
        self.is_stale = false;
        self.touch();
    }

    pub fn finalize(&mut self) {
        self.status = ReportStatus::Final;
        self.touch();
    }

    /// Plain text for the clipboard, with the ICD-10 code appended when known
    pub fn copy_text(&self) -> String {
        let text = html_to_plain_text(&self.final_report_html);
        match self.icd10.as_deref() {
            Some(code) => format!("{}\n\nICD-10-Codierung: {}", text, code),
            None => text,
        }
    }
}
