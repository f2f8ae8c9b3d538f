//! Boundary to the language-model collaborator that merges dictation into a template.
//!
//! The core ships no network client. It builds the prompt, defines the
//! [`ReportGenerator`] seam an orchestration layer implements, and checks the raw
//! model reply against the expected schema before anything from it reaches the
//! diff and assembly steps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{clinical_value, fields, ClinicalData};

/// ICD-10 code used when the model gives none
pub const DEFAULT_ICD10: &str = "Z03.9";

const DEFAULT_FACT: &str =
    "Radiologische Bildgebung ist ein wesentlicher Bestandteil der modernen Diagnostik.";
const DEFAULT_SEARCH_TERM: &str = "radiology diagnostic imaging";

/// Errors from the generation collaborator
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation service not configured: {0}")]
    NotConfigured(String),

    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Generation service returned an empty response")]
    EmptyResponse,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A model reply that does not match the expected report schema
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("No JSON object found in response")]
    NoJsonObject,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),
}

/// Which model class the collaborator should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    #[default]
    Standard,
    Expert,
}

/// Everything the collaborator needs to merge dictation into a template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub template_name: String,
    /// Template body the revision is diffed against
    pub baseline: String,
    #[serde(default)]
    pub clinical_data: ClinicalData,
    pub transcript: String,
    #[serde(default)]
    pub model_mode: ModelMode,
}

/// Short specialist fact plus a literature search term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidYouKnow {
    pub fact: String,
    pub pubmed_search_term: String,
}

impl Default for DidYouKnow {
    fn default() -> Self {
        Self {
            fact: DEFAULT_FACT.to_string(),
            pubmed_search_term: DEFAULT_SEARCH_TERM.to_string(),
        }
    }
}

/// Schema-checked model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedReport {
    pub revised_befund_text: String,
    pub beurteilung_text: String,
    pub did_you_know: DidYouKnow,
    pub icd10: String,
}

/// The language-model collaborator.
///
/// Implementations own transport, retries and timeouts. Any error makes the
/// processor fall back to the deterministic composer.
pub trait ReportGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedReport, GenerationError>;
}

/// Loosely typed reply as the model actually sends it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    revised_befund_text: Option<serde_json::Value>,
    beurteilung_text: Option<serde_json::Value>,
    did_you_know: Option<RawDidYouKnow>,
    icd10: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDidYouKnow {
    fact: Option<String>,
    pubmed_search_term: Option<String>,
}

fn non_empty_string(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Remove `<think>` blocks and markdown code fences around a model reply
pub fn strip_think_tags(text: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find("<think>") {
        if let Some(end) = result[start..].find("</think>") {
            let end_pos = start + end + "</think>".len();
            result = format!("{}{}", &result[..start], &result[end_pos..]);
        } else {
            // Unclosed block: keep whichever side holds the JSON
            let after = result[start + "<think>".len()..].to_string();
            let before = result[..start].to_string();
            result = if after.contains('{') { after } else { before };
            break;
        }
    }
    strip_markdown_code_fences(&result).trim().to_string()
}

fn strip_markdown_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let after_open = match trimmed.find('\n') {
        Some(newline_pos) => &trimmed[newline_pos + 1..],
        None => trimmed.trim_start_matches('`').trim_start_matches("json").trim_start(),
    };
    after_open.trim_end().trim_end_matches("```").trim().to_string()
}

/// First balanced `{...}` in `text`, ignoring braces inside JSON strings
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse and validate a raw model reply.
///
/// `revisedBefundText` and `beurteilungText` must be non-empty strings; the fact and
/// the ICD-10 code fall back to defaults.
pub fn parse_generated_report(response: &str) -> Result<GeneratedReport, SchemaError> {
    let cleaned = strip_think_tags(response);
    let json = extract_first_json_object(&cleaned).ok_or(SchemaError::NoJsonObject)?;
    let raw: RawReply =
        serde_json::from_str(json).map_err(|e| SchemaError::InvalidJson(e.to_string()))?;

    let revised_befund_text = non_empty_string(raw.revised_befund_text)
        .ok_or(SchemaError::MissingField("revisedBefundText"))?;
    let beurteilung_text = non_empty_string(raw.beurteilung_text)
        .ok_or(SchemaError::MissingField("beurteilungText"))?;

    let did_you_know = match raw.did_you_know {
        Some(RawDidYouKnow {
            fact: Some(fact),
            pubmed_search_term: Some(term),
        }) if !fact.trim().is_empty() && !term.trim().is_empty() => DidYouKnow {
            fact,
            pubmed_search_term: term,
        },
        _ => DidYouKnow::default(),
    };

    let icd10 = non_empty_string(raw.icd10)
        .map(|c| c.trim().to_string())
        .unwrap_or_else(|| DEFAULT_ICD10.to_string());

    Ok(GeneratedReport {
        revised_befund_text,
        beurteilung_text,
        did_you_know,
        icd10,
    })
}

const SYSTEM_PROMPT: &str = r#"Du bist ein Radiologie-Assistent. Erstelle einen vollständigen Befundbericht mit BEFUND und BEURTEILUNG.

ZUSAMMENFÜHRUNG:
1. Template-first: Der Baseline-BEFUND ist die Ausgangsbasis.
2. Wenn das Transkript eine Pathologie beschreibt, schreibe den betroffenen Satz der Baseline um statt anzuhängen.
3. Keine separaten Abschnitte wie "Aus dem Transkript".
4. Die Absatzstruktur des Templates bleibt 1:1 erhalten; Organabschnitte bleiben durch Leerzeilen getrennt.
5. Schweizer Orthographie (kein "ß"), präziser deutscher Radiologie-Stil.

ANTI-HALLUZINATION:
- Verwende nur Informationen aus Transkript und klinischen Angaben.
- Erfinde keine Befunde, Messungen, Vergleiche oder Empfehlungen.
- Keine Abkürzungen wie "V.a." oder "Z.n.", immer ausschreiben.

BEURTEILUNG:
- 1 bis 5 Aufzählungspunkte, jeder beginnt mit "•".
- Beginne mit der akutesten Pathologie und beantworte eine diktierte Fragestellung zuerst.
- Keine Wiederholung von Normalbefunden.

WISSENSWERTES:
- Ein fortgeschrittener Fakt (1-2 Sätze, Deutsch) zu den Befunden und ein englischer PubMed-Suchbegriff.

ICD-10:
- Hauptdiagnose als ICD-10-GM Code ohne Zusatztext, sonst "Z03.9".

Antworte ausschliesslich mit JSON in genau dieser Struktur:
{
  "revisedBefundText": "zusammengeführter Befundtext",
  "beurteilungText": "• Punkt 1\n• Punkt 2",
  "didYouKnow": {
    "fact": "Fakt auf Deutsch",
    "pubmedSearchTerm": "english search term"
  },
  "icd10": "K85.9"
}"#;

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Build the `(system, user)` prompt pair for a generation request
pub fn build_report_prompt(request: &GenerationRequest) -> (String, String) {
    let clinical = &request.clinical_data;
    let indication = clinical_value(clinical, &[fields::INDICATION, fields::KLINISCHE_ANGABEN]);
    let fragestellung = clinical_value(clinical, &[fields::FRAGESTELLUNG]);

    let baseline = if request.baseline.trim().is_empty() {
        "(keine Vorlage)"
    } else {
        request.baseline.as_str()
    };
    let transcript = if request.transcript.trim().is_empty() {
        "(leer)"
    } else {
        request.transcript.as_str()
    };

    let user = format!(
        "UNTERSUCHUNG: {}\n\nBaseline BEFUND:\n{}\n\nIndikation (Fakten): {}\nFragestellung (zu beantworten): {}\nTechnik: {}\nKontrastmittel: {}\nVoruntersuchungen: {}\n\nTranskript:\n{}\n\nErstelle den vollständigen Bericht (revidierter BEFUND + BEURTEILUNG) als striktes JSON.",
        request.template_name,
        baseline,
        or_dash(indication),
        or_dash(fragestellung),
        or_dash(clinical_value(clinical, &[fields::TECHNIK])),
        or_dash(clinical_value(clinical, &[fields::KONTRASTMITTEL])),
        or_dash(clinical_value(clinical, &[fields::VORUNTERSUCHUNGEN])),
        transcript,
    );

    (SYSTEM_PROMPT.to_string(), user)
}
