//! Shared data model for templates, dictionary entries and report sections.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Free-text clinical fields (indication, technique, contrast, priors).
///
/// Values pass through to the rendered report verbatim; the core never rewrites them.
pub type ClinicalData = BTreeMap<String, String>;

/// Well-known clinical data keys used by the browser layer
pub mod fields {
    pub const KLINISCHE_ANGABEN: &str = "klinischeAngaben";
    pub const INDICATION: &str = "indication";
    pub const FRAGESTELLUNG: &str = "fragestellung";
    pub const TECHNIK: &str = "technik";
    pub const KONTRASTMITTEL: &str = "kontrastmittel";
    pub const VORUNTERSUCHUNGEN: &str = "voruntersuchungen";
}

/// Look up the first non-blank value among `keys`.
pub fn clinical_value<'a>(data: &'a ClinicalData, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| data.get(*k))
        .map(|v| v.as_str())
        .find(|v| !v.trim().is_empty())
}

/// A reusable baseline report skeleton keyed by study type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    /// Matching keywords; order is kept for display only
    #[serde(default)]
    pub keywords: Vec<String>,
    /// The "normal" befund body the dictation is merged into
    #[serde(default)]
    pub normal_befund_text: String,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub updated_at: i64,
}

impl Template {
    pub fn new(id: impl Into<String>, name: impl Into<String>, keywords: &[&str], body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            normal_befund_text: body.into(),
            updated_at: Utc::now().timestamp_millis(),
        }
    }

    /// Empty template as created from the editor
    pub fn blank() -> Self {
        Self {
            id: format!("tpl-{}", Uuid::new_v4()),
            name: "Neue Vorlage".to_string(),
            keywords: Vec::new(),
            normal_befund_text: "Normalbefund hier eingeben...".to_string(),
            updated_at: Utc::now().timestamp_millis(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }
}

/// One dictionary replacement applied to dictated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionEntry {
    pub id: String,
    pub wrong: String,
    pub correct: String,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
}

impl CorrectionEntry {
    /// New entry with the editor defaults (case-insensitive, whole word)
    pub fn new(wrong: impl Into<String>, correct: impl Into<String>) -> Self {
        Self {
            id: format!("c-{}", Uuid::new_v4()),
            wrong: wrong.into(),
            correct: correct.into(),
            case_insensitive: true,
            whole_word: true,
        }
    }

    pub fn with_flags(mut self, case_insensitive: bool, whole_word: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self.whole_word = whole_word;
        self
    }
}

/// A text snippet the radiologist can insert into the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    pub id: String,
    pub title: String,
    pub text: String,
}

/// Default macros offered in a fresh installation
pub fn default_macros() -> Vec<Macro> {
    [
        ("macro-1", "Unauffällig", "Unauffälliger Befund, keine pathologischen Veränderungen."),
        ("macro-2", "Kontrastmittel i.v.", "Nach intravenöser Kontrastmittelgabe."),
        ("macro-3", "Vergleich VU", "Im Vergleich zur Voruntersuchung vom [DATUM]."),
        ("macro-4", "Keine VU", "Keine Voruntersuchungen zum Vergleich verfügbar."),
    ]
    .into_iter()
    .map(|(id, title, text)| Macro {
        id: id.to_string(),
        title: title.to_string(),
        text: text.to_string(),
    })
    .collect()
}

/// Structured sections of a composed report.
///
/// The administrative fields are plain text; `befund` and `beurteilung` are sanitized
/// markup fragments that may contain `<br/>` and `<mark class="hl">` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSections {
    pub untersuchung: String,
    pub klinische_angaben: String,
    pub technik: String,
    pub kontrastmittel: String,
    pub voruntersuchungen: String,
    pub befund: String,
    pub beurteilung: String,
}

impl ReportSections {
    /// Administrative fields taken from the template name and clinical data
    pub fn administrative(template_name: &str, clinical: &ClinicalData) -> Self {
        Self {
            untersuchung: template_name.to_string(),
            klinische_angaben: clinical_value(clinical, &[fields::INDICATION, fields::KLINISCHE_ANGABEN])
                .unwrap_or_default()
                .to_string(),
            technik: clinical_value(clinical, &[fields::TECHNIK]).unwrap_or_default().to_string(),
            kontrastmittel: clinical_value(clinical, &[fields::KONTRASTMITTEL])
                .unwrap_or_default()
                .to_string(),
            voruntersuchungen: clinical_value(clinical, &[fields::VORUNTERSUCHUNGEN])
                .unwrap_or_default()
                .to_string(),
            befund: String::new(),
            beurteilung: String::new(),
        }
    }
}

/// Rendered report document plus its sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedReport {
    pub html: String,
    pub sections: ReportSections,
}
