//! Degraded-mode report composition for when no generation service answers.
//!
//! Dictated sentences are appended verbatim to the template body, grouped by the organ
//! they mention and wrapped in highlight marks. Nothing is invented: every highlighted
//! span is a sentence the radiologist dictated. The composer is total on its input.

use crate::assembler::{assemble_report, EMPTY_FIELD};
use crate::html::{highlight, text_to_html};
use crate::models::{ClinicalData, ComposedReport, ReportSections};

/// Befund text used when the template has no body and nothing was dictated
pub const NO_TEMPLATE_BEFUND: &str = "Keine Normalbefund-Vorlage definiert.";

/// Impression placeholder when dictation is present
pub const FALLBACK_IMPRESSION: &str = "Siehe Befund. Weitere klinische Korrelation empfohlen.";

/// Study name used when the template has none
pub const UNKNOWN_STUDY: &str = "Unbekannte Untersuchung";

/// Organ categories and their trigger substrings, checked in this order.
pub const ORGAN_CATEGORIES: &[(&str, &[&str])] = &[
    ("leber", &["leber", "hepar", "hepat"]),
    ("gallenblase", &["gallenblase", "gallenblasen", "galle"]),
    ("milz", &["milz"]),
    ("nieren", &["niere", "nieren", "renal", "ren"]),
    ("pankreas", &["pankreas", "pancrea"]),
    ("nebennieren", &["nebenniere", "nebennieren", "adrenal"]),
    ("lymphknoten", &["lymphknoten", "lymph"]),
    ("gefaesse", &["gefäss", "gefäße", "gefass", "aorta", "vena"]),
    ("lunge", &["lunge", "lungen", "pulmo", "pleura"]),
    ("herz", &["herz", "cardiac", "perikard"]),
];

const BLOCK_SEPARATOR: &str = "<br/><br/>";

/// Split after `.`, `!`, `?` or a newline; sentences come back trimmed and non-empty
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            sentences.push(&text[start..end]);
            start = end;
        }
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// First organ category whose trigger occurs in the sentence (case-insensitive)
pub fn classify_sentence(sentence: &str) -> Option<&'static str> {
    let lower = sentence.to_lowercase();
    ORGAN_CATEGORIES
        .iter()
        .find(|(_, triggers)| triggers.iter().any(|t| lower.contains(t)))
        .map(|(category, _)| *category)
}

/// Dictated sentences grouped by organ category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedFindings {
    /// Categories in order of first mention
    pub categories: Vec<(&'static str, Vec<String>)>,
    pub unmatched: Vec<String>,
}

impl ClassifiedFindings {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.unmatched.is_empty()
    }

    /// Category blocks followed by the unmatched block
    pub fn blocks(&self) -> impl Iterator<Item = &[String]> {
        self.categories
            .iter()
            .map(|(_, sentences)| sentences.as_slice())
            .chain((!self.unmatched.is_empty()).then_some(self.unmatched.as_slice()))
    }
}

pub fn classify_findings(transcript: &str) -> ClassifiedFindings {
    let mut findings = ClassifiedFindings::default();

    for sentence in split_sentences(transcript) {
        match classify_sentence(sentence) {
            Some(category) => match findings.categories.iter_mut().find(|(c, _)| *c == category) {
                Some((_, sentences)) => sentences.push(sentence.to_string()),
                None => findings.categories.push((category, vec![sentence.to_string()])),
            },
            None => findings.unmatched.push(sentence.to_string()),
        }
    }
    findings
}

/// Template body with the dictated findings appended as highlighted blocks
pub fn compose_befund(normal_befund_text: &str, transcript: &str) -> String {
    let findings = classify_findings(transcript);
    let insertions: Vec<String> = findings
        .blocks()
        .map(|sentences| {
            sentences
                .iter()
                .map(|s| highlight(s))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let has_body = !normal_befund_text.trim().is_empty();
    match (has_body, insertions.is_empty()) {
        (true, true) => text_to_html(normal_befund_text),
        (true, false) => format!(
            "{}{}{}",
            text_to_html(normal_befund_text),
            BLOCK_SEPARATOR,
            insertions.join(BLOCK_SEPARATOR)
        ),
        (false, true) => NO_TEMPLATE_BEFUND.to_string(),
        (false, false) => insertions.join(BLOCK_SEPARATOR),
    }
}

/// One-line impression: a highlighted placeholder when anything was dictated
pub fn compose_impression(transcript: &str) -> String {
    if transcript.trim().is_empty() {
        EMPTY_FIELD.to_string()
    } else {
        highlight(FALLBACK_IMPRESSION)
    }
}

/// Build a complete report from the template and raw dictation without any model
pub fn compose_fallback_report(
    template_name: &str,
    normal_befund_text: &str,
    clinical: &ClinicalData,
    transcript: &str,
) -> ComposedReport {
    let study = if template_name.trim().is_empty() {
        UNKNOWN_STUDY
    } else {
        template_name
    };

    let mut sections = ReportSections::administrative(study, clinical);
    sections.befund = compose_befund(normal_befund_text, transcript);
    sections.beurteilung = compose_impression(transcript);
    assemble_report(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fields;

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("Zyste in der Leber. Patient klagt über Schmerzen."),
            vec!["Zyste in der Leber.", "Patient klagt über Schmerzen."]
        );
        assert_eq!(
            split_sentences("Milz gross!Niere?\n\nRest ohne Punkt"),
            vec!["Milz gross!", "Niere?", "Rest ohne Punkt"]
        );
        assert!(split_sentences("  \n ").is_empty());
    }

    #[test]
    fn test_classify_first_category_wins() {
        assert_eq!(classify_sentence("Hepatomegalie."), Some("leber"));
        assert_eq!(classify_sentence("Leber und Milz vergrössert."), Some("leber"));
        assert_eq!(classify_sentence("Aorta ektatisch."), Some("gefaesse"));
        assert_eq!(classify_sentence("Patient klagt über Schmerzen."), None);
    }

    #[test]
    fn test_categories_in_order_of_first_mention() {
        let findings = classify_findings("Milz 14 cm. Leberzyste. Milz homogen. Unklar.");
        let categories: Vec<&str> = findings.categories.iter().map(|(c, _)| *c).collect();
        assert_eq!(categories, vec!["milz", "leber"]);
        assert_eq!(findings.categories[0].1, vec!["Milz 14 cm.", "Milz homogen."]);
        assert_eq!(findings.unmatched, vec!["Unklar."]);
    }

    #[test]
    fn test_liver_scenario() {
        let befund = compose_befund(
            "Leber unauffällig.",
            "Zyste in der Leber. Patient klagt über Schmerzen.",
        );
        assert_eq!(
            befund,
            "Leber unauffällig.<br/><br/><mark class=\"hl\">Zyste in der Leber.</mark>\
             <br/><br/><mark class=\"hl\">Patient klagt über Schmerzen.</mark>"
        );
    }

    #[test]
    fn test_sentences_of_one_category_share_a_block() {
        let befund = compose_befund("Body.", "Leber 17 cm. Hepar steatotisch.");
        assert_eq!(
            befund,
            "Body.<br/><br/><mark class=\"hl\">Leber 17 cm.</mark> <mark class=\"hl\">Hepar steatotisch.</mark>"
        );
    }

    #[test]
    fn test_empty_body_uses_insertions_only() {
        assert_eq!(
            compose_befund("", "Milz vergrössert."),
            "<mark class=\"hl\">Milz vergrössert.</mark>"
        );
        assert_eq!(compose_befund("  ", ""), NO_TEMPLATE_BEFUND);
    }

    #[test]
    fn test_body_is_escaped_with_line_breaks() {
        assert_eq!(compose_befund("Leber <normal>\nMilz", ""), "Leber &lt;normal&gt;<br/>Milz");
    }

    #[test]
    fn test_dictation_is_escaped() {
        let befund = compose_befund("", "<script>x</script>");
        assert!(befund.contains("&lt;script&gt;"));
        assert!(!befund.contains("<script>"));
    }

    #[test]
    fn test_impression() {
        assert_eq!(compose_impression("  "), "-");
        assert_eq!(
            compose_impression("Zyste."),
            "<mark class=\"hl\">Siehe Befund. Weitere klinische Korrelation empfohlen.</mark>"
        );
    }

    #[test]
    fn test_fallback_report_is_total() {
        let report = compose_fallback_report("", "", &ClinicalData::new(), "");
        assert_eq!(report.sections.untersuchung, UNKNOWN_STUDY);
        assert_eq!(report.sections.befund, NO_TEMPLATE_BEFUND);
        assert_eq!(report.sections.beurteilung, "-");
        assert!(report.html.contains("<strong>Klinische Angaben</strong><br/>-</p>"));
    }

    #[test]
    fn test_fallback_report_carries_clinical_data() {
        let mut clinical = ClinicalData::new();
        clinical.insert(fields::KLINISCHE_ANGABEN.to_string(), "Fieber & Schmerzen".to_string());
        let report = compose_fallback_report("CT Abdomen", "Leber unauffällig.", &clinical, "Milz 13 cm.");
        assert!(report.html.contains("Fieber &amp; Schmerzen"));
        assert!(report.html.contains("<mark class=\"hl\">Milz 13 cm.</mark>"));
        assert!(report.html.contains("<strong>Untersuchung</strong><br/>CT Abdomen</p>"));
    }
}
