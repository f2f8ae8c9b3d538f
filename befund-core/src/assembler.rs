//! Renders report sections into the document handed to the editor.
//!
//! Both the model-backed path and the fallback path end here, so the section layout
//! is identical whichever way the befund was produced.

use crate::html::{escape_html, sanitize_markup};
use crate::models::{ClinicalData, ComposedReport, ReportSections};

/// Placeholder for empty fields
pub const EMPTY_FIELD: &str = "-";

/// Section headers in document order
pub mod titles {
    pub const UNTERSUCHUNG: &str = "Untersuchung";
    pub const KLINISCHE_ANGABEN: &str = "Klinische Angaben";
    pub const TECHNIK: &str = "Technik";
    pub const KONTRASTMITTEL: &str = "Kontrastmittel";
    pub const VORUNTERSUCHUNGEN: &str = "Voruntersuchungen";
    pub const BEFUND: &str = "Befund";
    pub const BEURTEILUNG: &str = "Beurteilung";
}

fn plain_field(title: &str, value: &str) -> String {
    let value = if value.trim().is_empty() {
        EMPTY_FIELD.to_string()
    } else {
        escape_html(value)
    };
    format!("  <p><strong>{}</strong><br/>{}</p>\n", title, value)
}

fn markup_block(title: &str, class: &str, fragment: &str) -> String {
    let fragment = if fragment.trim().is_empty() { EMPTY_FIELD } else { fragment };
    format!(
        "  <p><strong>{}</strong></p>\n  <div class=\"{}\">{}</div>\n",
        title, class, fragment
    )
}

/// Render `sections` into one document.
///
/// Administrative fields are escaped here. `befund` and `beurteilung` must already be
/// sanitized fragments (see [`sanitize_markup`]); they are inserted as they are.
pub fn assemble_report(sections: ReportSections) -> ComposedReport {
    let mut html = String::from("<div class=\"report-content\">\n");
    html.push_str(&plain_field(titles::UNTERSUCHUNG, &sections.untersuchung));
    html.push_str(&plain_field(titles::KLINISCHE_ANGABEN, &sections.klinische_angaben));
    html.push_str(&plain_field(titles::TECHNIK, &sections.technik));
    html.push_str(&plain_field(titles::KONTRASTMITTEL, &sections.kontrastmittel));
    html.push_str(&plain_field(titles::VORUNTERSUCHUNGEN, &sections.voruntersuchungen));
    html.push_str(&markup_block(titles::BEFUND, "befund-content", &sections.befund));
    html.push_str(&markup_block(titles::BEURTEILUNG, "impression-content", &sections.beurteilung));
    html.push_str("</div>");

    ComposedReport { html, sections }
}

/// Assemble from model output, sanitizing the befund and beurteilung bodies
pub fn assemble_from_model_text(
    template_name: &str,
    clinical: &ClinicalData,
    befund: &str,
    beurteilung: &str,
) -> ComposedReport {
    let mut sections = ReportSections::administrative(template_name, clinical);
    sections.befund = sanitize_markup(befund);
    sections.beurteilung = sanitize_markup(beurteilung);
    assemble_report(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fields;

    #[test]
    fn test_all_sections_in_order() {
        let report = assemble_report(ReportSections::default());
        let positions: Vec<usize> = [
            titles::UNTERSUCHUNG,
            titles::KLINISCHE_ANGABEN,
            titles::TECHNIK,
            titles::KONTRASTMITTEL,
            titles::VORUNTERSUCHUNGEN,
            titles::BEFUND,
            titles::BEURTEILUNG,
        ]
        .iter()
        .map(|t| report.html.find(&format!("<strong>{}</strong>", t)).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(report.html.starts_with("<div class=\"report-content\">"));
        assert!(report.html.ends_with("</div>"));
    }

    #[test]
    fn test_empty_fields_render_placeholder() {
        let report = assemble_report(ReportSections::default());
        assert!(report.html.contains("<strong>Technik</strong><br/>-</p>"));
        assert!(report.html.contains("<div class=\"impression-content\">-</div>"));
    }

    #[test]
    fn test_plain_fields_are_escaped() {
        let sections = ReportSections {
            untersuchung: "CT <Abdomen>".to_string(),
            technik: "\"nativ\" & KM".to_string(),
            ..Default::default()
        };
        let report = assemble_report(sections);
        assert!(report.html.contains("CT &lt;Abdomen&gt;"));
        assert!(report.html.contains("&quot;nativ&quot; &amp; KM"));
    }

    #[test]
    fn test_model_text_is_sanitized() {
        let mut clinical = ClinicalData::new();
        clinical.insert(fields::TECHNIK.to_string(), "Portalvenös".to_string());
        let report = assemble_from_model_text(
            "CT Abdomen",
            &clinical,
            "Leber.<br/><mark class=\"hl\">Zyste</mark><img src=x onerror=alert(1)>",
            "• Zyste\n• sonst normal",
        );
        assert!(report.html.contains("<mark class=\"hl\">Zyste</mark>"));
        assert!(!report.html.contains("<img"));
        assert!(report.sections.beurteilung.contains("• Zyste<br/>• sonst normal"));
        assert!(report.html.contains("Portalvenös"));
    }
}
