//! Dictionary-based correction of dictated text.
//!
//! Entries are applied strictly in list order: a later entry sees the text produced by
//! the earlier ones. Chains where `correct` matches another entry's `wrong` are
//! therefore not idempotent, and that is left to whoever maintains the dictionary.

use regex::{NoExpand, Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::models::CorrectionEntry;

/// A correction entry with its pattern compiled
#[derive(Debug, Clone)]
struct CompiledCorrection {
    regex: Regex,
    correct: String,
}

/// Ordered, precompiled correction dictionary.
///
/// Entries whose pattern fails to compile are skipped; the rest still apply.
#[derive(Debug, Clone, Default)]
pub struct CorrectionSet {
    entries: Vec<CompiledCorrection>,
}

impl CorrectionSet {
    pub fn new(entries: &[CorrectionEntry]) -> Self {
        let compiled: Vec<CompiledCorrection> = entries.iter().filter_map(compile_entry).collect();
        debug!(
            "Compiled {} of {} correction entries",
            compiled.len(),
            entries.len()
        );
        Self { entries: compiled }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every entry in order
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for entry in &self.entries {
            result = entry
                .regex
                .replace_all(&result, NoExpand(&entry.correct))
                .into_owned();
        }
        result
    }
}

/// Build the match pattern for an entry: escaped literal, optionally word-bounded
pub fn correction_pattern(entry: &CorrectionEntry) -> String {
    let escaped = regex::escape(&entry.wrong);
    if entry.whole_word {
        format!(r"\b{}\b", escaped)
    } else {
        escaped
    }
}

fn compile_entry(entry: &CorrectionEntry) -> Option<CompiledCorrection> {
    if entry.wrong.is_empty() || entry.wrong == entry.correct {
        return None;
    }

    match RegexBuilder::new(&correction_pattern(entry))
        .case_insensitive(entry.case_insensitive)
        .build()
    {
        Ok(regex) => Some(CompiledCorrection {
            regex,
            correct: entry.correct.clone(),
        }),
        Err(e) => {
            warn!("Skipping correction entry {} ({:?}): {}", entry.id, entry.wrong, e);
            None
        }
    }
}

/// Apply a single entry to `text`; an unusable entry leaves the text unchanged
pub fn apply_single_correction(text: &str, entry: &CorrectionEntry) -> String {
    match compile_entry(entry) {
        Some(compiled) => compiled
            .regex
            .replace_all(text, NoExpand(&compiled.correct))
            .into_owned(),
        None => text.to_string(),
    }
}

/// Apply `corrections` in order without keeping the compiled set around
pub fn apply_corrections(text: &str, corrections: &[CorrectionEntry]) -> String {
    CorrectionSet::new(corrections).apply(text)
}

/// The radiology dictionary shipped with a fresh installation
pub fn default_corrections() -> Vec<CorrectionEntry> {
    let entry = |id: &str, wrong: &str, correct: &str, whole_word: bool| CorrectionEntry {
        id: id.to_string(),
        wrong: wrong.to_string(),
        correct: correct.to_string(),
        case_insensitive: true,
        whole_word,
    };

    vec![
        entry("c1", "pirats", "PI-RADS", true),
        entry("c2", "pirads", "PI-RADS", true),
        entry("c3", "adik", "ADC", true),
        entry("c4", "vkb", "VKB", true),
        entry("c5", "hkb", "HKB", true),
        entry("c6", "t2w", "T2w", true),
        entry("c7", "dwi", "DWI", true),
        entry("c8", "flair", "FLAIR", true),
        entry("c9", "stir", "STIR", true),
        entry("c10", "hounsfield", "Hounsfield", true),
        entry("c11", "komma", ",", true),
        entry("c12", "punkt", ".", true),
        entry("c13", "doppelpunkt", ":", true),
        entry("c14", "neue zeile", "\n", false),
        entry("c15", "neuer absatz", "\n\n", false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ct_entry(whole_word: bool) -> CorrectionEntry {
        CorrectionEntry::new("ct", "CT").with_flags(false, whole_word)
    }

    #[test]
    fn test_whole_word_leaves_longer_words_alone() {
        let entry = ct_entry(true);
        assert_eq!(apply_single_correction("cta scan", &entry), "cta scan");
        assert_eq!(apply_single_correction("a ct scan", &entry), "a CT scan");
    }

    #[test]
    fn test_substring_mode_rewrites_inside_words() {
        let entry = ct_entry(false);
        assert_eq!(apply_single_correction("cta scan", &entry), "CTa scan");
    }

    #[test]
    fn test_case_sensitivity_flag() {
        let sensitive = ct_entry(true);
        assert_eq!(apply_single_correction("a Ct scan", &sensitive), "a Ct scan");

        let insensitive = CorrectionEntry::new("ct", "CT");
        assert_eq!(apply_single_correction("a Ct scan", &insensitive), "a CT scan");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let entry = CorrectionEntry::new("a.b", "X").with_flags(false, false);
        assert_eq!(apply_single_correction("a.b acb", &entry), "X acb");

        let entry = CorrectionEntry::new("(li)", "links").with_flags(false, false);
        assert_eq!(apply_single_correction("Niere (li)", &entry), "Niere links");
    }

    #[test]
    fn test_replacement_is_not_expanded() {
        let entry = CorrectionEntry::new("preis", "$1 CHF").with_flags(true, true);
        assert_eq!(apply_single_correction("preis", &entry), "$1 CHF");
    }

    #[test]
    fn test_empty_and_identity_entries_are_skipped() {
        let entries = vec![
            CorrectionEntry::new("", "x"),
            CorrectionEntry::new("same", "same"),
        ];
        let set = CorrectionSet::new(&entries);
        assert!(set.is_empty());
        assert_eq!(set.apply("same text"), "same text");
    }

    #[test]
    fn test_entries_apply_in_order() {
        let entries = vec![
            CorrectionEntry::new("pirats", "pirads"),
            CorrectionEntry::new("pirads", "PI-RADS"),
        ];
        assert_eq!(apply_corrections("pirats 4", &entries), "PI-RADS 4");

        let reversed: Vec<_> = entries.into_iter().rev().collect();
        assert_eq!(apply_corrections("pirats 4", &reversed), "pirads 4");
    }

    #[test]
    fn test_default_dictionary() {
        let set = CorrectionSet::new(&default_corrections());
        assert_eq!(set.len(), 15);
        assert_eq!(set.apply("pirats 4 in t2w"), "PI-RADS 4 in T2w");
        assert_eq!(set.apply("Befund neuer absatz Leber"), "Befund \n\n Leber");
    }

    #[test]
    fn test_umlaut_word_boundaries() {
        let entry = CorrectionEntry::new("grösse", "Grösse");
        assert_eq!(apply_single_correction("die grösse", &entry), "die Grösse");
        assert_eq!(apply_single_correction("grössere", &entry), "grössere");
    }
}
