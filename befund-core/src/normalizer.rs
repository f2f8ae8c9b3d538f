//! Dictation normalization pipeline.
//!
//! Raw dictation passes through a fixed, ordered list of named stages:
//!
//! 1. whitespace normalization
//! 2. spoken-punctuation expansion ("komma" -> ",", "neuer absatz" -> paragraph break)
//! 3. dictionary correction ([`CorrectionSet`])
//! 4. whitespace normalization again, to clean up what stages 2 and 3 left behind
//!
//! The same [`TranscriptNormalizer`] serves interim previews, finalized utterances and
//! whole-transcript normalization, so identical input always yields identical output.

use regex::Regex;
use std::sync::LazyLock;

use crate::corrections::CorrectionSet;
use crate::models::CorrectionEntry;

/// Spoken punctuation vocabulary. Multi-word phrases come first so that
/// "neuer absatz" wins over "absatz".
pub const SPOKEN_PUNCTUATION: &[(&str, &str)] = &[
    ("klammer auf", "("),
    ("klammer zu", ")"),
    ("neue zeile", "\n"),
    ("neuer absatz", "\n\n"),
    ("fragezeichen", "?"),
    ("ausrufezeichen", "!"),
    ("doppelpunkt", ":"),
    ("semikolon", ";"),
    ("strichpunkt", ";"),
    ("gedankenstrich", " - "),
    ("bindestrich", "-"),
    ("anführungszeichen", "\""),
    ("absatz", "\n\n"),
    ("komma", ","),
    ("punkt", "."),
];

static SPOKEN_PUNCTUATION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    SPOKEN_PUNCTUATION
        .iter()
        .map(|(spoken, symbol)| {
            let phrase = spoken
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+");
            let regex = Regex::new(&format!(r"(?i)\b{}\b", phrase)).unwrap();
            (regex, *symbol)
        })
        .collect()
});

static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\n]+").unwrap());
static WS_AROUND_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" ?\n ?").unwrap());
static WS_BEFORE_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+([.,;:!?])").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Collapse whitespace, drop spaces before sentence punctuation and trim.
///
/// Line breaks survive (spaces around them are removed, three or more collapse to a
/// paragraph break) so that dictated "neue zeile" / "neuer absatz" keep their effect.
/// A line break directly before sentence punctuation is removed like any other
/// whitespace there.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = WS_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = WS_BEFORE_PUNCT.replace_all(&text, "$1");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Replace spoken punctuation names with their symbols (whole word, case-insensitive)
pub fn expand_spoken_punctuation(text: &str) -> String {
    let mut result = text.to_string();
    for (regex, symbol) in SPOKEN_PUNCTUATION_PATTERNS.iter() {
        result = regex.replace_all(&result, regex::NoExpand(*symbol)).into_owned();
    }
    result
}

/// A named step of the dictation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationStage {
    Whitespace,
    SpokenPunctuation,
    Corrections,
}

impl NormalizationStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::SpokenPunctuation => "spoken_punctuation",
            Self::Corrections => "corrections",
        }
    }
}

/// Stage order used for every dictation path
pub const DICTATION_STAGES: [NormalizationStage; 4] = [
    NormalizationStage::Whitespace,
    NormalizationStage::SpokenPunctuation,
    NormalizationStage::Corrections,
    NormalizationStage::Whitespace,
];

/// Dictation normalizer with a precompiled correction dictionary
#[derive(Debug, Clone, Default)]
pub struct TranscriptNormalizer {
    corrections: CorrectionSet,
}

impl TranscriptNormalizer {
    pub fn new(corrections: &[CorrectionEntry]) -> Self {
        Self {
            corrections: CorrectionSet::new(corrections),
        }
    }

    pub fn corrections(&self) -> &CorrectionSet {
        &self.corrections
    }

    /// Run a single stage
    pub fn apply_stage(&self, stage: NormalizationStage, text: &str) -> String {
        match stage {
            NormalizationStage::Whitespace => normalize_whitespace(text),
            NormalizationStage::SpokenPunctuation => expand_spoken_punctuation(text),
            NormalizationStage::Corrections => self.corrections.apply(text),
        }
    }

    /// Run the full dictation pipeline
    pub fn normalize(&self, text: &str) -> String {
        DICTATION_STAGES
            .iter()
            .fold(text.to_string(), |acc, stage| self.apply_stage(*stage, &acc))
    }
}

/// One-shot convenience wrapper around [`TranscriptNormalizer`]
pub fn process_transcript(text: &str, corrections: &[CorrectionEntry]) -> String {
    TranscriptNormalizer::new(corrections).normalize(text)
}
