//! Transcript buffer for a live dictation.
//!
//! Committed utterances are normalized on arrival; interim recognizer output is only
//! ever shown in the preview and never reaches the committed transcript.

use tracing::debug;

use crate::models::CorrectionEntry;
use crate::normalizer::TranscriptNormalizer;

/// A dictation in progress
pub struct DictationSession {
    normalizer: TranscriptNormalizer,
    transcript: String,
    interim: String,
    /// Text of the most recent insertion, as it was inserted
    last_inserted: Option<String>,
}

impl DictationSession {
    pub fn new(corrections: &[CorrectionEntry]) -> Self {
        Self::with_normalizer(TranscriptNormalizer::new(corrections))
    }

    pub fn with_normalizer(normalizer: TranscriptNormalizer) -> Self {
        Self {
            normalizer,
            transcript: String::new(),
            interim: String::new(),
            last_inserted: None,
        }
    }

    /// Replace the dictionary used for subsequent normalization
    pub fn set_corrections(&mut self, corrections: &[CorrectionEntry]) {
        self.normalizer = TranscriptNormalizer::new(corrections);
    }

    /// Committed transcript
    pub fn text(&self) -> &str {
        &self.transcript
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.trim().is_empty()
    }

    /// Replace the transcript wholesale, as when the user edits it by hand
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.transcript = text.into();
        self.last_inserted = None;
    }

    fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.transcript.is_empty() && !self.transcript.ends_with('\n') {
            self.transcript.push(' ');
        }
        self.transcript.push_str(text);
        self.last_inserted = Some(text.to_string());
    }

    /// Normalize a final utterance and append it. Returns the appended text.
    pub fn commit_utterance(&mut self, raw: &str) -> String {
        let normalized = self.normalizer.normalize(raw);
        debug!("Committing utterance ({} -> {} chars)", raw.len(), normalized.len());
        self.interim.clear();
        self.append(&normalized);
        normalized
    }

    /// Current partial recognizer output
    pub fn set_interim(&mut self, raw: &str) {
        self.interim = raw.to_string();
    }

    /// Transcript plus the normalized interim text, for display only
    pub fn preview(&self) -> String {
        let interim = self.normalizer.normalize(&self.interim);
        if interim.is_empty() {
            return self.transcript.clone();
        }
        if self.transcript.is_empty() || self.transcript.ends_with('\n') {
            format!("{}{}", self.transcript, interim)
        } else {
            format!("{} {}", self.transcript, interim)
        }
    }

    /// Append a macro's text as-is
    pub fn insert_macro(&mut self, text: &str) {
        self.append(text.trim());
    }

    /// Re-run the full normalization over the whole transcript
    pub fn normalize_all(&mut self) {
        self.transcript = self.normalizer.normalize(&self.transcript);
        self.last_inserted = None;
    }

    /// Normalize only the most recent insertion in place.
    ///
    /// Replaces the last occurrence of the inserted text. Returns false when there is
    /// no insertion, it has been edited away, or normalizing changes nothing.
    pub fn normalize_last_insertion(&mut self) -> bool {
        let Some(inserted) = self.last_inserted.as_deref() else {
            return false;
        };
        let Some(pos) = self.transcript.rfind(inserted) else {
            return false;
        };

        let normalized = self.normalizer.normalize(inserted);
        if normalized == inserted {
            return false;
        }

        self.transcript.replace_range(pos..pos + inserted.len(), &normalized);
        self.last_inserted = Some(normalized);
        true
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
        self.interim.clear();
        self.last_inserted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DictationSession {
        DictationSession::new(&[CorrectionEntry::new("hipodens", "hypodens")])
    }

    #[test]
    fn test_commit_normalizes_and_joins() {
        let mut s = session();
        s.commit_utterance("Leber hipodens punkt");
        s.commit_utterance("Milz   normal punkt");
        assert_eq!(s.text(), "Leber hypodens. Milz normal.");
    }

    #[test]
    fn test_no_space_after_newline() {
        let mut s = session();
        s.commit_utterance("Leber normal neue zeile Milz normal");
        assert_eq!(s.text(), "Leber normal\nMilz normal");

        s.set_text("Leber normal\n");
        s.commit_utterance("Milz normal");
        assert_eq!(s.text(), "Leber normal\nMilz normal");
    }

    #[test]
    fn test_interim_never_committed() {
        let mut s = session();
        s.commit_utterance("Leber normal punkt");
        s.set_interim("milz komma");
        assert_eq!(s.preview(), "Leber normal. milz,");
        assert_eq!(s.text(), "Leber normal.");

        s.commit_utterance("Milz normal");
        assert_eq!(s.preview(), "Leber normal. Milz normal");
    }

    #[test]
    fn test_insert_macro_verbatim() {
        let mut s = session();
        s.insert_macro("Keine Voruntersuchungen zum Vergleich verfügbar.");
        assert_eq!(s.text(), "Keine Voruntersuchungen zum Vergleich verfügbar.");
    }

    #[test]
    fn test_normalize_last_insertion() {
        let mut s = session();
        s.commit_utterance("Leber normal.");
        s.insert_macro("Niere hipodens punkt");
        assert!(s.normalize_last_insertion());
        assert_eq!(s.text(), "Leber normal. Niere hypodens.");
        assert!(!s.normalize_last_insertion());
    }

    #[test]
    fn test_normalize_last_insertion_after_manual_edit() {
        let mut s = session();
        s.insert_macro("hipodens");
        s.set_text("ganz anders");
        assert!(!s.normalize_last_insertion());
    }

    #[test]
    fn test_normalize_all_and_clear() {
        let mut s = session();
        s.set_text("Leber  hipodens komma Milz normal");
        s.normalize_all();
        assert_eq!(s.text(), "Leber hypodens, Milz normal");
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.preview(), "");
    }
}
