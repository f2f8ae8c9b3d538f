//! Keyword-overlap ranking of templates against dictated text.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::Template;

/// Coarse bucket summarizing a match score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 3 => Self::High,
            2 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A template with its match score against one transcript
#[derive(Debug, Clone, Serialize)]
pub struct TemplateScore<'a> {
    pub template: &'a Template,
    pub score: u32,
    pub confidence: Confidence,
}

/// Count the template's keywords that occur anywhere in the transcript.
///
/// Matching is a case-insensitive substring test, so "niere" also hits "Nieren".
/// Each keyword counts once however often it occurs; blank keywords and
/// case-insensitive duplicates are ignored.
pub fn score_template(template: &Template, transcript: &str) -> u32 {
    let haystack = transcript.to_lowercase();
    let mut seen = HashSet::new();

    template
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .filter(|k| haystack.contains(k.as_str()))
        .count() as u32
}

/// Rank templates by score, dropping those without any hit.
///
/// The sort is stable, so equal scores keep the caller's template order.
pub fn rank_templates<'a>(templates: &'a [Template], transcript: &str) -> Vec<TemplateScore<'a>> {
    let mut scores: Vec<TemplateScore<'a>> = templates
        .iter()
        .map(|template| {
            let score = score_template(template, transcript);
            TemplateScore {
                template,
                score,
                confidence: Confidence::from_score(score),
            }
        })
        .filter(|s| s.score > 0)
        .collect();

    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn template(id: &str, keywords: &[&str]) -> Template {
        Template::new(id, id.to_uppercase(), keywords, "")
    }

    #[test]
    fn test_confidence_boundaries() {
        assert_eq!(Confidence::from_score(0), Confidence::Low);
        assert_eq!(Confidence::from_score(1), Confidence::Low);
        assert_eq!(Confidence::from_score(2), Confidence::Medium);
        assert_eq!(Confidence::from_score(3), Confidence::High);
        assert_eq!(Confidence::from_score(7), Confidence::High);
    }

    #[test]
    fn test_medium_example() {
        let templates = vec![template("abd", &["leber", "niere", "milz"])];
        let ranked = rank_templates(&templates, "Leber und Niere unauffällig");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 2);
        assert_eq!(ranked[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_repeated_keyword_counts_once() {
        let t = template("abd", &["leber"]);
        assert_eq!(score_template(&t, "Leber, Leber und nochmals LEBER"), 1);
    }

    #[test]
    fn test_substring_not_whole_word() {
        let t = template("abd", &["niere"]);
        assert_eq!(score_template(&t, "Beide Nieren normal"), 1);
    }

    #[test]
    fn test_zero_scores_are_excluded() {
        let templates = vec![template("knie", &["meniskus"]), template("leer", &[])];
        assert!(rank_templates(&templates, "Leber unauffällig").is_empty());
        assert!(rank_templates(&templates, "").is_empty());
    }

    #[test]
    fn test_blank_and_duplicate_keywords() {
        let t = template("abd", &["", "  ", "Leber", "leber"]);
        assert_eq!(score_template(&t, "leber"), 1);
        assert_eq!(score_template(&t, "milz"), 0);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let templates = vec![
            template("a", &["leber"]),
            template("b", &["leber", "milz", "niere"]),
            template("c", &["milz"]),
        ];
        let ranked = rank_templates(&templates, "Leber und Milz und Niere");
        let ids: Vec<&str> = ranked.iter().map(|s| s.template.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(ranked[0].confidence, Confidence::High);
        assert_eq!(ranked[1].confidence, Confidence::Low);
    }

    #[test]
    fn test_confidence_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Confidence::Medium).unwrap(), "\"medium\"");
    }

    proptest! {
        #[test]
        fn prop_new_keyword_occurrence_adds_exactly_one(
            repeats in 1usize..5,
            base in "[xyz ]{0,20}",
        ) {
            let t = template("abd", &["leber", "milz", "niere"]);
            let before = score_template(&t, &base);
            let with_keyword = format!("{} {}", base, "Milz ".repeat(repeats));
            prop_assert_eq!(score_template(&t, &with_keyword), before + 1);
        }
    }
}
