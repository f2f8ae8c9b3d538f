//! Token-level highlight diff between a template baseline and revised text.
//!
//! Both texts are split into words, whitespace runs and sentence punctuation, aligned
//! with a longest-common-subsequence table, and the revised text is emitted as a run
//! of segments flagged as either carried over or newly inserted. Tokens that only
//! exist in the baseline are dropped: the output is the revised text with its
//! insertions marked, never a two-sided diff.
//!
//! The table is O(m·n) in token counts. Reports stay in the low hundreds of tokens.

use serde::{Deserialize, Serialize};

use crate::html::{escape_html, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN, LINE_BREAK};

/// A run of revised text, either unchanged or inserted relative to the baseline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSegment {
    pub text: String,
    pub is_highlight: bool,
}

impl DiffSegment {
    fn new(text: impl Into<String>, is_highlight: bool) -> Self {
        Self {
            text: text.into(),
            is_highlight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenOp<'a> {
    Common(&'a str),
    Added(&'a str),
    Removed,
}

fn is_separator_punct(c: char) -> bool {
    matches!(c, '.' | ',' | ';' | ':' | '!' | '?')
}

/// Split into words, whitespace runs and single punctuation marks.
///
/// Concatenating the tokens gives back the input.
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() {
            if start < i {
                tokens.push(&text[start..i]);
            }
            let mut end = i + c.len_utf8();
            while let Some(&(j, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                end = j + next.len_utf8();
                chars.next();
            }
            tokens.push(&text[i..end]);
            start = end;
        } else if is_separator_punct(c) {
            if start < i {
                tokens.push(&text[start..i]);
            }
            let end = i + c.len_utf8();
            tokens.push(&text[i..end]);
            start = end;
        }
    }

    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// LCS length table: `table[i][j]` is the LCS of `a[..i]` and `b[..j]`
fn lcs_table(a: &[&str], b: &[&str]) -> Vec<Vec<u32>> {
    let mut table = vec![vec![0u32; b.len() + 1]; a.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }
    table
}

/// Walk the table back from the final cell. On ties the revised side moves first,
/// so matches attach to the earliest possible revised tokens.
fn backtrack<'a>(baseline: &[&'a str], revised: &[&'a str], table: &[Vec<u32>]) -> Vec<TokenOp<'a>> {
    let mut ops = Vec::with_capacity(baseline.len().max(revised.len()));
    let (mut i, mut j) = (baseline.len(), revised.len());

    while i > 0 || j > 0 {
        if i > 0 && j > 0 && baseline[i - 1] == revised[j - 1] {
            ops.push(TokenOp::Common(revised[j - 1]));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            ops.push(TokenOp::Added(revised[j - 1]));
            j -= 1;
        } else {
            ops.push(TokenOp::Removed);
            i -= 1;
        }
    }

    ops.reverse();
    ops
}

/// Diff `revised` against `baseline`.
///
/// Segments concatenate back to `revised`; no segment is empty and neighbours always
/// differ in `is_highlight`. An empty side means there is nothing to compare, so the
/// revised text comes back as one plain segment (or no segment when it is empty).
pub fn diff_segments(baseline: &str, revised: &str) -> Vec<DiffSegment> {
    if revised.is_empty() {
        return Vec::new();
    }
    if baseline.is_empty() {
        return vec![DiffSegment::new(revised, false)];
    }

    let baseline_tokens = tokenize(baseline);
    let revised_tokens = tokenize(revised);
    let table = lcs_table(&baseline_tokens, &revised_tokens);

    let mut segments: Vec<DiffSegment> = Vec::new();
    for op in backtrack(&baseline_tokens, &revised_tokens, &table) {
        let (token, highlight) = match op {
            TokenOp::Common(t) => (t, false),
            TokenOp::Added(t) => (t, true),
            TokenOp::Removed => continue,
        };
        match segments.last_mut() {
            Some(last) if last.is_highlight == highlight => last.text.push_str(token),
            _ => segments.push(DiffSegment::new(token, highlight)),
        }
    }
    segments
}

/// Render segments as escaped markup with inserted runs wrapped in highlight marks
pub fn render_segments(segments: &[DiffSegment]) -> String {
    let mut html = String::new();
    for segment in segments {
        let escaped = escape_html(&segment.text).replace('\n', LINE_BREAK);
        if segment.is_highlight {
            html.push_str(HIGHLIGHT_OPEN);
            html.push_str(&escaped);
            html.push_str(HIGHLIGHT_CLOSE);
        } else {
            html.push_str(&escaped);
        }
    }
    html
}

/// Diff and render in one step
pub fn highlight_differences(baseline: &str, revised: &str) -> String {
    render_segments(&diff_segments(baseline, revised))
}
