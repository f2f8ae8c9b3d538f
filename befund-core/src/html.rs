//! Escaping and the narrow markup allow-list used in rendered reports.
//!
//! Plain-text fields are escaped outright. The befund and beurteilung bodies may carry
//! exactly two constructs: a line break and a highlight wrapper with the fixed `hl`
//! class. Everything else coming from model output is escaped.

use regex::Regex;
use std::sync::LazyLock;

pub const LINE_BREAK: &str = "<br/>";
pub const HIGHLIGHT_OPEN: &str = "<mark class=\"hl\">";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

/// Escaped forms of the allowed tags, as produced by [`escape_html`]
static ESCAPED_ALLOWED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&lt;br\s*/?&gt;|&lt;mark class=&quot;hl&quot;&gt;|&lt;/mark&gt;").unwrap()
});

static BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_END_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</(p|div)>").unwrap());
static MARK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<mark\b[^>]*>|</mark\s*>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static SPACES_AROUND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").unwrap());

/// Escape the five HTML metacharacters
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape and turn newlines into line breaks
pub fn text_to_html(text: &str) -> String {
    escape_html(text).replace('\n', LINE_BREAK)
}

/// Escape everything except line breaks and `hl` highlight marks.
///
/// Highlight marks are rebalanced so the fragment is always well formed: a closing
/// tag without an open mark is dropped, a nested opening tag is dropped and an
/// unclosed mark is closed at the end.
pub fn sanitize_markup(text: &str) -> String {
    let escaped = text_to_html(text);
    let mut out = String::with_capacity(escaped.len());
    let mut mark_open = false;
    let mut last = 0;

    for m in ESCAPED_ALLOWED_TAG.find_iter(&escaped) {
        out.push_str(&escaped[last..m.start()]);
        last = m.end();

        let tag = m.as_str().to_ascii_lowercase();
        if tag.starts_with("&lt;br") {
            out.push_str(LINE_BREAK);
        } else if tag == "&lt;/mark&gt;" {
            if mark_open {
                out.push_str(HIGHLIGHT_CLOSE);
                mark_open = false;
            }
        } else if !mark_open {
            out.push_str(HIGHLIGHT_OPEN);
            mark_open = true;
        }
    }
    out.push_str(&escaped[last..]);

    if mark_open {
        out.push_str(HIGHLIGHT_CLOSE);
    }
    out
}

/// Wrap already-plain text in a highlight mark
pub fn highlight(text: &str) -> String {
    format!("{}{}{}", HIGHLIGHT_OPEN, escape_html(text), HIGHLIGHT_CLOSE)
}

/// Reverse of [`escape_html`] for the five entities it produces
pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Undo the two constructs model text may carry: line breaks become newlines and
/// highlight marks are dropped.
///
/// Any other `<` or `>` is ordinary text ("Lymphknoten <1 cm") and is kept for the
/// renderer to escape. Entities are left as they are.
pub fn strip_allowed_markup(text: &str) -> String {
    let text = BREAK_TAG.replace_all(text, "\n");
    MARK_TAG.replace_all(&text, "").into_owned()
}

/// Plain text for copying a rendered report out of the editor
pub fn html_to_plain_text(html: &str) -> String {
    let text = BREAK_TAG.replace_all(html, "\n");
    let text = BLOCK_END_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = SPACES_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}
