//! Subject matching and body field parsing.
//!
//! Mail-in messages are typed by people in arbitrary mail clients, so the
//! grammar is deliberately forgiving:
//!
//! ```text
//! Subject: BLOG: Tech Talk
//!
//! EXCERPT: Notes from the meetup
//! DESCRIPTION:
//! Long text, possibly over
//! several lines.
//! TAGS: rust, email
//! ```
//!
//! Parsing is a two-pass tokenizer. The body is first normalized by two
//! named passes ([`collapse_label_whitespace`], [`break_before_labels`]) so
//! that every `LABEL:` starts its own paragraph, then [`segment`] splits the
//! normalized text into `(LABEL, value)` pairs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::registry::TypeDescriptor;

/// Field name that is always present in a [`FieldMap`].
pub const TITLE_FIELD: &str = "title";

/// `LABEL:` followed by any run of ASCII whitespace.
static LABEL_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z]+):[\t\n\x0B\x0C\r ]+").expect("Invalid label whitespace pattern")
});

/// A bare `LABEL:` token.
static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+):").expect("Invalid label pattern"));

/// Parsed field values keyed by lowercase field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, String>);

impl FieldMap {
    /// Create a field map holding only the title.
    pub fn with_title(title: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TITLE_FIELD.to_string(), title.into());
        Self(fields)
    }

    pub fn title(&self) -> &str {
        self.get(TITLE_FIELD).unwrap_or("")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Get a field, treating an absent field as empty.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// One `LABEL: value` pair found in a normalized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Label exactly as written (uppercase)
    pub label: String,
    /// Untrimmed value text
    pub value: String,
}

/// Match the subject line against a content type.
///
/// The pattern is the uppercased type name, repeated one or more times,
/// followed by a colon. Matching is case-sensitive and not anchored, so
/// `Fwd: BLOG: x` and `BLOGBLOG: x` both match `blog`. Returns the trimmed
/// remainder of the line as the title.
pub fn match_subject(subject: &str, type_name: &str) -> Option<String> {
    let label = regex::escape(&type_name.to_ascii_uppercase());
    let pattern = format!("({})+:(.*)", label);

    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!(type_name = %type_name, error = %e, "mailin_subject_pattern_invalid");
            return None;
        }
    };

    let captures = re.captures(subject)?;
    let title = captures.get(2).map(|m| m.as_str()).unwrap_or("");

    Some(trim_field(title).to_string())
}

/// First normalization pass: drop whitespace (including line breaks)
/// directly after a `LABEL:` token.
pub fn collapse_label_whitespace(body: &str) -> String {
    LABEL_WHITESPACE.replace_all(body, "${1}:").into_owned()
}

/// Second normalization pass: start a new paragraph before every `LABEL:`
/// and put a single space after the colon.
pub fn break_before_labels(body: &str) -> String {
    LABEL.replace_all(body, "\n\n${1}: ").into_owned()
}

/// Run both normalization passes.
pub fn normalize(body: &str) -> String {
    break_before_labels(&collapse_label_whitespace(body))
}

/// Split a normalized body into `(LABEL, value)` segments.
///
/// A value extends from its label to the first run of two or more newlines
/// that is not followed by an uppercase letter, or to the end of input. A
/// newline run directly followed by an uppercase letter still ends the value
/// if it is at least three newlines long, the last newline being left to the
/// next paragraph. Text that precedes the first label is ignored.
pub fn segment(body: &str) -> Vec<Segment> {
    let bytes = body.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;

    while let Some((label_start, colon)) = find_label(bytes, pos) {
        let value_start = colon + 1;
        let (value_end, next) = find_value_end(bytes, value_start);

        segments.push(Segment {
            label: body[label_start..colon].to_string(),
            value: body[value_start..value_end].to_string(),
        });

        pos = next;
    }

    segments
}

/// Parse a message for one content type.
///
/// Returns `None` when the subject does not invoke the type. Otherwise the
/// map holds the title plus every body field the type recognizes; later
/// occurrences of a label overwrite earlier ones.
pub fn parse(subject: &str, body: &str, descriptor: &TypeDescriptor) -> Option<FieldMap> {
    let title = match_subject(subject, descriptor.name())?;
    let mut fields = FieldMap::with_title(title);

    for segment in segment(&normalize(body)) {
        let label = segment.label.to_ascii_lowercase();
        if descriptor.recognizes(&label) {
            fields.insert(label, trim_field(&segment.value));
        } else {
            debug!(
                content_type = %descriptor.name(),
                label = %segment.label,
                "mailin_field_ignored"
            );
        }
    }

    debug!(
        content_type = %descriptor.name(),
        field_count = fields.len(),
        "mailin_fields_parsed"
    );

    Some(fields)
}

/// Trim the characters mail clients leave around values.
pub fn trim_field(value: &str) -> &str {
    value.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}

/// Find the next `LABEL:` at or after `from`. Returns the label start and
/// the colon position.
fn find_label(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;

    while i < bytes.len() {
        if !bytes[i].is_ascii_uppercase() {
            i += 1;
            continue;
        }

        let run_end = i + bytes[i..]
            .iter()
            .take_while(|b| b.is_ascii_uppercase())
            .count();

        if bytes.get(run_end) == Some(&b':') {
            return Some((i, run_end));
        }

        i = run_end;
    }

    None
}

/// Find where the value starting at `start` ends. Returns the value end and
/// the position scanning resumes from.
fn find_value_end(bytes: &[u8], start: usize) -> (usize, usize) {
    let len = bytes.len();

    for k in start..len {
        if let Some(resume) = paragraph_break_at(bytes, k) {
            return (k, resume);
        }
        // A single trailing newline counts as end of input
        if k + 1 == len && bytes[k] == b'\n' {
            return (k, k);
        }
    }

    (len, len)
}

/// Check for a value-terminating newline run at `k`.
fn paragraph_break_at(bytes: &[u8], k: usize) -> Option<usize> {
    let run = bytes[k..].iter().take_while(|&&b| b == b'\n').count();
    if run < 2 {
        return None;
    }

    match bytes.get(k + run) {
        Some(b) if b.is_ascii_uppercase() => (run >= 3).then_some(k + run - 1),
        _ => Some(k + run),
    }
}
