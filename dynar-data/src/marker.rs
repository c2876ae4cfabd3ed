//! Attribute markers embedded in SQL text.
//!
//! A dynamic attribute is referenced in any query fragment as
//!
//! ```text
//! (! path !)            cast to CHAR
//! (! path|type !)       cast to `type`
//! ```
//!
//! `path` is an identifier optionally followed by `.segment` groups, e.g.
//! `(!price.retail|decimal(6,2)!)` or `(!sizes.0!)`. Whitespace is allowed
//! just inside the delimiters but not around `|`. A marker wrapped in a
//! backtick on both sides (left by identifier quoting) matches including
//! the backticks; with a backtick on one side only it stays literal text.
//!
//! Text that merely resembles a marker is left alone, it is never an error.

use regex::{CaptureMatches, Regex};
use std::ops::Range;
use std::sync::OnceLock;

/// Cast applied when a marker names no type, and to intermediate steps.
pub const DEFAULT_TYPE: &str = "CHAR";

const IDENT_START: &str = r"[A-Za-z_\x{7F}-\x{10FFFF}]";
const IDENT_CONT: &str = r"[A-Za-z0-9_\x{7F}-\x{10FFFF}]";
const SEGMENT: &str = r"[^.|!\s]+";

fn type_grammar() -> String {
    let len = r"(?:\(\d+\))?";
    [
        format!("binary{len}"),
        format!("char{len}"),
        format!("datetime{len}"),
        "date".to_string(),
        format!("time{len}"),
        r"decimal(?:\(\d+(?:,\d+)?\))?".to_string(),
        r"double(?:\(\d+,\d+\))?".to_string(),
        "integer".to_string(),
        "int".to_string(),
        "signed(?: integer| int)?".to_string(),
        "unsigned(?: integer| int)?".to_string(),
    ]
    .join("|")
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        let pattern = format!(
            r"(?i)(`)?\(!\s*({IDENT_START}{IDENT_CONT}*(?:\.{SEGMENT})*)(?:\|({types}))?\s*!\)",
            types = type_grammar(),
        );
        Regex::new(&pattern).expect("attribute marker pattern is valid")
    })
}

/// One marker found in a SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMarker<'a> {
    /// The full matched text, including backticks when both were present.
    pub text: &'a str,
    /// Byte range of `text` in the scanned SQL.
    pub range: Range<usize>,
    /// The dotted attribute path.
    pub path: &'a str,
    /// The requested type with modifiers, as written.
    pub sql_type: Option<&'a str>,
    /// Whether the marker was wrapped in backticks.
    pub quoted: bool,
}

impl<'a> AttributeMarker<'a> {
    pub fn segments(&self) -> impl Iterator<Item = &'a str> {
        self.path.split('.')
    }

    /// The requested type, upper-cased, or [`DEFAULT_TYPE`].
    pub fn cast_type(&self) -> String {
        self.sql_type
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| DEFAULT_TYPE.to_string())
    }
}

/// Iterator over the markers of a SQL string, in order of appearance.
///
/// Call [`markers`] again to restart.
pub struct Markers<'a> {
    sql: &'a str,
    captures: CaptureMatches<'static, 'a>,
    /// End of the last marker returned, closing backtick included.
    consumed: usize,
}

impl<'a> Iterator for Markers<'a> {
    type Item = AttributeMarker<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let caps = self.captures.next()?;
            let whole = caps.get(0)?;
            // A backtick that closed the previous marker cannot open this one.
            let opening = caps.get(1).is_some_and(|m| m.start() >= self.consumed);
            let start = if caps.get(1).is_some() && !opening {
                whole.start() + 1
            } else {
                whole.start()
            };
            let closing = self.sql.as_bytes().get(whole.end()) == Some(&b'`');
            if opening != closing {
                continue;
            }
            let end = if closing { whole.end() + 1 } else { whole.end() };
            self.consumed = end;
            return Some(AttributeMarker {
                text: &self.sql[start..end],
                range: start..end,
                path: caps.get(2)?.as_str(),
                sql_type: caps.get(3).map(|m| m.as_str()),
                quoted: opening,
            });
        }
    }
}

/// Scan `sql` for attribute markers.
pub fn markers(sql: &str) -> Markers<'_> {
    Markers {
        sql,
        captures: marker_regex().captures_iter(sql),
        consumed: 0,
    }
}

/// Whether `text` is exactly one marker and nothing else.
pub fn is_marker(text: &str) -> bool {
    let mut found = markers(text);
    matches!(found.next(), Some(m) if m.range == (0..text.len())) && found.next().is_none()
}

/// Render a marker for `path` with an optional type.
pub fn marker(path: &str, sql_type: Option<&str>) -> String {
    match sql_type {
        Some(t) => format!("(!{path}|{t}!)"),
        None => format!("(!{path}!)"),
    }
}
