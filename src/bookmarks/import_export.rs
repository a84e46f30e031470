//! Plain-text codec for sharing bookmarks between devices.
//!
//! The export blob is a space-joined list of bookmarked event ids. Import
//! accepts either fully qualified `<year>-<number>` ids or bare numbers,
//! which are qualified with the configured default year.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BARE_NUMBER: Regex = Regex::new(r"^\d+$").unwrap();
    static ref QUALIFIED_ID: Regex = Regex::new(r"^\d{4}-\d+$").unwrap();
}

/// Outcome of parsing an import blob.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedImport {
    pub event_ids: Vec<String>,
    pub ignored: usize,
}

pub fn parse_import(text: &str, default_year: u16) -> ParsedImport {
    let mut parsed = ParsedImport::default();
    for token in text.split_whitespace() {
        let mut matched = false;
        if BARE_NUMBER.is_match(token) {
            parsed.event_ids.push(format!("{}-{}", default_year, token));
            matched = true;
        }
        if QUALIFIED_ID.is_match(token) {
            parsed.event_ids.push(token.to_string());
            matched = true;
        }
        if !matched {
            parsed.ignored += 1;
        }
    }
    parsed
}

pub fn format_export<'a>(event_ids: impl IntoIterator<Item = &'a str>) -> String {
    event_ids.into_iter().collect::<Vec<_>>().join(" ")
}
