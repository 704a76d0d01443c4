//! Free-text query parsing.
//!
//! Turns `invoice ext:pdf size>10MB after:2024-01-01` into a residual name
//! query (`invoice`) plus typed predicates. Tokens that don't look like a
//! filter stay in the residual; filter tokens with a bad value produce a note
//! and are dropped.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{Comparison, Predicate};
use crate::units::{parse_datetime_on, parse_size};

/// Relational operators in matching order: two-character forms first.
const RELATIONAL_OPS: &[(&str, Comparison)] = &[
    (">=", Comparison::Gte),
    ("<=", Comparison::Lte),
    (">", Comparison::Gt),
    ("<", Comparison::Lt),
];

/// Result of parsing a free-text query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Free text left over after filter tokens were removed
    pub query: String,
    pub filters: Vec<Predicate>,
    /// Human-readable notes about tokens that could not be understood
    pub notes: Vec<String>,
}

enum Token {
    Filter(Predicate),
    Invalid(String),
    Text,
}

/// Parse a free-text query against today's local date.
pub fn parse_nl_query(text: &str) -> ParsedQuery {
    parse_nl_query_on(text, Local::now().date_naive())
}

/// Parse a free-text query, resolving `today`/`yesterday` against `today`.
pub fn parse_nl_query_on(text: &str, today: NaiveDate) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();
    let mut residual: Vec<String> = Vec::new();

    for token in tokenize(text) {
        match classify(&token, today) {
            Token::Filter(predicate) => parsed.filters.push(predicate),
            Token::Invalid(note) => parsed.notes.push(note),
            Token::Text => residual.push(token),
        }
    }

    parsed.query = residual.join(" ").trim().to_string();
    parsed
}

fn classify(token: &str, today: NaiveDate) -> Token {
    if let Some((key, value)) = token.split_once(':') {
        return classify_key_value(&key.to_lowercase(), value, today);
    }
    // An unknown key on the left keeps the scan going with the next operator.
    for (symbol, cmp) in RELATIONAL_OPS {
        if let Some((key, value)) = token.split_once(symbol) {
            match classify_relational(&key.trim().to_lowercase(), *cmp, value.trim(), today) {
                Token::Text => continue,
                classified => return classified,
            }
        }
    }
    Token::Text
}

fn classify_key_value(key: &str, value: &str, today: NaiveDate) -> Token {
    match key {
        "ext" | "type" if !value.is_empty() => {
            Token::Filter(Predicate::Ext(value.trim_start_matches('.').to_string()))
        }
        "name" if !value.is_empty() => Token::Filter(Predicate::Name(value.to_string())),
        "path" if !value.is_empty() => Token::Filter(Predicate::Path(value.to_string())),
        "before" | "after" => date_bound(key, value, today),
        "size" => match parse_size(value) {
            Some(bytes) => Token::Filter(Predicate::Size(Comparison::Eq, bytes)),
            None => Token::Invalid(format!("Invalid size: {}", value)),
        },
        _ => Token::Text,
    }
}

fn classify_relational(key: &str, cmp: Comparison, value: &str, today: NaiveDate) -> Token {
    match key {
        "size" => match parse_size(value) {
            Some(bytes) => Token::Filter(Predicate::Size(cmp, bytes)),
            None => Token::Invalid(format!("Invalid size: {}", value)),
        },
        // The keyword decides the direction; the operator only separates.
        "before" | "after" => date_bound(key, value, today),
        _ => Token::Text,
    }
}

fn date_bound(key: &str, value: &str, today: NaiveDate) -> Token {
    let cmp = if key == "before" {
        Comparison::Lt
    } else {
        Comparison::Gt
    };
    match parse_datetime_on(value, today) {
        Some(at) => Token::Filter(Predicate::Mtime(cmp, at)),
        None => Token::Invalid(format!("Invalid date: {}", value)),
    }
}

/// Split like a POSIX shell: whitespace separates, quotes group, backslash
/// escapes. An unbalanced quote or a trailing backslash falls back to plain
/// whitespace splitting.
pub fn tokenize(text: &str) -> Vec<String> {
    shell_words(text).unwrap_or_else(|| text.split_whitespace().map(str::to_string).collect())
}

fn shell_words(text: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        c => current.push(c),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            '\n' => {}
                            c @ ('"' | '\\' | '$' | '`') => current.push(c),
                            c => {
                                current.push('\\');
                                current.push(c);
                            }
                        },
                        c => current.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next()? {
                    '\n' => {}
                    c => current.push(c),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn midnight(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_filters_only_query() {
        let parsed = parse_nl_query_on("ext:pdf size>10MB", today());

        assert_eq!(parsed.query, "");
        assert!(parsed.notes.is_empty());
        assert_eq!(
            parsed.filters,
            vec![
                Predicate::Ext("pdf".to_string()),
                Predicate::Size(Comparison::Gt, 10_485_760),
            ]
        );
    }

    #[test]
    fn test_invalid_date_becomes_note() {
        let parsed = parse_nl_query_on("before:not-a-date", today());

        assert!(parsed.filters.is_empty());
        assert_eq!(parsed.query, "");
        assert_eq!(parsed.notes, vec!["Invalid date: not-a-date"]);
    }

    #[test]
    fn test_residual_text_kept_in_order() {
        let parsed = parse_nl_query_on("quarterly invoice type:.PDF report", today());

        assert_eq!(parsed.query, "quarterly invoice report");
        assert_eq!(parsed.filters, vec![Predicate::Ext("PDF".to_string())]);
    }

    #[test]
    fn test_relational_scan_skips_unknown_left_side() {
        let parsed = parse_nl_query_on("size<5>3 before<2024-01-01> x>y", today());

        assert!(parsed.filters.is_empty());
        assert_eq!(parsed.query, "x>y");
        assert_eq!(
            parsed.notes,
            vec!["Invalid size: 5>3", "Invalid date: 2024-01-01>"]
        );
    }

    #[test]
    fn test_date_keywords() {
        let parsed = parse_nl_query_on("after:yesterday before:2024/07/01 before>=today", today());

        assert_eq!(
            parsed.filters,
            vec![
                Predicate::Mtime(Comparison::Gt, midnight(2024, 6, 14)),
                Predicate::Mtime(Comparison::Lt, midnight(2024, 7, 1)),
                Predicate::Mtime(Comparison::Lt, midnight(2024, 6, 15)),
            ]
        );
    }

    #[test]
    fn test_size_forms() {
        let parsed = parse_nl_query_on("size:1.5KB size<=2GB size>lots", today());

        assert_eq!(
            parsed.filters,
            vec![
                Predicate::Size(Comparison::Eq, 1536),
                Predicate::Size(Comparison::Lte, 2 * 1024 * 1024 * 1024),
            ]
        );
        assert_eq!(parsed.notes, vec!["Invalid size: lots"]);
    }

    #[test]
    fn test_unknown_keys_and_empty_values_are_text() {
        let parsed = parse_nl_query_on("owner:bob ext: width>3 name:", today());

        assert!(parsed.filters.is_empty());
        assert_eq!(parsed.query, "owner:bob ext: width>3 name:");
    }

    #[test]
    fn test_quoted_values() {
        let parsed = parse_nl_query_on(r#"name:"annual report" 'two words'"#, today());

        assert_eq!(parsed.filters, vec![Predicate::Name("annual report".to_string())]);
        assert_eq!(parsed.query, "two words");
    }

    #[test]
    fn test_tokenize_falls_back_on_unbalanced_quote() {
        assert_eq!(tokenize(r#"say "hello world"#), vec!["say", "\"hello", "world"]);
        assert_eq!(tokenize(r#"a\ b "c\"d""#), vec!["a b", "c\"d"]);
        assert!(tokenize("   ").is_empty());
    }
}
