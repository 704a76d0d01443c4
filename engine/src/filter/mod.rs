//! Structured file filters.
//!
//! A filter is a list of predicates combined with AND; an empty list matches
//! everything. Predicates come from three places: the free-text query parser
//! (`parse`), raw field/op/value dicts edited by hand or produced by the AI
//! collaborator (`FilterSpec` + `validate_filters`), and the translator that
//! combines both (`translate`). All of them are evaluated by the single
//! matcher in `eval`, which the search worker and the view filter share.

pub mod eval;
pub mod parse;
pub mod translate;
pub mod view;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::units::{format_datetime, parse_datetime, parse_size_value};

pub use eval::{matches_all, FileMetadataView};
pub use parse::{parse_nl_query, ParsedQuery};
pub use translate::{translate_query, FilterTranslator, Translation, TranslationSource};
pub use view::ViewFilter;

/// Field names a filter may test.
pub const ALLOWED_FIELDS: &[&str] = &["ext", "name", "path", "size", "mtime"];

/// Operator spellings a filter may use.
pub const ALLOWED_OPS: &[&str] = &[
    "eq", "=", "contains", ">", ">=", "<", "<=", "gt", "gte", "lt", "lte",
];

/// Numeric comparison used by `size` and `mtime` predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// Accepts both the word and the symbol spelling.
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "eq" | "=" => Some(Comparison::Eq),
            "gt" | ">" => Some(Comparison::Gt),
            "gte" | ">=" => Some(Comparison::Gte),
            "lt" | "<" => Some(Comparison::Lt),
            "lte" | "<=" => Some(Comparison::Lte),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Gt => "gt",
            Comparison::Gte => "gte",
            Comparison::Lt => "lt",
            Comparison::Lte => "lte",
        }
    }

    pub fn compare<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Gt => left > right,
            Comparison::Gte => left >= right,
            Comparison::Lt => left < right,
            Comparison::Lte => left <= right,
        }
    }
}

/// One typed test against a file's metadata.
///
/// Serializes to and from the `{field, op, value}` dict form; deserializing
/// validates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "FilterSpec", try_from = "FilterSpec")]
pub enum Predicate {
    /// Extension equality (case-insensitive, without the dot)
    Ext(String),
    /// Case-insensitive substring of the file name
    Name(String),
    /// Case-insensitive substring of the absolute path
    Path(String),
    /// Size in bytes
    Size(Comparison, u64),
    /// Modification time against a local wall-clock bound
    Mtime(Comparison, NaiveDateTime),
}

impl Predicate {
    pub fn field(&self) -> &'static str {
        match self {
            Predicate::Ext(_) => "ext",
            Predicate::Name(_) => "name",
            Predicate::Path(_) => "path",
            Predicate::Size(..) => "size",
            Predicate::Mtime(..) => "mtime",
        }
    }

    pub fn to_spec(&self) -> FilterSpec {
        let (op, value) = match self {
            Predicate::Ext(ext) => ("eq", Value::from(ext.as_str())),
            Predicate::Name(text) | Predicate::Path(text) => ("contains", Value::from(text.as_str())),
            Predicate::Size(cmp, bytes) => (cmp.as_str(), Value::from(*bytes)),
            Predicate::Mtime(cmp, at) => (cmp.as_str(), Value::from(format_datetime(at))),
        };
        FilterSpec {
            field: self.field().to_string(),
            op: op.to_string(),
            value,
        }
    }
}

/// The raw `{field, op, value}` form of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

impl FilterSpec {
    pub fn new(field: &str, op: &str, value: impl Into<Value>) -> Self {
        FilterSpec {
            field: field.to_string(),
            op: op.to_string(),
            value: value.into(),
        }
    }
}

impl From<Predicate> for FilterSpec {
    fn from(predicate: Predicate) -> Self {
        predicate.to_spec()
    }
}

/// Why a raw filter was rejected. The message is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Unsupported field: {0}")]
    UnsupportedField(String),
    #[error("Unsupported op: {0}")]
    UnsupportedOp(String),
    #[error("Unsupported op for {field}: {op}")]
    IncompatibleOp { field: String, op: String },
    #[error("Invalid size: {0}")]
    InvalidSize(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

impl TryFrom<FilterSpec> for Predicate {
    type Error = FilterError;

    fn try_from(spec: FilterSpec) -> Result<Self, Self::Error> {
        Predicate::try_from(&spec)
    }
}

impl TryFrom<&FilterSpec> for Predicate {
    type Error = FilterError;

    fn try_from(spec: &FilterSpec) -> Result<Self, Self::Error> {
        let field = spec.field.to_lowercase();
        let op = spec.op.to_lowercase();
        if !ALLOWED_FIELDS.contains(&field.as_str()) {
            return Err(FilterError::UnsupportedField(field));
        }
        if !ALLOWED_OPS.contains(&op.as_str()) {
            return Err(FilterError::UnsupportedOp(op));
        }
        let incompatible = || FilterError::IncompatibleOp {
            field: field.clone(),
            op: op.clone(),
        };

        match field.as_str() {
            "ext" => match op.as_str() {
                "eq" | "=" => Ok(Predicate::Ext(
                    value_text(&spec.value).trim_start_matches('.').to_string(),
                )),
                _ => Err(incompatible()),
            },
            "name" | "path" => {
                if op != "contains" {
                    return Err(incompatible());
                }
                let text = value_text(&spec.value);
                Ok(if field == "name" {
                    Predicate::Name(text)
                } else {
                    Predicate::Path(text)
                })
            }
            "size" => {
                let cmp = Comparison::parse(&op).ok_or_else(incompatible)?;
                let bytes = parse_size_value(&spec.value)
                    .ok_or_else(|| FilterError::InvalidSize(value_text(&spec.value)))?;
                Ok(Predicate::Size(cmp, bytes))
            }
            _ => {
                let cmp = Comparison::parse(&op).ok_or_else(incompatible)?;
                let at = spec
                    .value
                    .as_str()
                    .and_then(parse_datetime)
                    .ok_or_else(|| FilterError::InvalidDate(value_text(&spec.value)))?;
                Ok(Predicate::Mtime(cmp, at))
            }
        }
    }
}

/// Re-check raw filters before they reach evaluation.
///
/// Returns the valid entries as typed predicates, plus one message per
/// rejected entry.
pub fn validate_filters(specs: &[FilterSpec]) -> (Vec<Predicate>, Vec<String>) {
    let mut valid = Vec::new();
    let mut errors = Vec::new();
    for spec in specs {
        match Predicate::try_from(spec) {
            Ok(predicate) => valid.push(predicate),
            Err(e) => errors.push(e.to_string()),
        }
    }
    (valid, errors)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_comparison_spellings() {
        assert_eq!(Comparison::parse(">="), Some(Comparison::Gte));
        assert_eq!(Comparison::parse("lte"), Some(Comparison::Lte));
        assert_eq!(Comparison::parse("contains"), None);
        assert!(Comparison::Gte.compare(5, 5));
        assert!(!Comparison::Gt.compare(5, 5));
        assert!(Comparison::Lt.compare(4, 5));
    }

    #[test]
    fn test_validate_filters_keeps_valid_entries() {
        let specs = vec![
            FilterSpec::new("EXT", "eq", ".PDF"),
            FilterSpec::new("size", ">", "10MB"),
            FilterSpec::new("size", "lte", 2048),
            FilterSpec::new("mtime", "gte", "2024-01-01"),
            FilterSpec::new("name", "contains", "report"),
        ];
        let (valid, errors) = validate_filters(&specs);

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(
            valid,
            vec![
                Predicate::Ext("PDF".to_string()),
                Predicate::Size(Comparison::Gt, 10 * 1024 * 1024),
                Predicate::Size(Comparison::Lte, 2048),
                Predicate::Mtime(
                    Comparison::Gte,
                    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
                ),
                Predicate::Name("report".to_string()),
            ]
        );
    }

    #[test]
    fn test_validate_filters_rejects_bad_entries() {
        let specs = vec![
            FilterSpec::new("owner", "eq", "root"),
            FilterSpec::new("size", "about", "1KB"),
            FilterSpec::new("size", "gt", "huge"),
            FilterSpec::new("mtime", "lt", "someday"),
            FilterSpec::new("name", "eq", "x"),
        ];
        let (valid, errors) = validate_filters(&specs);

        assert!(valid.is_empty());
        assert_eq!(
            errors,
            vec![
                "Unsupported field: owner",
                "Unsupported op: about",
                "Invalid size: huge",
                "Invalid date: someday",
                "Unsupported op for name: eq",
            ]
        );
    }

    #[test]
    fn test_predicate_serializes_as_dict() {
        let predicate = Predicate::Size(Comparison::Gt, 10_485_760);
        assert_eq!(
            serde_json::to_value(&predicate).unwrap(),
            json!({"field": "size", "op": "gt", "value": 10485760})
        );

        let parsed: Predicate =
            serde_json::from_value(json!({"field": "ext", "op": "=", "value": "pdf"})).unwrap();
        assert_eq!(parsed, Predicate::Ext("pdf".to_string()));

        let rejected = serde_json::from_value::<Predicate>(json!({"field": "colour", "op": "eq"}));
        assert!(rejected.is_err());
    }
}
