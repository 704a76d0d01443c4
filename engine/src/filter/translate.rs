//! Free text to filters, optionally refined by an external collaborator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{parse_nl_query, validate_filters, FilterSpec, ParsedQuery, Predicate};

/// Candidate filters proposed by a translator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatorResponse {
    pub filters: Vec<FilterSpec>,
    /// Replaces the local notes when present
    #[serde(default)]
    pub notes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TranslateError(pub String);

/// Something that can turn a query into filters, typically a remote model.
pub trait FilterTranslator {
    /// `Ok(None)` means the translator had nothing to add; the local parse
    /// stands.
    fn translate(
        &self,
        query: &str,
        local: &ParsedQuery,
    ) -> Result<Option<TranslatorResponse>, TranslateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationSource {
    Local,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub query: String,
    pub filters: Vec<Predicate>,
    pub notes: Vec<String>,
    pub source: TranslationSource,
    /// Translator failure, if one was consulted and failed
    pub error: Option<String>,
}

/// Parse `query` locally and let `translator`, when given, replace the
/// filters. Translator output goes through the same validation as
/// hand-written filters; rejected entries are reported in `notes`.
pub fn translate_query(query: &str, translator: Option<&dyn FilterTranslator>) -> Translation {
    let local = parse_nl_query(query);
    let mut translation = Translation {
        query: local.query.clone(),
        filters: local.filters.clone(),
        notes: local.notes.clone(),
        source: TranslationSource::Local,
        error: None,
    };

    let Some(translator) = translator else {
        return translation;
    };

    match translator.translate(query, &local) {
        Ok(Some(response)) => {
            let (filters, rejected) = validate_filters(&response.filters);
            if !rejected.is_empty() {
                tracing::debug!(?rejected, "Translator proposed invalid filters");
            }
            translation.filters = filters;
            if let Some(notes) = response.notes {
                translation.notes = notes;
            }
            translation.notes.extend(rejected);
            translation.source = TranslationSource::Ai;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Filter translation failed: {}", e);
            translation.error = Some(e.to_string());
        }
    }
    translation
}
