//! Display-side filtering of an already listed directory.

use std::path::{Path, PathBuf};

use super::{matches_all, FileMetadataView, FilterError, FilterSpec, Predicate};

/// Narrows a listing by a case-insensitive name substring plus structured
/// predicates.
///
/// Raw specs are converted when they are set. If any of them is rejected the
/// filter hides every row until it is replaced or cleared.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    text: String,
    predicates: Vec<Predicate>,
    rejected: Vec<FilterError>,
}

impl ViewFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_lowercase();
    }

    pub fn set_predicates(&mut self, predicates: Vec<Predicate>) {
        self.predicates = predicates;
        self.rejected.clear();
    }

    /// Convert and install raw specs. Returns the rejections, if any.
    pub fn set_specs(&mut self, specs: &[FilterSpec]) -> &[FilterError] {
        self.predicates.clear();
        self.rejected.clear();
        for spec in specs {
            match Predicate::try_from(spec) {
                Ok(predicate) => self.predicates.push(predicate),
                Err(e) => self.rejected.push(e),
            }
        }
        &self.rejected
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.predicates.clear();
        self.rejected.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.text.is_empty() || !self.predicates.is_empty() || !self.rejected.is_empty()
    }

    pub fn accepts(&self, file: &FileMetadataView) -> bool {
        if !self.rejected.is_empty() {
            return false;
        }
        if !self.text.is_empty() && !file.name.to_lowercase().contains(&self.text) {
            return false;
        }
        matches_all(&self.predicates, file)
    }

    /// Like `accepts`, but stats `path` first. Entries that cannot be
    /// stat'ed are hidden while predicates are active.
    pub fn accepts_path(&self, path: &Path) -> bool {
        if !self.rejected.is_empty() {
            return false;
        }
        if self.predicates.is_empty() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            return self.text.is_empty() || name.contains(&self.text);
        }
        match FileMetadataView::from_path(path) {
            Ok(file) => self.accepts(&file),
            Err(_) => false,
        }
    }

    /// Keep the accepted entries of a listing, in order.
    pub fn filter_paths<I, P>(&self, paths: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .filter(|p| self.accepts_path(p.as_ref()))
            .map(|p| p.as_ref().to_path_buf())
            .collect()
    }
}
