//! Streaming recursive search.
//!
//! Walks a tree below `root`, testing every file and directory name against
//! the residual query and the structured predicates, and reports matches as
//! they are found.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::filter::{matches_all, FileMetadataView, Predicate};

/// A progress event is emitted every this many scanned entries.
pub const PROGRESS_INTERVAL: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub root: PathBuf,
    /// Name substring; empty matches every name
    pub query: String,
    pub include_hidden: bool,
    pub case_sensitive: bool,
    pub recursive: bool,
    pub filters: Vec<Predicate>,
}

impl SearchRequest {
    pub fn new(root: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        SearchRequest {
            root: root.into(),
            query: query.into(),
            include_hidden: false,
            case_sensitive: false,
            recursive: true,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Predicate>) -> Self {
        self.filters = filters;
        self
    }
}

/// Events emitted by a search, in emission order. `Finished` is always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEvent {
    Found { path: PathBuf },
    Progress { scanned: usize },
    Error { message: String },
    Finished,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Run a search to completion on the current thread.
///
/// Returns the number of entries scanned. A missing root produces a single
/// `Error` event followed by `Finished`. Cancellation stops the walk and
/// still ends with `Finished`.
pub fn run_search(
    request: &SearchRequest,
    cancel: &CancellationToken,
    emit: &mut dyn FnMut(SearchEvent),
) -> usize {
    if !request.root.exists() {
        let err = EngineError::SearchRootNotFound {
            path: request.root.clone(),
        };
        tracing::warn!("{}", err);
        emit(SearchEvent::Error {
            message: err.to_string(),
        });
        emit(SearchEvent::Finished);
        return 0;
    }

    let needle = if request.case_sensitive {
        request.query.clone()
    } else {
        request.query.to_lowercase()
    };

    let mut walker = WalkDir::new(&request.root).min_depth(1).follow_links(false);
    if !request.recursive {
        walker = walker.max_depth(1);
    }
    let include_hidden = request.include_hidden;
    let entries = walker
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e));

    let mut scanned = 0usize;
    let mut found = 0usize;
    for entry in entries {
        if cancel.is_cancelled() {
            tracing::debug!(scanned, "Search cancelled");
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        scanned += 1;
        if name_matches(entry.file_name().to_string_lossy().as_ref(), &needle, request.case_sensitive)
            && filters_match(entry.path(), &request.filters)
        {
            found += 1;
            emit(SearchEvent::Found {
                path: entry.path().to_path_buf(),
            });
        }
        if scanned % PROGRESS_INTERVAL == 0 {
            emit(SearchEvent::Progress { scanned });
        }
    }

    tracing::info!(root = %request.root.display(), scanned, found, "Search finished");
    emit(SearchEvent::Finished);
    scanned
}

fn name_matches(name: &str, needle: &str, case_sensitive: bool) -> bool {
    if needle.is_empty() {
        return true;
    }
    if case_sensitive {
        name.contains(needle)
    } else {
        name.to_lowercase().contains(needle)
    }
}

fn filters_match(path: &Path, filters: &[Predicate]) -> bool {
    if filters.is_empty() {
        return true;
    }
    match FileMetadataView::from_path(path) {
        Ok(file) => matches_all(filters, &file),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Comparison;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("docs/reports")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("Report-2024.pdf"), vec![0u8; 4096]).unwrap();
        fs::write(root.join("docs/report-draft.txt"), b"draft").unwrap();
        fs::write(root.join("docs/reports/summary.pdf"), b"tiny").unwrap();
        fs::write(root.join(".cache/report.tmp"), b"hidden").unwrap();
        fs::write(root.join(".report-hidden"), b"hidden").unwrap();
        temp_dir
    }

    fn collect(request: &SearchRequest) -> Vec<SearchEvent> {
        let mut events = Vec::new();
        run_search(request, &CancellationToken::new(), &mut |e| events.push(e));
        events
    }

    fn found_names(events: &[SearchEvent]) -> Vec<String> {
        let mut names: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::Found { path } => {
                    Some(path.file_name().unwrap().to_string_lossy().into_owned())
                }
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_case_insensitive_name_search() {
        let dir = tree();
        let events = collect(&SearchRequest::new(dir.path(), "REPORT"));

        assert_eq!(
            found_names(&events),
            vec!["Report-2024.pdf", "report-draft.txt", "reports"]
        );
        assert_eq!(events.last(), Some(&SearchEvent::Finished));
    }

    #[test]
    fn test_hidden_and_case_sensitive() {
        let dir = tree();
        let mut request = SearchRequest::new(dir.path(), "report");
        request.include_hidden = true;
        request.case_sensitive = true;

        assert_eq!(
            found_names(&collect(&request)),
            vec![".report-hidden", "report-draft.txt", "report.tmp", "reports"]
        );
    }

    #[test]
    fn test_non_recursive_with_filters() {
        let dir = tree();
        let mut request = SearchRequest::new(dir.path(), "")
            .with_filters(vec![Predicate::Ext("pdf".to_string())]);
        request.recursive = false;
        assert_eq!(found_names(&collect(&request)), vec!["Report-2024.pdf"]);

        request.recursive = true;
        request.filters.push(Predicate::Size(Comparison::Lt, 100));
        assert_eq!(found_names(&collect(&request)), vec!["summary.pdf"]);
    }

    #[test]
    fn test_missing_root_reports_error_then_finished() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let events = collect(&SearchRequest::new(dir.path().join("nope"), "x"));

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SearchEvent::Error { message } if message.starts_with("Search root does not exist")));
        assert_eq!(events[1], SearchEvent::Finished);
    }

    #[test]
    fn test_progress_every_interval() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        for i in 0..450 {
            fs::write(dir.path().join(format!("f{}.dat", i)), b"").unwrap();
        }
        let events = collect(&SearchRequest::new(dir.path(), "no-such-name"));

        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::Progress { scanned } => Some(*scanned),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![200, 400]);
    }

    #[test]
    fn test_cancelled_search_still_finishes() {
        let dir = tree();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut events = Vec::new();
        let scanned = run_search(&SearchRequest::new(dir.path(), ""), &cancel, &mut |e| events.push(e));

        assert_eq!(scanned, 0);
        assert_eq!(events, vec![SearchEvent::Finished]);
    }
}
