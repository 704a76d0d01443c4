//! Predicate evaluation against a snapshot of file metadata.

use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use super::Predicate;
use crate::units::{local_date, local_timestamp};

/// The metadata a predicate can look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadataView {
    pub name: String,
    /// Absolute path as text
    pub path: String,
    pub size: u64,
    /// Modification time, seconds since the epoch
    pub modified: i64,
}

impl FileMetadataView {
    /// Stat `path` (following symlinks) and capture what the filters need.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    pub fn from_metadata(path: &Path, metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| match t.duration_since(UNIX_EPOCH) {
                Ok(d) => i64::try_from(d.as_secs()).ok(),
                Err(e) => i64::try_from(e.duration().as_secs()).ok().map(|s| -s),
            })
            .unwrap_or(0);
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        FileMetadataView {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: absolute.to_string_lossy().into_owned(),
            size: metadata.len(),
            modified,
        }
    }

    /// Lowercased text after the last dot of the name, empty when there is none.
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        }
    }
}

impl Predicate {
    pub fn matches(&self, file: &FileMetadataView) -> bool {
        match self {
            Predicate::Ext(ext) => file.extension() == ext.trim_start_matches('.').to_lowercase(),
            Predicate::Name(text) => contains_ignore_case(&file.name, text),
            Predicate::Path(text) => contains_ignore_case(&file.path, text),
            Predicate::Size(cmp, bytes) => cmp.compare(file.size, *bytes),
            Predicate::Mtime(super::Comparison::Eq, at) => {
                local_date(file.modified) == Some(at.date())
            }
            Predicate::Mtime(cmp, at) => cmp.compare(file.modified, local_timestamp(*at)),
        }
    }
}

/// AND of all predicates; an empty list matches everything.
pub fn matches_all(predicates: &[Predicate], file: &FileMetadataView) -> bool {
    predicates.iter().all(|p| p.matches(file))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Comparison;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn view(name: &str, size: u64, modified: i64) -> FileMetadataView {
        FileMetadataView {
            name: name.to_string(),
            path: format!("/data/projects/{}", name),
            size,
            modified,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_extension_matching() {
        let pdf = view("Report.PDF", 10, 0);
        assert!(Predicate::Ext("pdf".to_string()).matches(&pdf));
        assert!(Predicate::Ext(".Pdf".to_string()).matches(&pdf));
        assert!(!Predicate::Ext("txt".to_string()).matches(&pdf));

        let bare = view("Makefile", 10, 0);
        assert!(Predicate::Ext(String::new()).matches(&bare));
        assert_eq!(view("archive.tar.gz", 1, 0).extension(), "gz");
    }

    #[test]
    fn test_name_and_path_contains() {
        let file = view("Quarterly-Invoice.pdf", 10, 0);
        assert!(Predicate::Name("invoice".to_string()).matches(&file));
        assert!(Predicate::Path("PROJECTS".to_string()).matches(&file));
        assert!(!Predicate::Name("projects".to_string()).matches(&file));
    }

    #[test]
    fn test_size_comparisons() {
        let file = view("a.bin", 2048, 0);
        assert!(Predicate::Size(Comparison::Gt, 1024).matches(&file));
        assert!(Predicate::Size(Comparison::Eq, 2048).matches(&file));
        assert!(Predicate::Size(Comparison::Lte, 2048).matches(&file));
        assert!(!Predicate::Size(Comparison::Lt, 2048).matches(&file));
    }

    #[test]
    fn test_mtime_comparisons() {
        let noon = local_timestamp(at(2024, 3, 10, 12));
        let file = view("a.txt", 1, noon);

        assert!(Predicate::Mtime(Comparison::Gt, at(2024, 3, 10, 0)).matches(&file));
        assert!(Predicate::Mtime(Comparison::Lt, at(2024, 3, 11, 0)).matches(&file));
        assert!(!Predicate::Mtime(Comparison::Gte, at(2024, 3, 11, 0)).matches(&file));
        // Equality compares calendar dates, not instants.
        assert!(Predicate::Mtime(Comparison::Eq, at(2024, 3, 10, 0)).matches(&file));
        assert!(!Predicate::Mtime(Comparison::Eq, at(2024, 3, 9, 0)).matches(&file));
    }

    #[test]
    fn test_empty_list_matches_everything() {
        assert!(matches_all(&[], &view("anything", 0, 0)));
    }

    #[test]
    fn test_from_path_reads_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("notes.md");
        fs::write(&path, b"12345").expect("Failed to write file");

        let file = FileMetadataView::from_path(&path).expect("Failed to stat");
        assert_eq!(file.name, "notes.md");
        assert_eq!(file.size, 5);
        assert!(file.path.ends_with("notes.md"));
        assert!(file.modified > 0);
    }

    fn predicate_strategy() -> impl Strategy<Value = Predicate> {
        prop_oneof![
            "[a-z]{0,3}".prop_map(Predicate::Ext),
            "[a-z]{0,2}".prop_map(Predicate::Name),
            (0u64..5000).prop_map(|n| Predicate::Size(Comparison::Gt, n)),
            (0u64..5000).prop_map(|n| Predicate::Size(Comparison::Lte, n)),
        ]
    }

    proptest! {
        #[test]
        fn prop_matches_all_is_conjunction(
            predicates in prop::collection::vec(predicate_strategy(), 0..6),
            name in "[a-z]{1,6}\\.[a-z]{1,3}",
            size in 0u64..5000,
        ) {
            let file = view(&name, size, 0);
            let expected = predicates.iter().all(|p| p.matches(&file));
            prop_assert_eq!(matches_all(&predicates, &file), expected);

            // Adding a predicate can only narrow the result.
            let mut extended = predicates.clone();
            extended.push(Predicate::Size(Comparison::Gt, size));
            prop_assert!(!matches_all(&extended, &file));
        }
    }
}
