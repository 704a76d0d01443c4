//! Trash support over the freedesktop layout.
//!
//! Trashed entries live in `<trash>/files/<name>`; when info records are
//! enabled each gets a `<trash>/info/<name>.trashinfo` sidecar holding the
//! original location and deletion time, which is what makes restore work.

use std::borrow::Cow;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Local;
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult};
use crate::fs_ops::{move_path, remove_existing};
use crate::plan::resolve_collision;

/// Everything except unreserved characters and `/` gets escaped.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

const SECTION_HEADER: &str = "[Trash Info]";
const INFO_SUFFIX: &str = ".trashinfo";

/// Contents of a `.trashinfo` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashInfo {
    pub original_path: PathBuf,
    /// `%Y-%m-%dT%H:%M:%S`, local time
    pub deletion_date: String,
}

impl TrashInfo {
    pub fn new(original_path: impl Into<PathBuf>) -> Self {
        TrashInfo {
            original_path: original_path.into(),
            deletion_date: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}\nPath={}\nDeletionDate={}\n",
            SECTION_HEADER,
            percent_encode(&path_bytes(&self.original_path), PATH_ENCODE_SET),
            self.deletion_date
        )
    }

    /// Parse record text. Lines before the section header or without `=`
    /// are ignored; a record without `Path` is no record.
    pub fn parse(text: &str) -> Option<Self> {
        let mut original_path = None;
        let mut deletion_date = String::new();
        let mut in_section = false;

        for line in text.lines() {
            if line.trim() == SECTION_HEADER {
                in_section = true;
                continue;
            }
            if !in_section {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "Path" => original_path = Some(decode_path(value)),
                "DeletionDate" => deletion_date = value.to_string(),
                _ => {}
            }
        }

        original_path.map(|original_path| TrashInfo {
            original_path,
            deletion_date,
        })
    }
}

/// Read and parse a `.trashinfo` file. Unreadable files yield `None`.
pub fn parse_trash_info(path: &Path) -> Option<TrashInfo> {
    let text = fs::read_to_string(path).ok()?;
    TrashInfo::parse(&text)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Cow<'_, [u8]> {
    match path.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(unix)]
fn decode_path(value: &str) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(percent_decode_str(value).collect()))
}

#[cfg(not(unix))]
fn decode_path(value: &str) -> PathBuf {
    PathBuf::from(percent_decode_str(value).decode_utf8_lossy().into_owned())
}

/// Outcome of trashing or restoring one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrashOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: Option<String>,
}

impl TrashOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// A trash directory with `files/` and `info/` children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trash {
    files_dir: PathBuf,
    info_dir: PathBuf,
    write_info: bool,
}

impl Trash {
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Trash {
            files_dir: base.join("files"),
            info_dir: base.join("info"),
            write_info: true,
        }
    }

    /// The user's trash, `<data dir>/Trash`.
    pub fn user_default() -> Option<Self> {
        dirs::data_dir().map(|dir| Trash::new(dir.join("Trash")))
    }

    pub fn with_write_info(mut self, write_info: bool) -> Self {
        self.write_info = write_info;
        self
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn info_dir(&self) -> &Path {
        &self.info_dir
    }

    fn info_path(&self, name: &str) -> PathBuf {
        self.info_dir.join(format!("{}{}", name, INFO_SUFFIX))
    }

    /// First free name in `files/`: `name`, `name 1`, `name 2`, ...
    fn unique_name(&self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut counter = 1;
        while self.files_dir.join(&candidate).symlink_metadata().is_ok() {
            candidate = format!("{} {}", name, counter);
            counter += 1;
        }
        candidate
    }

    fn ensure_dirs(&self) -> EngineResult<()> {
        for dir in [&self.files_dir, &self.info_dir] {
            fs::create_dir_all(dir).map_err(|e| EngineError::DirectoryCreationFailed {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Move `paths` into the trash. Paths that don't exist are skipped.
    ///
    /// # Errors
    /// Only when the trash directories cannot be created; per-entry failures
    /// are reported in the outcomes.
    pub fn move_to_trash<P: AsRef<Path>>(&self, paths: &[P]) -> EngineResult<Vec<TrashOutcome>> {
        self.ensure_dirs()?;
        let cancel = CancellationToken::new();
        let mut outcomes = Vec::new();

        for path in paths {
            let source = path.as_ref();
            if source.symlink_metadata().is_err() {
                continue;
            }
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let original = std::path::absolute(source).unwrap_or_else(|_| source.to_path_buf());
            let name = self.unique_name(&file_name.to_string_lossy());
            let destination = self.files_dir.join(&name);

            let result = move_path(source, &destination, &cancel).and_then(|_| {
                if !self.write_info {
                    return Ok(());
                }
                let info_path = self.info_path(&name);
                fs::write(&info_path, TrashInfo::new(&original).render()).map_err(|e| {
                    EngineError::WriteError {
                        path: info_path,
                        source: e,
                    }
                })
            });

            if let Err(e) = &result {
                tracing::warn!("Failed to trash {}: {}", source.display(), e);
            } else {
                tracing::debug!("Trashed {} as {}", source.display(), name);
            }
            outcomes.push(TrashOutcome {
                source: source.to_path_buf(),
                destination,
                error: result.err().map(|e| e.to_string()),
            });
        }
        Ok(outcomes)
    }

    /// Move trashed entries, named as they appear in `files/`, back to where
    /// they came from. Entries without a readable record are skipped.
    ///
    /// # Errors
    /// `InvalidState` when info records are disabled.
    pub fn restore<S: AsRef<str>>(&self, names: &[S]) -> EngineResult<Vec<TrashOutcome>> {
        if !self.write_info {
            return Err(EngineError::InvalidState {
                reason: "Restore is disabled when trash info records are off".to_string(),
            });
        }
        let cancel = CancellationToken::new();
        let mut outcomes = Vec::new();

        for name in names {
            let name = name.as_ref();
            if !is_entry_name(name) {
                tracing::warn!("Not a trash entry name: {:?}, skipping", name);
                continue;
            }
            let source = self.files_dir.join(name);
            let info_path = self.info_path(name);
            let Some(info) = parse_trash_info(&info_path) else {
                tracing::warn!("No trash record for {}, skipping", name);
                continue;
            };

            let mut target = info.original_path;
            let result = Self::restore_one(&source, &info_path, &mut target, &cancel);
            if let Err(e) = &result {
                tracing::warn!("Failed to restore {}: {}", name, e);
            }
            outcomes.push(TrashOutcome {
                source,
                destination: target,
                error: result.err().map(|e| e.to_string()),
            });
        }
        Ok(outcomes)
    }

    fn restore_one(
        source: &Path,
        info_path: &Path,
        target: &mut PathBuf,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        *target = resolve_collision(target);
        move_path(source, target, cancel)?;
        remove_existing(info_path)
    }

    /// Delete everything in the trash. Returns the number of entries
    /// removed from `files/`.
    pub fn empty(&self) -> EngineResult<usize> {
        let mut removed = 0;
        for (dir, count) in [(&self.files_dir, true), (&self.info_dir, false)] {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(EngineError::ReadError {
                        path: dir.clone(),
                        source: e,
                    })
                }
            };
            for entry in entries {
                let entry = entry.map_err(|e| EngineError::ReadError {
                    path: dir.clone(),
                    source: e,
                })?;
                remove_existing(&entry.path())?;
                if count {
                    removed += 1;
                }
            }
        }
        tracing::info!(removed, "Trash emptied");
        Ok(removed)
    }
}

/// A single plain component, so joins stay inside `files/` and `info/`.
fn is_entry_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
}
