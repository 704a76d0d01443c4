//! Engine settings, persisted as JSON.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checksums::ChecksumAlgorithm;
use crate::error::{EngineError, EngineResult};
use crate::oplog::OperationLog;
use crate::plan::{ConflictAction, PlanOptions};
use crate::trash::Trash;

const APP_DIR: &str = "ferry";
const CONFIG_FILE: &str = "config.json";

/// What to do when a transfer destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Ask per conflict
    #[default]
    Ask,
    Replace,
    Skip,
    Rename,
}

impl ConflictPolicy {
    /// The fixed action, or `None` when the user is asked.
    pub fn action(self) -> Option<ConflictAction> {
        match self {
            ConflictPolicy::Ask => None,
            ConflictPolicy::Replace => Some(ConflictAction::Replace),
            ConflictPolicy::Skip => Some(ConflictAction::Skip),
            ConflictPolicy::Rename => Some(ConflictAction::Rename),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Ask => write!(f, "ask"),
            ConflictPolicy::Replace => write!(f, "replace"),
            ConflictPolicy::Skip => write!(f, "skip"),
            ConflictPolicy::Rename => write!(f, "rename"),
        }
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ask" => Ok(ConflictPolicy::Ask),
            "replace" => Ok(ConflictPolicy::Replace),
            "skip" => Ok(ConflictPolicy::Skip),
            "rename" => Ok(ConflictPolicy::Rename),
            other => Err(format!(
                "Invalid conflict policy '{}'. Must be 'ask', 'replace', 'skip', or 'rename'",
                other
            )),
        }
    }
}

/// Settings shared by the engines and their callers. Every field has a
/// default, so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub conflict_default: ConflictPolicy,
    /// When false, an unresolved conflict replaces without asking
    pub confirm_overwrite: bool,
    pub preserve_metadata: bool,
    pub trash_write_info: bool,
    /// Trash location; the user's freedesktop trash when unset
    pub trash_dir: Option<PathBuf>,
    pub operation_log_path: PathBuf,
    pub operation_log_max_mb: u64,
    pub search_include_hidden: bool,
    pub verify_checksum: Option<ChecksumAlgorithm>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            conflict_default: ConflictPolicy::Ask,
            confirm_overwrite: true,
            preserve_metadata: true,
            trash_write_info: true,
            trash_dir: None,
            operation_log_path: OperationLog::default_path(),
            operation_log_max_mb: 5,
            search_include_hidden: false,
            verify_checksum: None,
        }
    }
}

impl EngineSettings {
    /// `<config dir>/ferry/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load settings from `path`.
    ///
    /// A missing file yields defaults. An unreadable or corrupt file is
    /// logged and also yields defaults, so a bad config never blocks a run.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}. Using defaults.", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<EngineSettings>(&content) {
            Ok(settings) => {
                tracing::debug!("Loaded config from {}", path.display());
                settings
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn load_default() -> Self {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, content).map_err(|e| EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            conflict_default: self.conflict_default.action(),
            confirm_overwrite: self.confirm_overwrite,
            preserve: self.preserve_metadata,
        }
    }

    pub fn operation_log(&self) -> OperationLog {
        OperationLog::new(&self.operation_log_path, self.operation_log_max_mb)
    }

    pub fn trash(&self) -> Option<Trash> {
        let trash = match &self.trash_dir {
            Some(dir) => Trash::new(dir),
            None => Trash::user_default()?,
        };
        Some(trash.with_write_info(self.trash_write_info))
    }
}
