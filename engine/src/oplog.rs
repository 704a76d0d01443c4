//! Append-only JSONL log of user-visible file operations.
//!
//! Each line is one `LogEntry`. The log is best effort: write failures are
//! logged through `tracing` and otherwise ignored, and unreadable lines are
//! skipped when reading back.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{ItemResult, Mode};

const DEFAULT_MAX_MB: u64 = 5;

/// One logged operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// UTC, ISO 8601 without offset
    pub timestamp: String,
    pub action: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default)]
    pub success: bool,
    /// Empty when the operation succeeded
    #[serde(default)]
    pub error: String,
}

impl LogEntry {
    pub fn new(action: &str, sources: Vec<String>, destinations: Vec<String>) -> Self {
        LogEntry {
            timestamp: Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            action: action.to_string(),
            sources,
            destinations,
            success: true,
            error: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationLog {
    path: PathBuf,
    /// Size cap in MiB; 0 disables trimming
    max_mb: u64,
}

impl OperationLog {
    pub fn new(path: impl Into<PathBuf>, max_mb: u64) -> Self {
        OperationLog {
            path: path.into(),
            max_mb,
        }
    }

    /// `<cache dir>/ferry/logs/operation_log.jsonl`
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("ferry")
            .join("logs")
            .join("operation_log.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<S, D>(&self, action: &str, sources: S, destinations: D, success: bool, error: &str)
    where
        S: IntoIterator,
        S::Item: AsRef<Path>,
        D: IntoIterator,
        D::Item: AsRef<Path>,
    {
        let mut entry = LogEntry::new(action, path_strings(sources), path_strings(destinations));
        entry.success = success;
        entry.error = error.to_string();
        self.append_entry(&entry);
    }

    /// Log one transfer item under `copy` or `move`.
    pub fn record_item(&self, result: &ItemResult) {
        let action = match result.mode {
            Mode::Copy => "copy",
            Mode::Move => "move",
        };
        self.append(
            action,
            [&result.source],
            [&result.destination],
            result.success,
            result.error.as_deref().unwrap_or(""),
        );
    }

    pub fn append_entry(&self, entry: &LogEntry) {
        if let Err(e) = self.write_entry(entry) {
            tracing::warn!("Failed to write operation log {}: {}", self.path.display(), e);
        }
    }

    fn write_entry(&self, entry: &LogEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        drop(file);
        self.enforce_max_size()
    }

    /// Logged entries, oldest first. With a non-zero `limit` only the last
    /// `limit` entries are returned.
    pub fn entries(&self, limit: Option<usize>) -> Vec<LogEntry> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(_) => return Vec::new(),
        };
        let mut entries: Vec<LogEntry> = BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line.trim()).ok())
            .collect();

        if let Some(limit) = limit.filter(|l| *l > 0) {
            let start = entries.len().saturating_sub(limit);
            entries.drain(..start);
        }
        entries
    }

    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to clear operation log {}: {}", self.path.display(), e),
        }
    }

    /// Over the cap, keep the newer half of the entries.
    fn enforce_max_size(&self) -> std::io::Result<()> {
        if self.max_mb == 0 {
            return Ok(());
        }
        let size = fs::metadata(&self.path)?.len();
        if size <= self.max_mb.saturating_mul(1024 * 1024) {
            return Ok(());
        }
        let entries = self.entries(None);
        if entries.is_empty() {
            return Ok(());
        }
        let keep = &entries[entries.len() / 2..];
        let mut text = String::new();
        for entry in keep {
            text.push_str(&serde_json::to_string(entry)?);
            text.push('\n');
        }
        fs::write(&self.path, text)?;
        tracing::debug!(kept = keep.len(), "Trimmed operation log");
        Ok(())
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        OperationLog::new(Self::default_path(), DEFAULT_MAX_MB)
    }
}

fn path_strings<I>(paths: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .collect()
}
