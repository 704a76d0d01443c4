//! Core data model for transfer runs.
//!
//! - TransferItem: one planned (source, destination) unit of work
//! - TransferPlan: the ordered items of one run plus its running totals
//! - ItemResult: the per-item outcome reported to observers
//! - Mode, RunState, TransferMethod: enums controlling and describing behavior

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Instant, SystemTime};
use uuid::Uuid;

/// One planned unit of work.
///
/// Built by the planning step and never modified once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    /// Absolute source path
    pub source: PathBuf,

    /// Absolute destination path
    pub destination: PathBuf,

    /// Copy or Move
    pub mode: Mode,

    /// Remove an existing destination before transferring
    pub replace: bool,

    /// Carry timestamps and permissions over to the destination
    pub preserve: bool,
}

impl TransferItem {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, mode: Mode) -> Self {
        TransferItem {
            source: source.into(),
            destination: destination.into(),
            mode,
            replace: false,
            preserve: true,
        }
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    /// Display name of the source (its final path component).
    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// An ordered transfer run and its derived state.
///
/// Items are processed strictly in the order given. The plan is owned by a
/// single run and discarded afterwards.
#[derive(Debug)]
pub struct TransferPlan {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Items in selection order
    pub items: Vec<TransferItem>,

    /// Current state (Pending, Running, Completed)
    pub state: RunState,

    /// Estimated bytes that will go through the byte-copy path
    pub total_bytes: u64,

    /// Bytes copied so far
    pub bytes_done: u64,

    /// Items processed so far (including skipped and failed ones)
    pub items_done: usize,

    /// Index of the item currently being processed
    pub current_index: Option<usize>,

    /// Monotonic start of execution, for rate and ETA
    pub started: Option<Instant>,

    /// Wall-clock start of execution
    pub start_time: Option<SystemTime>,

    /// Wall-clock end of execution
    pub end_time: Option<SystemTime>,
}

impl TransferPlan {
    pub fn new(items: Vec<TransferItem>) -> Self {
        TransferPlan {
            id: Uuid::new_v4(),
            items,
            state: RunState::Pending,
            total_bytes: 0,
            bytes_done: 0,
            items_done: 0,
            current_index: None,
            started: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// The operation mode for a transfer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Copy; source remains unchanged
    Copy,
    /// Move; rename on the same filesystem, copy then delete otherwise
    Move,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Copy => write!(f, "copy"),
            Mode::Move => write!(f, "move"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(Mode::Copy),
            "move" => Ok(Mode::Move),
            other => Err(format!("Invalid mode '{}'. Must be 'copy' or 'move'", other)),
        }
    }
}

/// The state of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created, not yet started
    Pending,
    /// Currently executing
    Running,
    /// Finished, cancelled or short-circuited; some items may have failed
    Completed,
}

/// How an item's bytes reached the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    /// Directory-entry rename on the same filesystem; no bytes copied
    Rename,
    /// Streamed byte copy
    Copy,
}

/// Outcome of one transfer item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: Mode,
    pub success: bool,
    /// Human-readable failure message
    pub error: Option<String>,
    /// How the item was carried out; `None` when it failed before any transfer
    pub method: Option<TransferMethod>,
}

impl ItemResult {
    pub(crate) fn succeeded(item: &TransferItem, method: TransferMethod) -> Self {
        ItemResult {
            source: item.source.clone(),
            destination: item.destination.clone(),
            mode: item.mode,
            success: true,
            error: None,
            method: Some(method),
        }
    }

    pub(crate) fn failed(item: &TransferItem, message: String) -> Self {
        ItemResult {
            source: item.source.clone(),
            destination: item.destination.clone(),
            mode: item.mode,
            success: false,
            error: Some(message),
            method: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parses_case_insensitively() {
        assert_eq!("COPY".parse::<Mode>(), Ok(Mode::Copy));
        assert_eq!("move".parse::<Mode>(), Ok(Mode::Move));
        assert!("link".parse::<Mode>().is_err());
    }

    #[test]
    fn test_item_defaults_preserve_without_replace() {
        let item = TransferItem::new("/a/f.txt", "/b/f.txt", Mode::Copy);
        assert!(item.preserve);
        assert!(!item.replace);
        assert_eq!(item.source_name(), "f.txt");
    }

    #[test]
    fn test_new_plan_is_pending() {
        let plan = TransferPlan::new(Vec::new());
        assert_eq!(plan.state, RunState::Pending);
        assert!(plan.is_empty());
        assert_eq!(plan.total_bytes, 0);
    }
}
