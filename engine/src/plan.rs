//! Transfer planning.
//!
//! Turns a selection of source paths and a target directory into an ordered
//! list of `TransferItem`s with every destination conflict already decided.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Mode, TransferItem};

/// What to do when a destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Remove the existing destination before transferring
    Replace,
    /// Leave the existing destination alone and drop the item
    Skip,
    /// Transfer under a fresh `name (n).ext`
    Rename,
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictAction::Replace => write!(f, "replace"),
            ConflictAction::Skip => write!(f, "skip"),
            ConflictAction::Rename => write!(f, "rename"),
        }
    }
}

/// An interactive answer to one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictChoice {
    pub action: ConflictAction,
    /// Reuse this action for every later conflict in the same plan
    pub apply_to_all: bool,
}

/// Asks the user about a conflict.
///
/// Returning `None` means the prompt was dismissed; that source is dropped.
pub trait ConflictResolver {
    fn resolve(&mut self, source: &Path, destination: &Path) -> Option<ConflictChoice>;
}

/// Resolver for callers that never prompt: every conflict is replaced.
pub struct ReplaceAll;

impl ConflictResolver for ReplaceAll {
    fn resolve(&mut self, _source: &Path, _destination: &Path) -> Option<ConflictChoice> {
        Some(ConflictChoice {
            action: ConflictAction::Replace,
            apply_to_all: true,
        })
    }
}

/// Planning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Fixed policy applied to every conflict; `None` means ask
    pub conflict_default: Option<ConflictAction>,
    /// Ask the resolver when there is no fixed policy; otherwise replace
    pub confirm_overwrite: bool,
    /// Value of `preserve` on every planned item
    pub preserve: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions {
            conflict_default: None,
            confirm_overwrite: true,
            preserve: true,
        }
    }
}

/// Build the ordered item list for transferring `sources` into `target_dir`.
///
/// Sources that no longer exist are dropped. A source whose destination is
/// the very same entry is skipped for moves and copied under a fresh name
/// for copies. Once an action is applied to all, later conflicts reuse it
/// without asking.
pub fn plan_transfer<P: AsRef<Path>>(
    sources: &[P],
    target_dir: &Path,
    mode: Mode,
    options: &PlanOptions,
    resolver: &mut dyn ConflictResolver,
) -> Vec<TransferItem> {
    let mut items = Vec::new();
    let mut apply_all: Option<ConflictAction> = None;

    for source in sources {
        let source = source.as_ref();
        if std::fs::symlink_metadata(source).is_err() {
            debug!(source = %source.display(), "source missing at planning time");
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        let mut destination = target_dir.join(name);

        if is_same_entry(source, &destination) {
            match mode {
                Mode::Copy => destination = resolve_collision(&destination),
                Mode::Move => continue,
            }
        }

        let mut replace = false;
        if exists(&destination) {
            let action = match apply_all {
                Some(action) => action,
                None => match (options.conflict_default, options.confirm_overwrite) {
                    (Some(action), _) => {
                        apply_all = Some(action);
                        action
                    }
                    (None, true) => match resolver.resolve(source, &destination) {
                        Some(choice) => {
                            if choice.apply_to_all {
                                apply_all = Some(choice.action);
                            }
                            choice.action
                        }
                        None => continue,
                    },
                    (None, false) => ConflictAction::Replace,
                },
            };

            match action {
                ConflictAction::Skip => continue,
                ConflictAction::Rename => destination = resolve_collision(&destination),
                ConflictAction::Replace => replace = true,
            }
        }

        items.push(
            TransferItem::new(source, destination, mode)
                .with_replace(replace)
                .with_preserve(options.preserve),
        );
    }

    items
}

/// First unused name among `path`, `stem (1).ext`, `stem (2).ext`, …
pub fn resolve_collision(path: &Path) -> PathBuf {
    if !exists(path) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u64;
    loop {
        let candidate = path.with_file_name(format!("{} ({}){}", stem, counter, suffix));
        if !exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

// Dangling symlinks count as existing entries.
fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

fn is_same_entry(source: &Path, destination: &Path) -> bool {
    match (std::fs::canonicalize(source), std::fs::canonicalize(destination)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
