//! Transfer execution.
//!
//! `run_transfer` walks a `TransferPlan` item by item:
//! - items whose source vanished are skipped silently
//! - `replace` removes the existing destination first
//! - copies always stream bytes; moves rename on the same filesystem and
//!   fall back to copy-then-delete otherwise
//! - per-item failures are reported and the run continues
//! - cancellation is polled between items, directory entries and chunks
//!
//! Progress is byte-based when the plan will copy any bytes, item-based
//! otherwise (a plan made only of same-filesystem renames).

use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::checksums::{self, ChecksumAlgorithm};
use crate::error::{EngineError, EngineResult};
use crate::fs_ops;
use crate::model::{ItemResult, Mode, RunState, TransferItem, TransferMethod, TransferPlan};
use crate::progress::ProgressCallback;
use crate::units::{format_eta, format_rate};

const MIN_ELAPSED: Duration = Duration::from_millis(10);

/// Run-level knobs that are not part of an individual item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Hash source and destination of every byte-copied regular file
    pub verify: Option<ChecksumAlgorithm>,
    /// Move by copy-then-delete even when a rename would do
    pub copy_moves: bool,
}

impl TransferOptions {
    /// Whether `item` will be renamed in place rather than byte-copied.
    pub fn renames(&self, item: &TransferItem) -> bool {
        item.mode == Mode::Move
            && !self.copy_moves
            && fs_ops::same_filesystem(&item.source, &item.destination)
    }
}

/// Estimate the bytes that will go through the byte-copy path.
///
/// Copy items always count; move items count unless they will be renamed in
/// place on the same filesystem.
pub fn estimate_total_bytes(
    items: &[TransferItem],
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> u64 {
    items
        .iter()
        .filter(|item| !options.renames(item))
        .map(|item| fs_ops::size_for_path(&item.source, cancel))
        .sum()
}

/// Percent complete, clamped to 0-100.
pub fn compute_percent(bytes_done: u64, total_bytes: u64, items_done: usize, total_items: usize) -> u8 {
    let ratio = if total_bytes > 0 {
        bytes_done as f64 / total_bytes as f64
    } else if total_items > 0 {
        items_done as f64 / total_items as f64
    } else {
        1.0
    };
    (ratio * 100.0).clamp(0.0, 100.0) as u8
}

/// Rate and ETA line for the current state of a plan.
pub fn format_meta(plan: &TransferPlan, elapsed: Duration) -> String {
    let elapsed = elapsed.max(MIN_ELAPSED).as_secs_f64();
    if plan.total_bytes > 0 {
        let rate = plan.bytes_done as f64 / elapsed;
        let remaining = plan.total_bytes.saturating_sub(plan.bytes_done);
        let eta = if rate > 0.0 { (remaining as f64 / rate) as u64 } else { 0 };
        format!("{} - {}", format_rate(rate), format_eta(eta))
    } else {
        let rate = plan.items_done as f64 / elapsed;
        let remaining = plan.len().saturating_sub(plan.items_done);
        let eta = if rate > 0.0 { (remaining as f64 / rate) as u64 } else { 0 };
        format!("{:.1} items/s - {}", rate, format_eta(eta))
    }
}

/// Execute a transfer plan.
///
/// Transitions the plan from Pending to Running to Completed and invokes the
/// callback along the way. Item failures are reported through
/// `on_item_result` and never abort the run; cancellation ends it early but
/// is still reported as ordinary completion.
///
/// # Errors
/// Returns `EngineError::InvalidState` if the plan has already run. No other
/// error escapes.
pub fn run_transfer(
    plan: &mut TransferPlan,
    options: &TransferOptions,
    cancel: &CancellationToken,
    progress_callback: Option<&dyn ProgressCallback>,
) -> EngineResult<()> {
    if plan.state != RunState::Pending {
        return Err(EngineError::InvalidState {
            reason: format!(
                "Plan must be in Pending state to run; current state: {:?}",
                plan.state
            ),
        });
    }

    plan.state = RunState::Running;
    plan.start_time = Some(SystemTime::now());
    let started = Instant::now();
    plan.started = Some(started);

    if !plan.is_empty() {
        plan.total_bytes = estimate_total_bytes(&plan.items, options, cancel);
        info!(
            run_id = %plan.id,
            items = plan.len(),
            total_bytes = plan.total_bytes,
            "transfer started"
        );
        if let Some(callback) = progress_callback {
            callback.on_run_started(plan);
        }
    }

    for index in 0..plan.items.len() {
        if cancel.is_cancelled() {
            info!(run_id = %plan.id, index, "transfer cancelled");
            break;
        }

        let item = plan.items[index].clone();
        if std::fs::symlink_metadata(&item.source).is_err() {
            debug!(source = %item.source.display(), "source vanished, skipping");
            continue;
        }

        plan.current_index = Some(index);
        if let Some(callback) = progress_callback {
            callback.on_item_started(plan, index, &item);
        }

        let result = match execute_item(&item, options, cancel) {
            Ok((method, bytes)) => {
                plan.bytes_done += bytes;
                debug!(
                    source = %item.source.display(),
                    destination = %item.destination.display(),
                    ?method,
                    bytes,
                    "item done"
                );
                ItemResult::succeeded(&item, method)
            }
            Err(e) if e.is_cancelled() => {
                info!(run_id = %plan.id, index, "transfer cancelled mid-item");
                break;
            }
            Err(e) => {
                warn!(
                    source = %item.source.display(),
                    destination = %item.destination.display(),
                    error = %e,
                    "item failed"
                );
                ItemResult::failed(&item, e.to_string())
            }
        };
        plan.items_done = index + 1;

        if let Some(callback) = progress_callback {
            callback.on_item_result(plan, &result);
            let percent = compute_percent(plan.bytes_done, plan.total_bytes, plan.items_done, plan.len());
            let meta = format_meta(plan, started.elapsed());
            callback.on_progress(plan, percent, &meta);
        }
    }

    plan.state = RunState::Completed;
    plan.end_time = Some(SystemTime::now());
    plan.current_index = None;
    info!(run_id = %plan.id, bytes_done = plan.bytes_done, "transfer finished");

    if let Some(callback) = progress_callback {
        callback.on_run_completed(plan);
    }

    Ok(())
}

/// Carry out one item. Returns how it was done and the bytes copied.
fn execute_item(
    item: &TransferItem,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> EngineResult<(TransferMethod, u64)> {
    // Decided before `replace` clears the destination, like the estimate.
    let rename = options.renames(item);

    if item.replace {
        fs_ops::remove_existing(&item.destination)?;
    }

    if rename {
        std::fs::rename(&item.source, &item.destination).map_err(|e| EngineError::RenameFailed {
            from: item.source.clone(),
            to: item.destination.clone(),
            source: e,
        })?;
        return Ok((TransferMethod::Rename, 0));
    }

    let bytes = fs_ops::copy_item(&item.source, &item.destination, item.preserve, cancel)?;

    if let Some(algorithm) = options.verify {
        let is_regular_file = std::fs::symlink_metadata(&item.source)
            .map(|m| m.file_type().is_file())
            .unwrap_or(false);
        if is_regular_file {
            checksums::verify_copy(&item.source, &item.destination, algorithm, cancel)?;
        }
    }

    if item.mode == Mode::Move {
        fs_ops::remove_existing(&item.source)?;
    }

    Ok((TransferMethod::Copy, bytes))
}
