//! # Ferry Engine - File Manager Core
//!
//! A headless engine for the file-manager operations that need more than a
//! widget: transferring files with progress, filtering and searching trees,
//! and the trash. Designed as the foundation for multiple front ends (CLI,
//! desktop, automation).
//!
//! ## Overview
//!
//! - Copy/move transfers with same-filesystem renames, metadata
//!   preservation, per-item error isolation and cooperative cancellation
//! - Conflict planning (`replace`, `skip`, `rename`, or ask)
//! - A free-text query language (`ext:pdf size>10MB after:2024-01-01`) and a
//!   single predicate evaluator shared by search and view filtering
//! - Streaming recursive search
//! - Freedesktop-style trash with restore, and a JSONL operation log
//! - Progress reporting via callbacks or channels (decoupled from UI
//!   technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use ferry_engine::{
//!     plan_transfer, run_transfer, CancellationToken, Mode, PlanOptions, ReplaceAll,
//!     TransferOptions, TransferPlan,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Decide every conflict up front
//! let items = plan_transfer(
//!     &["/home/me/report.pdf", "/home/me/photos"],
//!     Path::new("/mnt/backup"),
//!     Mode::Copy,
//!     &PlanOptions::default(),
//!     &mut ReplaceAll,
//! );
//!
//! // Run the plan (no progress callback)
//! let mut plan = TransferPlan::new(items);
//! run_transfer(&mut plan, &TransferOptions::default(), &CancellationToken::new(), None)?;
//! println!("{} of {} items processed", plan.items_done, plan.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Transfer items, plans and per-item results
//! - **error**: Error types and handling
//! - **fs_ops**: Low-level filesystem operations
//! - **plan**: Conflict planning and collision naming
//! - **transfer**: The transfer run loop
//! - **progress**: Progress callback trait and channel adapter
//! - **checksums**: Optional post-copy verification
//! - **filter**: Query parsing, predicates, evaluation, view filtering
//! - **search**: Streaming recursive search
//! - **trash**: Trash, restore and `.trashinfo` records
//! - **oplog**: Operation log
//! - **config**: Engine settings
//! - **worker**: Background threads with event channels

pub mod cancel;
pub mod checksums;
pub mod config;
pub mod error;
pub mod filter;
pub mod fs_ops;
pub mod model;
pub mod oplog;
pub mod plan;
pub mod progress;
pub mod search;
pub mod transfer;
pub mod trash;
pub mod units;
pub mod worker;

// Re-export main types and functions
pub use cancel::CancellationToken;
pub use checksums::{compute_file_checksum, verify_copy, ChecksumAlgorithm};
pub use config::{ConflictPolicy, EngineSettings};
pub use error::{EngineError, EngineResult};
pub use filter::{
    matches_all, parse_nl_query, translate_query, validate_filters, Comparison, FileMetadataView,
    FilterError, FilterSpec, FilterTranslator, ParsedQuery, Predicate, Translation,
    TranslationSource, ViewFilter,
};
pub use fs_ops::size_for_path as folder_size;
pub use model::{ItemResult, Mode, RunState, TransferItem, TransferMethod, TransferPlan};
pub use oplog::{LogEntry, OperationLog};
pub use plan::{
    plan_transfer, resolve_collision, ConflictAction, ConflictChoice, ConflictResolver,
    PlanOptions, ReplaceAll,
};
pub use progress::{ChannelProgress, ProgressCallback, TransferEvent};
pub use search::{run_search, SearchEvent, SearchRequest};
pub use transfer::{run_transfer, TransferOptions};
pub use trash::{parse_trash_info, Trash, TrashInfo, TrashOutcome};
pub use worker::{
    spawn_folder_size, spawn_search, spawn_transfer, FolderSize, FolderSizeHandle, SearchHandle,
    TransferHandle, WorkerHandle,
};
