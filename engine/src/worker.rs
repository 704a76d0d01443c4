//! Background workers.
//!
//! Each `spawn_*` function starts a plain thread and hands back a
//! `WorkerHandle`: a run id, the event stream, the cancellation token, and
//! the join handle carrying the worker's final value.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};
use serde::Serialize;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::fs_ops::size_for_path;
use crate::model::{TransferItem, TransferPlan};
use crate::progress::{ChannelProgress, TransferEvent};
use crate::search::{run_search, SearchEvent, SearchRequest};
use crate::transfer::{run_transfer, TransferOptions};

pub struct WorkerHandle<E, T> {
    pub id: Uuid,
    pub events: Receiver<E>,
    cancel: CancellationToken,
    join: JoinHandle<T>,
}

impl<E, T> WorkerHandle<E, T> {
    /// Ask the worker to stop. Safe to call any number of times.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker and take its final value.
    ///
    /// # Errors
    /// The panic payload if the worker thread panicked
    pub fn join(self) -> thread::Result<T> {
        self.join.join()
    }
}

/// Handle to a running transfer. The plan comes back from `join` with its
/// counters and timestamps filled in.
pub type TransferHandle = WorkerHandle<TransferEvent, TransferPlan>;

pub type SearchHandle = WorkerHandle<SearchEvent, usize>;

/// Result of a background folder-size computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderSize {
    pub path: PathBuf,
    pub bytes: u64,
    /// The sum is partial when the walk was cancelled
    pub cancelled: bool,
}

pub type FolderSizeHandle = WorkerHandle<FolderSize, u64>;

/// Run `items` on a worker thread.
pub fn spawn_transfer(items: Vec<TransferItem>, options: TransferOptions) -> TransferHandle {
    let mut plan = TransferPlan::new(items);
    let id = plan.id;
    let cancel = CancellationToken::new();
    let (tx, rx) = unbounded();

    let token = cancel.clone();
    let join = thread::spawn(move || {
        let progress = ChannelProgress::new(tx);
        if let Err(e) = run_transfer(&mut plan, &options, &token, Some(&progress)) {
            tracing::error!(run_id = %plan.id, "Transfer run failed: {}", e);
        }
        plan
    });

    WorkerHandle {
        id,
        events: rx,
        cancel,
        join,
    }
}

/// Run a search on a worker thread. The join value is the scanned count.
pub fn spawn_search(request: SearchRequest) -> SearchHandle {
    let cancel = CancellationToken::new();
    let (tx, rx) = unbounded();

    let token = cancel.clone();
    let join = thread::spawn(move || {
        run_search(&request, &token, &mut |event| {
            let _ = tx.send(event);
        })
    });

    WorkerHandle {
        id: Uuid::new_v4(),
        events: rx,
        cancel,
        join,
    }
}

/// Compute the recursive size of `path` on a worker thread. Exactly one
/// `FolderSize` event is sent.
pub fn spawn_folder_size(path: impl Into<PathBuf>) -> FolderSizeHandle {
    let path = path.into();
    let cancel = CancellationToken::new();
    let (tx, rx) = unbounded();

    let token = cancel.clone();
    let join = thread::spawn(move || {
        let bytes = size_for_path(&path, &token);
        let _ = tx.send(FolderSize {
            path,
            bytes,
            cancelled: token.is_cancelled(),
        });
        bytes
    });

    WorkerHandle {
        id: Uuid::new_v4(),
        events: rx,
        cancel,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, RunState};
    use std::fs;

    #[test]
    fn test_spawned_transfer_streams_events() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("a.txt");
        let dst = temp_dir.path().join("out/a.txt");
        fs::write(&src, vec![7u8; 1000]).unwrap();
        fs::create_dir_all(dst.parent().unwrap()).unwrap();

        let handle = spawn_transfer(
            vec![TransferItem::new(&src, &dst, Mode::Copy)],
            TransferOptions::default(),
        );
        let id = handle.id;
        let events: Vec<TransferEvent> = handle.events.iter().collect();
        let plan = handle.join().expect("Worker panicked");

        assert_eq!(plan.id, id);
        assert_eq!(plan.state, RunState::Completed);
        assert!(matches!(events.first(), Some(TransferEvent::Started { total_bytes: 1000, .. })));
        assert_eq!(events.last(), Some(&TransferEvent::Finished { run_id: id }));
        assert!(events.iter().any(|e| matches!(e, TransferEvent::ItemResult(r) if r.success)));
        assert_eq!(fs::read(&dst).unwrap().len(), 1000);
    }

    #[test]
    fn test_spawned_search_finishes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("match.txt"), b"x").unwrap();
        fs::write(temp_dir.path().join("other.bin"), b"y").unwrap();

        let handle = spawn_search(SearchRequest::new(temp_dir.path(), "match"));
        let events: Vec<SearchEvent> = handle.events.iter().collect();
        let scanned = handle.join().expect("Worker panicked");

        assert_eq!(scanned, 2);
        assert_eq!(
            events,
            vec![
                SearchEvent::Found {
                    path: temp_dir.path().join("match.txt")
                },
                SearchEvent::Finished,
            ]
        );
    }

    #[test]
    fn test_folder_size() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::create_dir_all(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("a"), vec![0u8; 100]).unwrap();
        fs::write(temp_dir.path().join("sub/b"), vec![0u8; 250]).unwrap();

        let handle = spawn_folder_size(temp_dir.path());
        let event = handle.events.recv().expect("No size event");
        assert_eq!(event.bytes, 350);
        assert!(!event.cancelled);
        assert_eq!(handle.join().expect("Worker panicked"), 350);
    }
}
