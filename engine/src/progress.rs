//! Progress reporting for transfer runs.
//!
//! `ProgressCallback` decouples the engine from whichever front end observes
//! it. `ChannelProgress` turns the callbacks into a stream of `TransferEvent`s
//! for consumers living on another thread.

use crossbeam_channel::Sender;
use serde::Serialize;
use uuid::Uuid;

use crate::model::{ItemResult, TransferItem, TransferPlan};

/// Trait for receiving progress updates from a transfer run.
///
/// All methods are called synchronously on the worker thread, in order.
/// `on_run_completed` fires exactly once per run, whether the run finished,
/// was cancelled, or had nothing to do.
pub trait ProgressCallback: Send {
    /// Called when execution starts, after the byte estimate is known.
    fn on_run_started(&self, _plan: &TransferPlan) {}

    /// Called when an item whose source exists is about to be processed.
    fn on_item_started(&self, plan: &TransferPlan, index: usize, item: &TransferItem);

    /// Called after each processed item with the overall percent (0-100)
    /// and a rate/ETA line such as `"12.3 MB/s - ETA 1m 4s"`.
    fn on_progress(&self, plan: &TransferPlan, percent: u8, meta: &str);

    /// Called once per processed item with its outcome.
    fn on_item_result(&self, plan: &TransferPlan, result: &ItemResult);

    /// Called when the run is over.
    fn on_run_completed(&self, plan: &TransferPlan);
}

/// Events emitted by a transfer run, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    Started {
        run_id: Uuid,
        total_items: usize,
        total_bytes: u64,
    },
    Current {
        name: String,
    },
    Progress {
        percent: u8,
        meta: String,
    },
    ItemResult(ItemResult),
    Finished {
        run_id: Uuid,
    },
}

/// A ProgressCallback implementation that forwards updates over a channel.
///
/// A disconnected receiver is ignored: the run keeps going.
pub struct ChannelProgress {
    sender: Sender<TransferEvent>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<TransferEvent>) -> Self {
        ChannelProgress { sender }
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_run_started(&self, plan: &TransferPlan) {
        let _ = self.sender.send(TransferEvent::Started {
            run_id: plan.id,
            total_items: plan.len(),
            total_bytes: plan.total_bytes,
        });
    }

    fn on_item_started(&self, _plan: &TransferPlan, _index: usize, item: &TransferItem) {
        let _ = self.sender.send(TransferEvent::Current {
            name: item.source_name(),
        });
    }

    fn on_progress(&self, _plan: &TransferPlan, percent: u8, meta: &str) {
        let _ = self.sender.send(TransferEvent::Progress {
            percent,
            meta: meta.to_string(),
        });
    }

    fn on_item_result(&self, _plan: &TransferPlan, result: &ItemResult) {
        let _ = self.sender.send(TransferEvent::ItemResult(result.clone()));
    }

    fn on_run_completed(&self, plan: &TransferPlan) {
        let _ = self.sender.send(TransferEvent::Finished { run_id: plan.id });
    }
}
