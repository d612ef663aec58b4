// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The download worker loop.
//!
//! Runs on its own OS thread with a single-threaded tokio runtime, so at most
//! one fetch is in flight at any time. Tasks are taken in FIFO order.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::queue::{RequestQueue, TaskReceiver};
use super::types::{Delivery, DownloadTask, SlotIdentity, StateCell, WorkerCounters, WorkerMessage, WorkerState};
use crate::decode::decode_thumbnail;
use crate::fetch::Fetcher;

pub(crate) struct DownloadWorker<K, F> {
    pub(crate) queue: Arc<RequestQueue<K>>,
    pub(crate) fetcher: F,
    pub(crate) task_rx: TaskReceiver<K>,
    pub(crate) delivery_tx: mpsc::UnboundedSender<Delivery<K>>,
    pub(crate) state: Arc<StateCell>,
    pub(crate) counters: Arc<WorkerCounters>,
    pub(crate) max_edge: Option<u32>,
}

impl<K: SlotIdentity, F: Fetcher> DownloadWorker<K, F> {
    /// Process tasks until a shutdown message arrives or every sender is gone.
    pub(crate) async fn run(mut self) {
        tracing::info!("Thumbnail worker started");

        while let Some(message) = self.task_rx.recv().await {
            match message {
                WorkerMessage::Download(task) => self.handle_task(task).await,
                WorkerMessage::Shutdown => break,
            }
        }

        self.state.advance(WorkerState::Stopped);
        tracing::info!("Thumbnail worker stopped");
    }

    async fn handle_task(&self, task: DownloadTask<K>) {
        if !self.state.get().is_running() {
            tracing::trace!(key = ?task.key, "Worker quitting, dropping task");
            return;
        }

        if !self.queue.is_current(&task.key, task.ticket) {
            WorkerCounters::bump(&self.counters.superseded);
            tracing::trace!(key = ?task.key, url = %task.url, "Task superseded before fetch");
            return;
        }

        tracing::debug!(key = ?task.key, url = %task.url, "Fetching thumbnail");
        let bytes = match self.fetcher.fetch_bytes(&task.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                WorkerCounters::bump(&self.counters.failed);
                tracing::warn!(key = ?task.key, error = %e, "Error downloading image");
                return;
            }
        };

        let image = match decode_thumbnail(&bytes, self.max_edge) {
            Ok(image) => image,
            Err(e) => {
                WorkerCounters::bump(&self.counters.failed);
                tracing::warn!(key = ?task.key, url = %task.url, error = %e, "Error decoding image");
                return;
            }
        };
        WorkerCounters::bump(&self.counters.fetched);

        // The fetch may have taken arbitrarily long; the slot may have been
        // rebound or cleared in the meantime.
        if !self.state.get().is_running() || !self.queue.is_current(&task.key, task.ticket) {
            WorkerCounters::bump(&self.counters.stale);
            tracing::debug!(key = ?task.key, url = %task.url, "Discarding stale thumbnail");
            return;
        }

        let (width, height) = image.dimensions();
        tracing::debug!(key = ?task.key, width, height, "Image decoded, posting delivery");

        let delivery = Delivery {
            key: task.key,
            url: task.url,
            image,
            ticket: task.ticket,
        };
        if self.delivery_tx.send(delivery).is_err() {
            tracing::debug!("Producer is gone, delivery dropped");
        }
    }
}
