// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Producer-side handle of the thumbnail downloader.

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use super::queue::{RequestQueue, TaskReceiver};
use super::types::{Delivery, SlotIdentity, StateCell, WorkerCounters, WorkerState, WorkerStats};
use super::worker::DownloadWorker;
use crate::decode::DecodedImage;
use crate::error::ThumbnailError;
use crate::fetch::Fetcher;

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "ThumbnailDownloader";

/// Callback receiving a delivered thumbnail on the producer's thread.
pub type DeliveryCallback<K> = Box<dyn FnMut(K, DecodedImage)>;

/// Result of dispatching one posted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the delivery callback.
    Delivered,
    /// Superseded, cancelled, or the worker is no longer running.
    Discarded,
}

/// Owns the request queue and the worker thread for one consuming view.
///
/// Lives on the producer's thread: deliveries only reach the callback through
/// [`dispatch_pending`](Self::dispatch_pending) or
/// [`dispatch_next`](Self::dispatch_next), both called by the producer.
pub struct ThumbnailDownloader<K, F> {
    queue: Arc<RequestQueue<K>>,
    state: Arc<StateCell>,
    counters: Arc<WorkerCounters>,
    delivery_rx: mpsc::UnboundedReceiver<Delivery<K>>,
    callback: Option<DeliveryCallback<K>>,
    /// Parts handed to the worker thread on `start`.
    pending_worker: Option<DownloadWorker<K, F>>,
    handle: Option<JoinHandle<()>>,
}

impl<K: SlotIdentity, F: Fetcher> ThumbnailDownloader<K, F> {
    /// Create a downloader that fetches through `fetcher`.
    ///
    /// Requests may be queued before [`start`](Self::start); they are
    /// processed once the worker thread runs.
    pub fn new(fetcher: F) -> Self {
        Self::with_max_edge(fetcher, None)
    }

    /// Like [`new`](Self::new), downscaling decoded thumbnails to `max_edge`.
    pub fn with_max_edge(fetcher: F, max_edge: Option<u32>) -> Self {
        let (queue, task_rx): (RequestQueue<K>, TaskReceiver<K>) = RequestQueue::new();
        let queue = Arc::new(queue);
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let state = Arc::new(StateCell::new(WorkerState::Running));
        let counters = Arc::new(WorkerCounters::default());

        let worker = DownloadWorker {
            queue: queue.clone(),
            fetcher,
            task_rx,
            delivery_tx,
            state: state.clone(),
            counters: counters.clone(),
            max_edge,
        };

        Self {
            queue,
            state,
            counters,
            delivery_rx,
            callback: None,
            pending_worker: Some(worker),
            handle: None,
        }
    }

    /// Set the function that receives delivered thumbnails.
    pub fn set_delivery_callback(&mut self, callback: impl FnMut(K, DecodedImage) + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Spawn the worker thread.
    pub fn start(&mut self) -> Result<(), ThumbnailError> {
        if !self.state.get().is_running() {
            return Err(ThumbnailError::Stopped);
        }
        let worker = self.pending_worker.take().ok_or(ThumbnailError::AlreadyStarted)?;
        let state = self.state.clone();

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match runtime {
                    Ok(runtime) => runtime.block_on(worker.run()),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create worker runtime");
                        state.advance(WorkerState::Stopped);
                    }
                }
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Request a thumbnail for `key`.
    ///
    /// `None` or an empty URL cancels any pending request for `key`. Returns
    /// `true` if a download task was dispatched. Never blocks.
    pub fn enqueue(&self, key: K, url: Option<&str>) -> bool {
        if !self.state.get().is_running() {
            tracing::debug!(key = ?key, "Worker not running, ignoring enqueue");
            return false;
        }
        self.queue.enqueue(key, url)
    }

    /// Cancel the pending request for `key`.
    pub fn cancel(&self, key: &K) -> bool {
        self.queue.cancel(key)
    }

    /// Drop every pending request; nothing requested so far will be delivered.
    ///
    /// Call when the consuming view is torn down but the worker should live on.
    pub fn cancel_all(&self) {
        // Results already posted are rejected at dispatch by the cleared map.
        self.queue.cancel_all();
    }

    /// Currently requested URL for `key`.
    pub fn lookup(&self, key: &K) -> Option<String> {
        self.queue.lookup(key)
    }

    /// Shared request queue, for enqueueing from other producer threads.
    pub fn request_queue(&self) -> Arc<RequestQueue<K>> {
        self.queue.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }

    /// Hand every posted result to the callback. Never blocks.
    ///
    /// Returns the number of thumbnails delivered.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(delivery) = self.delivery_rx.try_recv() {
            if self.deliver(delivery) == DispatchOutcome::Delivered {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait for the next posted result and dispatch it.
    ///
    /// Returns `None` once the worker has exited and nothing is left.
    pub async fn dispatch_next(&mut self) -> Option<DispatchOutcome> {
        let delivery = self.delivery_rx.recv().await?;
        Some(self.deliver(delivery))
    }

    fn deliver(&mut self, delivery: Delivery<K>) -> DispatchOutcome {
        if !self.state.get().is_running() {
            tracing::trace!(key = ?delivery.key, "Worker quit, dropping delivery");
            return DispatchOutcome::Discarded;
        }

        // Compare and remove in one step: the request is satisfied.
        if self.queue.take_if_current(&delivery.key, delivery.ticket).is_none() {
            WorkerCounters::bump(&self.counters.stale);
            tracing::debug!(key = ?delivery.key, url = %delivery.url, "Discarding stale delivery");
            return DispatchOutcome::Discarded;
        }

        WorkerCounters::bump(&self.counters.delivered);
        match self.callback.as_mut() {
            Some(callback) => callback(delivery.key, delivery.image),
            None => tracing::debug!(key = ?delivery.key, "No delivery callback set"),
        }
        DispatchOutcome::Delivered
    }

    /// Stop the worker. Non-blocking and idempotent.
    ///
    /// In-flight fetches run to completion but are never delivered; queued
    /// tasks are dropped without fetching. The downloader cannot be restarted.
    pub fn stop(&mut self) {
        let previous = self.state.advance(WorkerState::Quitting);
        if previous.is_running() {
            tracing::info!("Stopping thumbnail worker");
        }
        if self.pending_worker.take().is_some() {
            // Never started: nothing will ever run the loop.
            self.state.advance(WorkerState::Stopped);
        } else if !self.queue.send_shutdown() {
            self.state.advance(WorkerState::Stopped);
        }
    }

    /// Alias of [`stop`](Self::stop).
    pub fn quit(&mut self) {
        self.stop();
    }

    /// Wait for the worker thread to exit. Call after [`stop`](Self::stop).
    pub fn join(&mut self) -> Result<(), ThumbnailError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ThumbnailError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl<K, F> Drop for ThumbnailDownloader<K, F> {
    fn drop(&mut self) {
        if self.handle.is_some() && !self.state.get().is_terminal() {
            self.state.advance(WorkerState::Quitting);
            // The worker also holds the queue, so its channel never closes on
            // its own; tell the loop to exit.
            let _ = self.queue.send_shutdown();
        }
    }
}
