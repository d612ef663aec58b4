// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request map and task dispatch.
//!
//! The request map holds, per slot, the one URL that should eventually be
//! delivered there. Enqueueing overwrites the entry and pushes a task onto the
//! worker channel; older tasks for the same slot stay in the channel and are
//! recognised as stale by their ticket when the worker reaches them.
//!
//! Every map operation takes the lock once and never across an await or a
//! fetch, so a lookup-then-overwrite from the producer cannot interleave with
//! the worker's compare-then-remove for the same key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use super::types::{DownloadTask, SlotIdentity, WorkerMessage};

pub(crate) type TaskReceiver<K> = mpsc::UnboundedReceiver<WorkerMessage<K>>;

#[derive(Debug, Clone)]
struct PendingRequest {
    url: String,
    ticket: u64,
}

/// Latest requested URL per slot, plus the worker's task channel.
#[derive(Debug)]
pub struct RequestQueue<K> {
    requests: RwLock<HashMap<K, PendingRequest>>,
    next_ticket: AtomicU64,
    task_tx: mpsc::UnboundedSender<WorkerMessage<K>>,
}

impl<K: SlotIdentity> RequestQueue<K> {
    /// Create a queue and the receiving end of its task channel.
    pub(crate) fn new() -> (Self, TaskReceiver<K>) {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let queue = Self {
            requests: RwLock::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            task_tx,
        };
        (queue, task_rx)
    }

    /// Request `url` for `key`, replacing any earlier request for that key.
    ///
    /// A missing or empty URL cancels the key instead and dispatches nothing.
    /// Returns `true` if a task was dispatched. Never blocks on I/O.
    pub fn enqueue(&self, key: K, url: Option<&str>) -> bool {
        let url = match url {
            Some(url) if !url.is_empty() => url,
            _ => {
                tracing::debug!(key = ?key, "Enqueue without URL, cancelling slot");
                self.cancel(&key);
                return false;
            }
        };

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let task = DownloadTask {
            key: key.clone(),
            url: url.to_string(),
            ticket,
        };

        let mut requests = self.write_requests();
        // Send while holding the lock so, per key, channel order matches the
        // order of writes to the map. Tickets may reach the channel out of
        // numeric order across producers; only equality is ever compared.
        if self.task_tx.send(WorkerMessage::Download(task)).is_err() {
            tracing::debug!(key = ?key, url = %url, "Worker is gone, request dropped");
            requests.remove(&key);
            return false;
        }
        requests.insert(
            key.clone(),
            PendingRequest {
                url: url.to_string(),
                ticket,
            },
        );
        drop(requests);

        tracing::debug!(key = ?key, url = %url, ticket, "Queued thumbnail");
        true
    }

    /// Forget the pending request for `key`. Returns whether one existed.
    pub fn cancel(&self, key: &K) -> bool {
        self.write_requests().remove(key).is_some()
    }

    /// Forget every pending request.
    ///
    /// Tasks already in the channel become inert: the worker drops them
    /// without fetching, and results of fetches already in flight are never
    /// delivered.
    pub fn cancel_all(&self) {
        let cleared = {
            let mut requests = self.write_requests();
            let count = requests.len();
            requests.clear();
            count
        };
        tracing::debug!(cleared, "Cleared thumbnail queue");
    }

    /// Currently requested URL for `key`.
    pub fn lookup(&self, key: &K) -> Option<String> {
        self.read_requests().get(key).map(|r| r.url.clone())
    }

    /// Number of keys with a pending request.
    pub fn len(&self) -> usize {
        self.read_requests().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `ticket` is still the latest request for `key`.
    pub(crate) fn is_current(&self, key: &K, ticket: u64) -> bool {
        self.read_requests()
            .get(key)
            .is_some_and(|r| r.ticket == ticket)
    }

    /// Remove the request for `key` if `ticket` is still current.
    pub(crate) fn take_if_current(&self, key: &K, ticket: u64) -> Option<String> {
        let mut requests = self.write_requests();
        match requests.get(key) {
            Some(r) if r.ticket == ticket => requests.remove(key).map(|r| r.url),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn current_ticket(&self, key: &K) -> Option<u64> {
        self.read_requests().get(key).map(|r| r.ticket)
    }

    // A panic elsewhere while holding the lock leaves a map that is still
    // structurally valid, so recover the guard rather than propagate.
    fn read_requests(&self) -> RwLockReadGuard<'_, HashMap<K, PendingRequest>> {
        self.requests.read().unwrap_or_else(|poisoned| {
            tracing::error!(
                target: "thumbnail::queue",
                event = "LOCK_POISONED_READ",
                "Request map lock was poisoned, recovering"
            );
            poisoned.into_inner()
        })
    }

    fn write_requests(&self) -> RwLockWriteGuard<'_, HashMap<K, PendingRequest>> {
        self.requests.write().unwrap_or_else(|poisoned| {
            tracing::error!(
                target: "thumbnail::queue",
                event = "LOCK_POISONED_WRITE",
                "Request map lock was poisoned, recovering"
            );
            poisoned.into_inner()
        })
    }
}

impl<K> RequestQueue<K> {
    /// Ask the worker loop to exit once it reaches this message.
    pub(crate) fn send_shutdown(&self) -> bool {
        self.task_tx.send(WorkerMessage::Shutdown).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_task(rx: &mut TaskReceiver<&'static str>) -> Option<DownloadTask<&'static str>> {
        match rx.try_recv() {
            Ok(WorkerMessage::Download(task)) => Some(task),
            _ => None,
        }
    }

    #[test]
    fn test_enqueue_records_and_dispatches() {
        let (queue, mut rx) = RequestQueue::new();
        assert!(queue.enqueue("slot1", Some("http://x/a.jpg")));

        assert_eq!(queue.lookup(&"slot1").as_deref(), Some("http://x/a.jpg"));
        let task = next_task(&mut rx).unwrap();
        assert_eq!(task.key, "slot1");
        assert_eq!(task.url, "http://x/a.jpg");
        assert!(queue.is_current(&"slot1", task.ticket));
        assert!(next_task(&mut rx).is_none());
    }

    #[test]
    fn test_enqueue_overwrites_and_keeps_old_task() {
        let (queue, mut rx) = RequestQueue::new();
        queue.enqueue("slot1", Some("http://x/a.jpg"));
        queue.enqueue("slot1", Some("http://x/b.jpg"));

        let first = next_task(&mut rx).unwrap();
        let second = next_task(&mut rx).unwrap();
        assert_eq!(first.url, "http://x/a.jpg");
        assert_eq!(second.url, "http://x/b.jpg");
        assert!(!queue.is_current(&"slot1", first.ticket));
        assert!(queue.is_current(&"slot1", second.ticket));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_same_url_twice_supersedes_first_task() {
        let (queue, mut rx) = RequestQueue::new();
        queue.enqueue("slot1", Some("http://x/a.jpg"));
        queue.enqueue("slot1", Some("http://x/a.jpg"));

        let first = next_task(&mut rx).unwrap();
        let second = next_task(&mut rx).unwrap();
        assert!(!queue.is_current(&"slot1", first.ticket));
        assert!(queue.is_current(&"slot1", second.ticket));
    }

    #[test]
    fn test_missing_or_empty_url_cancels() {
        let (queue, mut rx) = RequestQueue::new();
        queue.enqueue("slot1", Some("http://x/a.jpg"));
        let _ = next_task(&mut rx);

        assert!(!queue.enqueue("slot1", Some("")));
        assert!(queue.lookup(&"slot1").is_none());
        assert!(next_task(&mut rx).is_none());

        queue.enqueue("slot2", Some("http://x/b.jpg"));
        let _ = next_task(&mut rx);
        assert!(!queue.enqueue("slot2", None));
        assert!(queue.lookup(&"slot2").is_none());
        assert!(next_task(&mut rx).is_none());
    }

    #[test]
    fn test_cancel_all_invalidates_queued_tasks() {
        let (queue, mut rx) = RequestQueue::new();
        queue.enqueue("slot1", Some("http://x/a.jpg"));
        queue.enqueue("slot2", Some("http://x/b.jpg"));
        queue.cancel_all();
        assert!(queue.is_empty());

        // Re-requesting the same URL after the clear must not revive the old task.
        queue.enqueue("slot1", Some("http://x/a.jpg"));
        let old = next_task(&mut rx).unwrap();
        assert!(!queue.is_current(&"slot1", old.ticket));
    }

    #[test]
    fn test_take_if_current() {
        let (queue, mut rx) = RequestQueue::new();
        queue.enqueue("slot1", Some("http://x/a.jpg"));
        let task = next_task(&mut rx).unwrap();

        assert!(queue.take_if_current(&"slot1", task.ticket + 100).is_none());
        assert_eq!(
            queue.take_if_current(&"slot1", task.ticket).as_deref(),
            Some("http://x/a.jpg")
        );
        assert!(queue.take_if_current(&"slot1", task.ticket).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_after_worker_gone() {
        let (queue, rx) = RequestQueue::new();
        drop(rx);
        assert!(!queue.enqueue("slot1", Some("http://x/a.jpg")));
        assert!(queue.lookup(&"slot1").is_none());
    }

    #[test]
    fn test_cancel_single_key() {
        let (queue, _rx) = RequestQueue::new();
        queue.enqueue("slot1", Some("http://x/a.jpg"));
        queue.enqueue("slot2", Some("http://x/b.jpg"));
        assert!(queue.cancel(&"slot1"));
        assert!(!queue.cancel(&"slot1"));
        assert_eq!(queue.current_ticket(&"slot1"), None);
        assert!(queue.current_ticket(&"slot2").is_some());
    }
}
