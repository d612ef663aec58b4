// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Types shared by the request queue, the worker and the producer handle.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::decode::DecodedImage;

/// Bounds for a key that identifies a reusable UI slot.
///
/// Blanket-implemented; any `Eq + Hash + Clone` identity works. Equality must
/// be identity equality: two slots showing the same photo are different keys.
pub trait SlotIdentity: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> SlotIdentity for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Opaque identity of a recycled slot in a list or grid.
///
/// Every call to [`SlotKey::new`] yields a distinct key; the key stays valid
/// and comparable no matter what the slot currently displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(u64);

impl SlotKey {
    pub fn new() -> Self {
        static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_SLOT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for SlotKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// A unit of work for the download worker.
///
/// `ticket` is unique per enqueue; the task is current only while the request
/// map still holds the same ticket for `key`.
#[derive(Debug, Clone)]
pub(crate) struct DownloadTask<K> {
    pub(crate) key: K,
    pub(crate) url: String,
    pub(crate) ticket: u64,
}

/// Messages on the worker's task channel.
#[derive(Debug)]
pub(crate) enum WorkerMessage<K> {
    Download(DownloadTask<K>),
    Shutdown,
}

/// A completed download posted back to the producer.
#[derive(Debug)]
pub(crate) struct Delivery<K> {
    pub(crate) key: K,
    pub(crate) url: String,
    pub(crate) image: DecodedImage,
    pub(crate) ticket: u64,
}

/// Lifecycle of the download worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Accepting tasks and delivering results.
    Running = 0,
    /// Stop requested: no new tasks, no deliveries, queue is being drained.
    Quitting = 1,
    /// Worker loop has exited. Terminal.
    Stopped = 2,
}

impl WorkerState {
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Stopped)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Running,
            1 => WorkerState::Quitting,
            _ => WorkerState::Stopped,
        }
    }
}

/// Worker state shared between the producer and the worker thread.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move forward in the lifecycle; never moves backwards.
    pub(crate) fn advance(&self, to: WorkerState) -> WorkerState {
        WorkerState::from_u8(self.0.fetch_max(to as u8, Ordering::AcqRel))
    }
}

/// Counters updated by the worker and by delivery dispatch.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    pub(crate) superseded: AtomicU64,
    pub(crate) fetched: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) stale: AtomicU64,
    pub(crate) delivered: AtomicU64,
}

impl WorkerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            superseded: self.superseded.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time worker statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks dropped before fetching because a newer request or a cancel replaced them.
    pub superseded: u64,
    /// Successful fetch + decode.
    pub fetched: u64,
    /// Fetch or decode failures.
    pub failed: u64,
    /// Completed downloads discarded by the currency check.
    pub stale: u64,
    /// Results handed to the delivery callback.
    pub delivered: u64,
}

impl WorkerStats {
    /// Tasks that have reached a final outcome.
    ///
    /// While the worker is running, every dispatched task ends up in exactly
    /// one of these counters once its result (if any) has been dispatched.
    /// A failed task counts here even though its request stays in the map.
    pub fn resolved(&self) -> u64 {
        self.superseded + self.failed + self.stale + self.delivered
    }
}
