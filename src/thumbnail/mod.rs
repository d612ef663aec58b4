// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background Thumbnail Downloader
//!
//! Decouples a fast-scrolling list from slow image downloads:
//! - One dedicated worker thread fetches and decodes, one request at a time
//! - Requests coalesce per slot: only the latest URL for a slot is ever delivered
//! - Results are handed back on the producer's thread, never the worker's
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐ enqueue ┌─────────────────┐
//! │ ThumbnailDownloader │────────▶│ RequestQueue    │
//! │ (producer thread)   │         │ slot -> url     │
//! └─────────▲───────────┘         └────────┬────────┘
//!           │ dispatch_pending             │ task channel
//!           │                              ▼
//! ┌─────────┴───────────┐         ┌─────────────────┐
//! │ delivery channel    │◀────────│ DownloadWorker  │
//! │                     │  post   │ (worker thread) │
//! └─────────────────────┘         └─────────────────┘
//! ```
//!
//! A slot can be rebound to a different photo before its download finishes.
//! The worker re-checks the request map after every fetch, and the producer
//! checks once more before invoking the callback, so a stale image never
//! lands in a reused slot.
//!
//! # Usage
//!
//! ```rust,no_run
//! use photogallery::fetch::HttpFetcher;
//! use photogallery::thumbnail::{SlotKey, ThumbnailDownloader};
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut downloader = ThumbnailDownloader::new(HttpFetcher::new()?);
//! downloader.set_delivery_callback(|slot: SlotKey, image| {
//!     println!("{slot}: {}x{}", image.width(), image.height());
//! });
//! downloader.start()?;
//!
//! let slot = SlotKey::new();
//! downloader.enqueue(slot, Some("https://live.staticflickr.com/1_s.jpg"));
//!
//! // On every frame of the UI loop:
//! downloader.dispatch_pending();
//!
//! // View destroyed:
//! downloader.cancel_all();
//! // Screen gone for good:
//! downloader.stop();
//! # Ok(())
//! # }
//! ```

pub mod downloader;
pub mod queue;
pub mod types;
mod worker;

pub use downloader::{DeliveryCallback, DispatchOutcome, ThumbnailDownloader, WORKER_THREAD_NAME};
pub use queue::RequestQueue;
pub use types::{SlotIdentity, SlotKey, WorkerState, WorkerStats};
