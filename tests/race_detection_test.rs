// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Race Detection Tests for the thumbnail request queue
//!
//! Several producers hammer the shared request map while the worker is
//! draining it. They are designed to surface data races when run with
//! ThreadSanitizer (TSAN).
//!
//! # Running with ThreadSanitizer
//!
//! ```bash
//! # On Linux with nightly Rust:
//! RUSTFLAGS="-Z sanitizer=thread" cargo +nightly test --target x86_64-unknown-linux-gnu --test race_detection_test
//! ```
//!
//! # Test Categories
//!
//! - Concurrent enqueue/cancel against a live worker
//! - Reader/writer contention on the request map

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, RgbaImage};
use tokio::time::timeout;

use photogallery::{DispatchOutcome, FetchError, Fetcher, ThumbnailDownloader};

// Test configuration
const PRODUCERS: usize = 4;
const KEYS: u32 = 16;
const ITERATIONS_PER_TASK: u32 = 25;
const FINAL_WIDTH: u32 = 500;
const TEST_TIMEOUT_SECS: u64 = 30;

/// Serves a 1px-high PNG whose width is the number in the URL's last segment.
struct WidthFromUrl;

impl Fetcher for WidthFromUrl {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let width = url
            .rsplit('/')
            .next()
            .and_then(|name| name.trim_end_matches(".png").parse().ok())
            .unwrap_or(1);
        let mut bytes = Vec::new();
        RgbaImage::new(width, 1)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        Ok(bytes)
    }
}

fn url(key: u32, width: u32) -> String {
    format!("http://x/{key}/{width}.png")
}

// =============================================================================
// CONCURRENT PRODUCERS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_final_request_wins() {
    let mut downloader = ThumbnailDownloader::new(WidthFromUrl);
    let received: Rc<RefCell<HashMap<u32, Vec<u32>>>> = Rc::default();
    let sink = received.clone();
    downloader.set_delivery_callback(move |key, image| {
        sink.borrow_mut().entry(key).or_default().push(image.width());
    });
    downloader.start().unwrap();

    let queue = downloader.request_queue();
    let operations = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for producer in 0..PRODUCERS {
        let queue = queue.clone();
        let operations = operations.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..ITERATIONS_PER_TASK {
                for key in 0..KEYS {
                    match (key + i + producer as u32) % 5 {
                        0 => {
                            queue.cancel(&key);
                        }
                        1 => {
                            queue.enqueue(key, None);
                        }
                        _ => {
                            queue.enqueue(key, Some(url(key, i + 1).as_str()));
                        }
                    }
                    operations.fetch_add(1, Ordering::Relaxed);
                }
                if producer == 0 && i % 10 == 0 {
                    queue.cancel_all();
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;
    assert!(result.is_ok(), "Producers timed out - possible deadlock");
    assert_eq!(
        operations.load(Ordering::Relaxed),
        PRODUCERS as u64 * ITERATIONS_PER_TASK as u64 * KEYS as u64
    );

    // Every slot settles on one last request.
    for key in 0..KEYS {
        assert!(downloader.enqueue(key, Some(url(key, FINAL_WIDTH).as_str())));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        while received.borrow().len() < KEYS as usize {
            match downloader.dispatch_next().await {
                Some(DispatchOutcome::Delivered | DispatchOutcome::Discarded) => {}
                None => break,
            }
        }
    })
    .await;
    assert!(result.is_ok(), "Final deliveries timed out");

    let received = received.borrow();
    assert_eq!(received.len(), KEYS as usize);
    for key in 0..KEYS {
        assert_eq!(received[&key], vec![FINAL_WIDTH], "key {key} saw a stale image");
    }
    assert!(queue.is_empty());

    downloader.stop();
    downloader.join().unwrap();
}

// =============================================================================
// LOCK CONTENTION
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_deadlock_with_concurrent_readers_and_writers() {
    // Not started: tasks pile up in the channel while the map churns.
    let downloader: ThumbnailDownloader<u32, WidthFromUrl> = ThumbnailDownloader::new(WidthFromUrl);
    let queue = downloader.request_queue();
    let lookups = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for task_id in 0..8u32 {
        let queue = queue.clone();
        let lookups = lookups.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..ITERATIONS_PER_TASK * 4 {
                let key = (task_id * 7 + i) % KEYS;
                if task_id % 2 == 0 {
                    queue.enqueue(key, Some(url(key, i + 1).as_str()));
                    if i % 3 == 0 {
                        queue.cancel(&key);
                    }
                } else {
                    if queue.lookup(&key).is_some() {
                        lookups.fetch_add(1, Ordering::Relaxed);
                    }
                    let _ = queue.len();
                }
                if i % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;
    assert!(result.is_ok(), "Deadlock detected in request map access");
    assert!(queue.len() <= KEYS as usize);

    queue.cancel_all();
    assert!(queue.is_empty());
}
