// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP fetch collaborator.
//!
//! The download worker only needs "URL in, bytes out"; that seam is the
//! [`Fetcher`] trait so the worker can be driven by a mock in tests.
//! [`HttpFetcher`] is the real implementation, and [`FlickrClient`] fetches
//! the gallery listing that the thumbnails belong to.

pub mod flickr;

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

pub use flickr::{parse_gallery_items, FlickrClient, GalleryItem};

/// Default timeout for establishing a connection (in seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default timeout for a whole request (in seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fetches the raw bytes behind a URL.
///
/// Implementations must be stateless per call: the worker invokes
/// `fetch_bytes` once per task and never retries.
pub trait Fetcher: Send + 'static {
    /// Fetch `url`, failing on connection errors and non-2xx statuses.
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Timeouts applied to every request of an HTTP client.
#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl HttpTimeouts {
    pub(crate) fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect)
            .timeout(self.request)
            .user_agent(concat!("photogallery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)
    }
}

/// [`Fetcher`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeouts.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeouts(HttpTimeouts::default())
    }

    pub fn with_timeouts(timeouts: HttpTimeouts) -> Result<Self, FetchError> {
        Ok(Self {
            client: timeouts.build_client()?,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        tracing::trace!(url = %url, len = bytes.len(), "Fetched bytes");
        Ok(bytes.to_vec())
    }
}
