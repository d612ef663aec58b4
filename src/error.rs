// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for photogallery.
//!
//! Fetch and decode failures are local-recovery errors: the download worker
//! logs them and drops the affected task. Lifecycle errors are returned to the
//! caller that misused the downloader.

use thiserror::Error;

/// Errors from the HTTP fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection failure, timeout, or a broken response body.
    #[error("network error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-2xx status.
    #[error("HTTP {status} fetching {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Response body was not the JSON we expected.
    #[error("failed to parse gallery response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Flickr answered with `"stat": "fail"`.
    #[error("Flickr API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The HTTP client could not be built (TLS backend, bad config).
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Build a transport error for `url`.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    /// Possible causes and suggested fixes, for CLI error reports.
    pub fn hints(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            Self::Transport { .. } => (
                &["No network connection", "Request timed out"],
                &[
                    "Check your connection and try again",
                    "Raise the timeout: set request_timeout_secs in the config",
                ],
            ),
            Self::Status { .. } => (
                &["The image or endpoint no longer exists", "The server is rejecting requests"],
                &["Check the endpoint: photogallery config show"],
            ),
            Self::Parse(_) => (
                &["Endpoint is not a Flickr REST API", "Response format changed"],
                &["Check the endpoint: photogallery config show"],
            ),
            Self::Api { .. } => (
                &["Missing or invalid API key"],
                &["Set a key: photogallery config set-key <KEY>", "Or export FLICKR_API_KEY"],
            ),
            Self::Client(_) => (&["TLS backend unavailable"], &[]),
        }
    }
}

/// Image bytes could not be decoded.
#[derive(Debug, Error)]
#[error("failed to decode image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

/// Lifecycle errors of the thumbnail downloader.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("download worker already started")]
    AlreadyStarted,

    #[error("download worker has been stopped")]
    Stopped,

    #[error("failed to spawn download worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("download worker thread panicked")]
    WorkerPanicked,
}
