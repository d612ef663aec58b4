// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! photogallery - Photo gallery browser library
//!
//! Lists photos from Flickr and downloads their thumbnails in the background
//! for a recycling list view, making sure a reused slot only ever shows the
//! image most recently requested for it.
//!
//! # Core Modules
//!
//! - [`thumbnail`] - Coalescing background thumbnail downloader
//! - [`fetch`] - HTTP fetch collaborator and Flickr gallery client
//! - [`decode`] - Image decoding
//! - [`config`] - Persistent user configuration
//! - [`error`] - Error types

pub mod config;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod thumbnail;

pub use config::{load_config, save_config, Config};
pub use decode::{decode_thumbnail, DecodedImage};
pub use error::{DecodeError, FetchError, ThumbnailError};
pub use fetch::{Fetcher, FlickrClient, GalleryItem, HttpFetcher, HttpTimeouts};
pub use thumbnail::{
    DispatchOutcome, RequestQueue, SlotKey, ThumbnailDownloader, WorkerState, WorkerStats,
};
