// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Flickr gallery listing.
//!
//! Fetches recent or searched photos from the Flickr REST API and turns them
//! into [`GalleryItem`]s whose thumbnail URLs feed the download worker.

use serde::{Deserialize, Serialize};

use super::HttpTimeouts;
use crate::error::FetchError;

/// Default Flickr REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.flickr.com/services/rest/";

const FETCH_RECENTS_METHOD: &str = "flickr.photos.getRecent";
const SEARCH_METHOD: &str = "flickr.photos.search";

/// One photo of the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub id: String,
    pub caption: String,
    /// Small thumbnail URL (`url_s`).
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct FlickrResponse {
    #[serde(default)]
    stat: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    photos: Option<PhotoPage>,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    photo: Vec<PhotoEntry>,
}

#[derive(Debug, Deserialize)]
struct PhotoEntry {
    id: String,
    title: String,
    url_s: Option<String>,
}

/// Parse a `format=json&nojsoncallback=1` Flickr photo listing.
///
/// Entries without a small thumbnail URL are skipped.
pub fn parse_gallery_items(body: &str) -> Result<Vec<GalleryItem>, FetchError> {
    let response: FlickrResponse = serde_json::from_str(body)?;

    if response.stat.as_deref() == Some("fail") {
        return Err(FetchError::Api {
            code: response.code.unwrap_or_default(),
            message: response.message.unwrap_or_default(),
        });
    }

    let Some(page) = response.photos else {
        return Err(FetchError::Parse(
            <serde_json::Error as serde::de::Error>::missing_field("photos"),
        ));
    };

    Ok(page
        .photo
        .into_iter()
        .filter_map(|entry| {
            entry.url_s.map(|url| GalleryItem {
                id: entry.id,
                caption: entry.title,
                url,
            })
        })
        .collect())
}

/// Client for the Flickr photo listing methods.
#[derive(Debug, Clone)]
pub struct FlickrClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FlickrClient {
    /// Create a client for `endpoint` authenticated with `api_key`.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: timeouts.build_client()?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Most recent public photos.
    pub async fn fetch_recent(&self) -> Result<Vec<GalleryItem>, FetchError> {
        self.download_gallery_items(FETCH_RECENTS_METHOD, None).await
    }

    /// Photos matching `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<GalleryItem>, FetchError> {
        self.download_gallery_items(SEARCH_METHOD, Some(query)).await
    }

    /// Search when a query is given, recent photos otherwise.
    pub async fn fetch_gallery_items(&self, query: Option<&str>) -> Result<Vec<GalleryItem>, FetchError> {
        match query {
            Some(q) => self.search(q).await,
            None => self.fetch_recent().await,
        }
    }

    async fn download_gallery_items(
        &self,
        method: &str,
        query: Option<&str>,
    ) -> Result<Vec<GalleryItem>, FetchError> {
        let mut params = vec![
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("nojsoncallback", "1"),
            ("extras", "url_s"),
            ("method", method),
        ];
        if let Some(text) = query {
            params.push(("text", text));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| FetchError::transport(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.endpoint.clone(),
                status,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(&self.endpoint, e))?;
        tracing::debug!(method, len = body.len(), "Received gallery JSON");

        let items = parse_gallery_items(&body)?;
        tracing::info!(method, count = items.len(), "Fetched gallery items");
        Ok(items)
    }
}
