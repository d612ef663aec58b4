// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Thumbnail decoding.
//!
//! Turns raw bytes from the fetch collaborator into an in-memory image.
//! PNG, JPEG, GIF and WebP are recognised from their magic bytes.

use image::{DynamicImage, GenericImageView};

use crate::error::DecodeError;

/// A decoded thumbnail, owned by the worker until it is delivered.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
}

impl DecodedImage {
    /// Wrap an already decoded image.
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// (width, height) in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Decode `bytes` into an image.
///
/// When `max_edge` is set and either side of the image exceeds it, the image
/// is scaled down so that its longest side equals `max_edge`, keeping the
/// aspect ratio.
pub fn decode_thumbnail(bytes: &[u8], max_edge: Option<u32>) -> Result<DecodedImage, DecodeError> {
    let image = image::load_from_memory(bytes)?;

    let image = match max_edge {
        Some(edge) if edge > 0 && (image.width() > edge || image.height() > edge) => {
            image.thumbnail(edge, edge)
        }
        _ => image,
    };

    Ok(DecodedImage::new(image))
}
