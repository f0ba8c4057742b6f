//! Raster image values shared by the surface, the gateway and exports.
//!
//! [`ImageData`] is what a layer holds: the bytes as they were uploaded
//! (forwarded verbatim to the segmentation service) together with the
//! decoded RGBA pixels used for compositing. [`FlatImage`] is the output of
//! rasterizing a surface.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbaImage};

use crate::error::{Result, StudioError};

/// A 2D size in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizePx {
    pub width: u32,
    pub height: u32,
}

impl SizePx {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the longer of the two sides.
    pub fn longer_side(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Returns the shorter of the two sides.
    pub fn shorter_side(&self) -> u32 {
        self.width.min(self.height)
    }
}

// ============================================================================
// ImageData
// ============================================================================

/// Decoded image content of a layer.
///
/// Both halves are reference counted, so cloning a layer for a snapshot
/// does not copy pixels.
#[derive(Debug, Clone)]
pub struct ImageData {
    encoded: Arc<[u8]>,
    pixels: Arc<RgbaImage>,
}

impl ImageData {
    /// Decodes raw upload bytes.
    ///
    /// Fails with [`StudioError::InvalidImageData`] when the bytes are not a
    /// raster image the `image` crate can read, or when the image is empty.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| StudioError::InvalidImageData(e.to_string()))?;
        let pixels = decoded.to_rgba8();
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(StudioError::InvalidImageData("image has no pixels".into()));
        }
        Ok(Self {
            encoded: Arc::from(bytes),
            pixels: Arc::new(pixels),
        })
    }

    /// Wraps already-decoded pixels, encoding them as PNG for the byte half.
    pub fn from_rgba(pixels: RgbaImage) -> Result<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(StudioError::InvalidImageData("image has no pixels".into()));
        }
        let encoded = encode_png(&pixels)
            .map_err(|e| StudioError::InvalidImageData(e.to_string()))?;
        Ok(Self {
            encoded: Arc::from(encoded),
            pixels: Arc::new(pixels),
        })
    }

    /// The bytes as originally supplied.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// The decoded RGBA pixels.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> SizePx {
        SizePx::new(self.pixels.width(), self.pixels.height())
    }
}

impl PartialEq for ImageData {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels) || *self.pixels == *other.pixels
    }
}

// ============================================================================
// FlatImage
// ============================================================================

/// A flattened rendering of a composition surface.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatImage {
    pub data: RgbaImage,
}

impl FlatImage {
    pub fn new(data: RgbaImage) -> Self {
        Self { data }
    }

    pub fn dimensions(&self) -> SizePx {
        SizePx::new(self.data.width(), self.data.height())
    }

    /// Encodes the image as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.data).map_err(|e| StudioError::RasterizeFailed(e.to_string()))
    }

    /// Encodes the image as a `data:image/png;base64,` URL.
    pub fn to_data_url(&self) -> Result<String> {
        Ok(png_data_url(&self.to_png()?))
    }
}

/// Encodes RGBA pixels as PNG.
pub(crate) fn encode_png(pixels: &RgbaImage) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    pixels.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

pub(crate) fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
