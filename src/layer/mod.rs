//! Layer model for the composition surface.
//!
//! A [`Layer`] is one placed image: its [`ImageData`] plus a
//! [`LayerTransform`] describing where and how it is drawn. Layers are
//! owned by a [`CompositionSurface`](crate::CompositionSurface) and only
//! mutated through it.
//!
//! Pixel work lives in the sub-modules:
//! - [`composite`]: affine drawing and source-over blending
//! - [`svg`]: the built-in garment placeholder rendered with resvg

pub mod composite;
pub mod svg;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::raster::ImageData;

// ============================================================================
// LayerId
// ============================================================================

/// Identifier of a layer within one surface.
///
/// Ids come from a per-surface counter that is never reset, so an id that
/// went stale can never refer to a newer layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Which point of the image `position_x/position_y` refers to.
///
/// Rotation and scaling also pivot around this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginMode {
    #[default]
    Center,
    TopLeft,
}

impl OriginMode {
    /// Returns the pivot in source-pixel coordinates for an image of the
    /// given size.
    pub fn pivot(&self, width: f32, height: f32) -> (f32, f32) {
        match self {
            Self::Center => (width / 2.0, height / 2.0),
            Self::TopLeft => (0.0, 0.0),
        }
    }
}

/// Placement of a layer on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerTransform {
    pub position_x: f32,
    pub position_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Clockwise rotation in degrees.
    pub rotation_degrees: f32,
    #[serde(default)]
    pub origin: OriginMode,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            position_x: 0.0,
            position_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_degrees: 0.0,
            origin: OriginMode::Center,
        }
    }
}

impl LayerTransform {
    /// Checks that every field is usable for drawing.
    pub fn validate(&self) -> Result<()> {
        if !self.position_x.is_finite() || !self.position_y.is_finite() {
            return Err(StudioError::InvalidTransform("position must be finite".into()));
        }
        if !self.rotation_degrees.is_finite() {
            return Err(StudioError::InvalidTransform("rotation must be finite".into()));
        }
        for scale in [self.scale_x, self.scale_y] {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(StudioError::InvalidTransform(format!(
                    "scale must be positive, got {scale}"
                )));
            }
        }
        Ok(())
    }

    /// Returns this transform with `patch` applied.
    pub fn patched(&self, patch: &TransformPatch) -> Self {
        Self {
            position_x: patch.position_x.unwrap_or(self.position_x),
            position_y: patch.position_y.unwrap_or(self.position_y),
            scale_x: patch.scale_x.unwrap_or(self.scale_x),
            scale_y: patch.scale_y.unwrap_or(self.scale_y),
            rotation_degrees: patch.rotation_degrees.unwrap_or(self.rotation_degrees),
            origin: patch.origin.unwrap_or(self.origin),
        }
    }
}

/// A partial transform update. `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformPatch {
    pub position_x: Option<f32>,
    pub position_y: Option<f32>,
    pub scale_x: Option<f32>,
    pub scale_y: Option<f32>,
    pub rotation_degrees: Option<f32>,
    pub origin: Option<OriginMode>,
}

impl TransformPatch {
    /// Moves the layer's origin to `(x, y)`.
    pub fn move_to(x: f32, y: f32) -> Self {
        Self {
            position_x: Some(x),
            position_y: Some(y),
            ..Self::default()
        }
    }

    /// Sets both scale factors to `scale`.
    pub fn uniform_scale(scale: f32) -> Self {
        Self {
            scale_x: Some(scale),
            scale_y: Some(scale),
            ..Self::default()
        }
    }

    pub fn rotate_to(degrees: f32) -> Self {
        Self {
            rotation_degrees: Some(degrees),
            ..Self::default()
        }
    }

    /// Merges a later patch into this one; the later value wins per field.
    pub fn merge(self, later: TransformPatch) -> Self {
        Self {
            position_x: later.position_x.or(self.position_x),
            position_y: later.position_y.or(self.position_y),
            scale_x: later.scale_x.or(self.scale_x),
            scale_y: later.scale_y.or(self.scale_y),
            rotation_degrees: later.rotation_degrees.or(self.rotation_degrees),
            origin: later.origin.or(self.origin),
        }
    }
}

// ============================================================================
// Layer
// ============================================================================

/// One placed image on the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    id: LayerId,
    image: ImageData,
    transform: LayerTransform,
}

impl Layer {
    pub(crate) fn new(id: LayerId, image: ImageData, transform: LayerTransform) -> Self {
        Self { id, image, transform }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn image(&self) -> &ImageData {
        &self.image
    }

    pub fn transform(&self) -> &LayerTransform {
        &self.transform
    }

    /// Size of the layer on the surface, in surface pixels, before rotation.
    pub fn displayed_size(&self) -> (f32, f32) {
        let size = self.image.dimensions();
        (
            size.width as f32 * self.transform.scale_x,
            size.height as f32 * self.transform.scale_y,
        )
    }

    pub(crate) fn set_transform(&mut self, transform: LayerTransform) {
        self.transform = transform;
    }

    /// Swaps the image content, leaving the transform untouched.
    pub(crate) fn replace_image(&mut self, image: ImageData) {
        self.image = image;
    }
}
