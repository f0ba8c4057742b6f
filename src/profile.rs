//! Serializable design profile for saving, restoring and sharing a design.
//!
//! A [`DesignProfile`] captures a session's selection and every layer in a
//! format that can be serialized to JSON and stored behind a share
//! reference. Layer images travel as base64 of the original upload bytes.
//!
//! # Example
//!
//! ```
//! use tee_studio::{DesignProfile, LayerSettings, LayerTransform};
//!
//! let profile = DesignProfile::new("v-neck", "navy")
//!     .with_layer(LayerSettings::from_bytes(
//!         &[0x89, b'P', b'N', b'G'],
//!         LayerTransform::default(),
//!     ));
//!
//! let json = profile.to_json().unwrap();
//! let restored = DesignProfile::from_json(&json).unwrap();
//! assert_eq!(restored.style_id, "v-neck");
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::layer::{Layer, LayerTransform};
use crate::raster::ImageData;

/// Current profile format version.
pub const PROFILE_VERSION: u32 = 1;

// ============================================================================
// Layer Settings (Serializable)
// ============================================================================

/// One layer of a saved design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSettings {
    /// Base64 (standard alphabet) of the encoded image bytes.
    pub image_base64: String,

    pub transform: LayerTransform,
}

impl LayerSettings {
    pub fn from_bytes(bytes: &[u8], transform: LayerTransform) -> Self {
        Self {
            image_base64: STANDARD.encode(bytes),
            transform,
        }
    }

    /// Decodes the image and checks the transform.
    pub(crate) fn load(&self, index: usize) -> Result<(ImageData, LayerTransform)> {
        let bytes = STANDARD
            .decode(&self.image_base64)
            .map_err(|e| StudioError::InvalidProfile(format!("layer {index}: {e}")))?;
        let image = ImageData::decode(&bytes)
            .map_err(|e| StudioError::InvalidProfile(format!("layer {index}: {e}")))?;
        self.transform
            .validate()
            .map_err(|e| StudioError::InvalidProfile(format!("layer {index}: {e}")))?;
        Ok((image, self.transform))
    }
}

impl From<&Layer> for LayerSettings {
    fn from(layer: &Layer) -> Self {
        Self::from_bytes(layer.image().encoded(), *layer.transform())
    }
}

fn default_version() -> u32 {
    PROFILE_VERSION
}

// ============================================================================
// DesignProfile
// ============================================================================

/// A serializable snapshot of one design.
///
/// # JSON Format
///
/// ```json
/// {
///   "version": 1,
///   "styleId": "v-neck",
///   "colorId": "navy",
///   "layers": [
///     {
///       "imageBase64": "iVBORw0KGgo...",
///       "transform": {
///         "positionX": 200.0, "positionY": 200.0,
///         "scaleX": 0.2, "scaleY": 0.2,
///         "rotationDegrees": 0.0, "origin": "center"
///       }
///     }
///   ],
///   "activeLayer": 0
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignProfile {
    #[serde(default = "default_version")]
    pub version: u32,

    pub style_id: String,
    pub color_id: String,

    /// Garment asset shown when the profile was exported. Informational:
    /// applying a profile resolves the background again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_reference: Option<String>,

    /// Layers bottom to top.
    #[serde(default)]
    pub layers: Vec<LayerSettings>,

    /// Index into `layers` of the active layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_layer: Option<usize>,
}

impl DesignProfile {
    /// Creates a profile with no layers.
    pub fn new(style_id: impl Into<String>, color_id: impl Into<String>) -> Self {
        Self {
            version: PROFILE_VERSION,
            style_id: style_id.into(),
            color_id: color_id.into(),
            background_reference: None,
            layers: Vec::new(),
            active_layer: None,
        }
    }

    /// Appends a layer on top and makes it active.
    pub fn with_layer(mut self, layer: LayerSettings) -> Self {
        self.layers.push(layer);
        self.active_layer = Some(self.layers.len() - 1);
        self
    }

    /// Serializes the profile to a JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the profile to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a profile from a JSON string.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Decodes and validates every layer, without touching any session.
    pub(crate) fn load_layers(&self) -> Result<Vec<(ImageData, LayerTransform)>> {
        if self.version != PROFILE_VERSION {
            return Err(StudioError::InvalidProfile(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if let Some(active) = self.active_layer {
            if active >= self.layers.len() {
                return Err(StudioError::InvalidProfile(format!(
                    "active layer {active} out of range"
                )));
            }
        }
        self.layers
            .iter()
            .enumerate()
            .map(|(index, layer)| layer.load(index))
            .collect()
    }
}
