//! Studio and segmentation-service configuration.
//!
//! Both configs can be built in code, deserialized, or loaded from
//! environment variables. Loading goes through a lookup function so tests
//! can supply variables without touching the process environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::parse_hex_color;
use crate::error::{Result, StudioError};
use crate::pricing::LineItemPolicy;
use crate::surface::{DEFAULT_FIT_FRACTION, SurfaceConfig};

/// Default Photoroom segmentation endpoint.
pub const DEFAULT_SEGMENTATION_URL: &str = "https://sdk.photoroom.com/v1/segment";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// StudioConfig
// ============================================================================

/// Settings for design sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    pub surface_width: u32,
    pub surface_height: u32,
    /// Fraction of the shorter surface side that a new layer fills.
    pub fit_fraction: f32,
    /// `#rrggbb` fill drawn under the background.
    pub base_color: String,
    /// Refuse to build line items for designs without layers.
    pub require_layers: bool,
    /// Size recorded on line items.
    pub default_size: String,
    /// Origin used when building share references.
    pub share_base_url: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            surface_width: 400,
            surface_height: 400,
            fit_fraction: DEFAULT_FIT_FRACTION,
            base_color: "#f3f4f6".to_string(),
            require_layers: false,
            default_size: "M".to_string(),
            share_base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl StudioConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `STUDIO_SURFACE_WIDTH`   | `400`                   |
    /// | `STUDIO_SURFACE_HEIGHT`  | `400`                   |
    /// | `STUDIO_FIT_FRACTION`    | `0.5`                   |
    /// | `STUDIO_BASE_COLOR`      | `#f3f4f6`               |
    /// | `STUDIO_REQUIRE_LAYERS`  | `false`                 |
    /// | `STUDIO_DEFAULT_SIZE`    | `M`                     |
    /// | `STUDIO_SHARE_BASE_URL`  | `http://localhost:3000` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            surface_width: parse_var(&lookup, "STUDIO_SURFACE_WIDTH")?
                .unwrap_or(defaults.surface_width),
            surface_height: parse_var(&lookup, "STUDIO_SURFACE_HEIGHT")?
                .unwrap_or(defaults.surface_height),
            fit_fraction: parse_var(&lookup, "STUDIO_FIT_FRACTION")?
                .unwrap_or(defaults.fit_fraction),
            base_color: lookup("STUDIO_BASE_COLOR").unwrap_or(defaults.base_color),
            require_layers: parse_var(&lookup, "STUDIO_REQUIRE_LAYERS")?
                .unwrap_or(defaults.require_layers),
            default_size: lookup("STUDIO_DEFAULT_SIZE").unwrap_or(defaults.default_size),
            share_base_url: lookup("STUDIO_SHARE_BASE_URL").unwrap_or(defaults.share_base_url),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.surface_config()?.validate()?;
        if self.default_size.trim().is_empty() {
            return Err(StudioError::Config("default size must not be empty".into()));
        }
        Ok(())
    }

    /// The surface settings these options describe.
    pub fn surface_config(&self) -> Result<SurfaceConfig> {
        let base_color = parse_hex_color(&self.base_color)
            .map_err(|_| StudioError::Config(format!("bad base color {:?}", self.base_color)))?;
        Ok(SurfaceConfig {
            width: self.surface_width,
            height: self.surface_height,
            fit_fraction: self.fit_fraction,
            base_color,
        })
    }

    pub fn line_item_policy(&self) -> LineItemPolicy {
        LineItemPolicy {
            require_layers: self.require_layers,
            size_name: self.default_size.clone(),
        }
    }
}

// ============================================================================
// SegmentationConfig
// ============================================================================

/// Connection settings for the background-removal service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationConfig {
    pub api_key: String,
    pub api_url: String,
    /// Upper bound on one removal request.
    pub timeout: Duration,
}

impl SegmentationConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_SEGMENTATION_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Required | Default                                |
    /// |--------------------------|----------|----------------------------------------|
    /// | `PHOTOROOM_API_KEY`      | yes      | --                                     |
    /// | `PHOTOROOM_API_URL`      | no       | `https://sdk.photoroom.com/v1/segment` |
    /// | `PHOTOROOM_TIMEOUT_SECS` | no       | `30`                                   |
    ///
    /// Returns `Ok(None)` when `PHOTOROOM_API_KEY` is unset or empty, which
    /// leaves background removal unavailable.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(api_key) = lookup("PHOTOROOM_API_KEY").filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        let mut config = Self::new(api_key);
        if let Some(url) = lookup("PHOTOROOM_API_URL") {
            config.api_url = url;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "PHOTOROOM_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(StudioError::Config(
                    "PHOTOROOM_TIMEOUT_SECS must be positive".into(),
                ));
            }
            config.timeout = Duration::from_secs(secs);
        }
        Ok(Some(config))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e| StudioError::Config(format!("{key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = StudioConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config, StudioConfig::default());

        let surface = config.surface_config().unwrap();
        assert_eq!((surface.width, surface.height), (400, 400));
        assert_eq!(surface.base_color.blue, 0xf6);
    }

    #[test]
    fn environment_overrides() {
        let config = StudioConfig::from_lookup(env(&[
            ("STUDIO_SURFACE_WIDTH", "800"),
            ("STUDIO_REQUIRE_LAYERS", "true"),
            ("STUDIO_DEFAULT_SIZE", "L"),
        ]))
        .unwrap();
        assert_eq!(config.surface_width, 800);
        assert_eq!(config.surface_height, 400);
        assert!(config.line_item_policy().require_layers);
        assert_eq!(config.line_item_policy().size_name, "L");
    }

    #[test]
    fn unparseable_values_are_config_errors() {
        assert_matches!(
            StudioConfig::from_lookup(env(&[("STUDIO_SURFACE_HEIGHT", "tall")])),
            Err(StudioError::Config(msg)) if msg.contains("STUDIO_SURFACE_HEIGHT")
        );
        assert_matches!(
            StudioConfig::from_lookup(env(&[("STUDIO_FIT_FRACTION", "1.5")])),
            Err(StudioError::Config(_))
        );
        assert_matches!(
            StudioConfig::from_lookup(env(&[("STUDIO_BASE_COLOR", "grey")])),
            Err(StudioError::Config(_))
        );
    }

    #[test]
    fn studio_config_deserializes_partial_json() {
        let config: StudioConfig = serde_json::from_str(r#"{"defaultSize":"XL"}"#).unwrap();
        assert_eq!(config.default_size, "XL");
        assert_eq!(config.surface_width, 400);
    }

    #[test]
    fn segmentation_without_key_is_unavailable() {
        assert_eq!(SegmentationConfig::from_lookup(env(&[])).unwrap(), None);
        assert_eq!(
            SegmentationConfig::from_lookup(env(&[("PHOTOROOM_API_KEY", "  ")])).unwrap(),
            None
        );
    }

    #[test]
    fn segmentation_reads_overrides() {
        let config = SegmentationConfig::from_lookup(env(&[
            ("PHOTOROOM_API_KEY", "sk_test"),
            ("PHOTOROOM_TIMEOUT_SECS", "5"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.api_key, "sk_test");
        assert_eq!(config.api_url, DEFAULT_SEGMENTATION_URL);
        assert_eq!(config.timeout, Duration::from_secs(5));

        assert_matches!(
            SegmentationConfig::from_lookup(env(&[
                ("PHOTOROOM_API_KEY", "sk_test"),
                ("PHOTOROOM_TIMEOUT_SECS", "0"),
            ])),
            Err(StudioError::Config(_))
        );
    }
}
