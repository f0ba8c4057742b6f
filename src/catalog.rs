//! Static style/color catalog and the per-session selection state.
//!
//! The [`Catalog`] is injected configuration: loaded once, never mutated,
//! and shared between sessions behind an `Arc`. [`SelectionState`] tracks
//! which style and color one session currently has chosen.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use palette::Srgb;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectionKind, StudioError};

// ============================================================================
// Catalog entries
// ============================================================================

/// A garment style with its unit price (whole currency units).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleOption {
    pub id: String,
    pub display_name: String,
    pub unit_price: u32,
}

impl StyleOption {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, unit_price: u32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            unit_price,
        }
    }
}

/// A garment color. `color_value` is a `#rrggbb` hex string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorOption {
    pub id: String,
    pub display_name: String,
    pub color_value: String,
}

impl ColorOption {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        color_value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            color_value: color_value.into(),
        }
    }

    /// Parses `color_value` into an sRGB color.
    pub fn srgb(&self) -> Result<Srgb<u8>> {
        parse_hex_color(&self.color_value)
    }
}

/// Parses a `#rrggbb` (or `#rgb`) hex color.
pub fn parse_hex_color(value: &str) -> Result<Srgb<u8>> {
    Srgb::from_str(value.trim())
        .map_err(|e| StudioError::InvalidCatalog(format!("bad color value {value:?}: {e}")))
}

// ============================================================================
// Catalog
// ============================================================================

/// The read-only set of styles and colors a session may choose from.
///
/// The first style and the first color form the initial selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub styles: Vec<StyleOption>,
    pub colors: Vec<ColorOption>,
}

impl Catalog {
    /// Builds and validates a catalog.
    pub fn new(styles: Vec<StyleOption>, colors: Vec<ColorOption>) -> Result<Self> {
        let catalog = Self { styles, colors };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The stock storefront catalog.
    pub fn storefront() -> Self {
        Self {
            styles: vec![
                StyleOption::new("round-neck", "Round Neck", 499),
                StyleOption::new("v-neck", "V-Neck", 549),
                StyleOption::new("collar", "Polo Collar", 699),
                StyleOption::new("long-sleeve", "Long Sleeve", 649),
                StyleOption::new("oversize", "Oversize", 599),
                StyleOption::new("crop", "Crop Top", 449),
            ],
            colors: vec![
                ColorOption::new("red", "Classic Red", "#dc2626"),
                ColorOption::new("ruddy", "Ruddy", "#ea5a3d"),
                ColorOption::new("black", "Midnight Black", "#000000"),
                ColorOption::new("white", "Pure White", "#ffffff"),
                ColorOption::new("navy", "Navy Blue", "#1e3a8a"),
                ColorOption::new("gray", "Cool Gray", "#6b7280"),
                ColorOption::new("green", "Forest Green", "#16a34a"),
                ColorOption::new("yellow", "Sunny Yellow", "#facc15"),
                ColorOption::new("purple", "Royal Purple", "#9333ea"),
                ColorOption::new("pink", "Blush Pink", "#f472b6"),
            ],
        }
    }

    /// Deserializes and validates a catalog from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|e| StudioError::InvalidCatalog(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Serializes the catalog to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| StudioError::InvalidCatalog(e.to_string()))
    }

    /// Checks for empty lists, duplicate ids and unparseable colors.
    pub fn validate(&self) -> Result<()> {
        if self.styles.is_empty() {
            return Err(StudioError::InvalidCatalog("no styles".into()));
        }
        if self.colors.is_empty() {
            return Err(StudioError::InvalidCatalog("no colors".into()));
        }

        let mut seen = HashSet::new();
        for style in &self.styles {
            if !seen.insert(style.id.as_str()) {
                return Err(StudioError::InvalidCatalog(format!(
                    "duplicate style id {:?}",
                    style.id
                )));
            }
        }

        seen.clear();
        for color in &self.colors {
            if !seen.insert(color.id.as_str()) {
                return Err(StudioError::InvalidCatalog(format!(
                    "duplicate color id {:?}",
                    color.id
                )));
            }
            color.srgb()?;
        }
        Ok(())
    }

    pub fn style(&self, id: &str) -> Option<&StyleOption> {
        self.styles.iter().find(|s| s.id == id)
    }

    pub fn color(&self, id: &str) -> Option<&ColorOption> {
        self.colors.iter().find(|c| c.id == id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::storefront()
    }
}

// ============================================================================
// Selection
// ============================================================================

/// A resolved (style, color) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub style: StyleOption,
    pub color: ColorOption,
}

/// Whether a selector call changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    Changed,
    Unchanged,
}

impl SelectionChange {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// The style and color one session currently has chosen.
///
/// Indices always point into the shared catalog, so a selection can never
/// name an entry the catalog does not contain.
#[derive(Debug, Clone)]
pub struct SelectionState {
    catalog: Arc<Catalog>,
    style: usize,
    color: usize,
}

impl SelectionState {
    /// Starts on the catalog's first style and first color.
    ///
    /// Fails if the catalog does not validate.
    pub fn new(catalog: Arc<Catalog>) -> Result<Self> {
        catalog.validate()?;
        Ok(Self {
            catalog,
            style: 0,
            color: 0,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Selects a style by id. Unknown ids leave the state unchanged.
    pub fn select_style(&mut self, style_id: &str) -> Result<SelectionChange> {
        let index = self
            .catalog
            .styles
            .iter()
            .position(|s| s.id == style_id)
            .ok_or_else(|| StudioError::InvalidSelection {
                kind: SelectionKind::Style,
                id: style_id.to_string(),
            })?;

        if index == self.style {
            return Ok(SelectionChange::Unchanged);
        }
        self.style = index;
        tracing::debug!(style = style_id, "Style selected");
        Ok(SelectionChange::Changed)
    }

    /// Selects a color by id. Unknown ids leave the state unchanged.
    pub fn select_color(&mut self, color_id: &str) -> Result<SelectionChange> {
        let index = self
            .catalog
            .colors
            .iter()
            .position(|c| c.id == color_id)
            .ok_or_else(|| StudioError::InvalidSelection {
                kind: SelectionKind::Color,
                id: color_id.to_string(),
            })?;

        if index == self.color {
            return Ok(SelectionChange::Unchanged);
        }
        self.color = index;
        tracing::debug!(color = color_id, "Color selected");
        Ok(SelectionChange::Changed)
    }

    pub fn style(&self) -> &StyleOption {
        &self.catalog.styles[self.style]
    }

    pub fn color(&self) -> &ColorOption {
        &self.catalog.colors[self.color]
    }

    pub fn current_selection(&self) -> Selection {
        Selection {
            style: self.style().clone(),
            color: self.color().clone(),
        }
    }
}
