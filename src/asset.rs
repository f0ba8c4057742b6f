//! Garment preview assets and resolution of the best one for a selection.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

/// A content-managed preview image for one color/style combination.
///
/// Accepts the content service's field names (`name`, `url`, `color`,
/// `type`, `active`, `order`) as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarmentAsset {
    pub id: String,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(alias = "url")]
    pub image_reference: String,
    #[serde(alias = "color")]
    pub color_id: String,
    #[serde(alias = "type")]
    pub style_id: String,
    #[serde(alias = "active", default = "default_true")]
    pub is_active: bool,
    #[serde(alias = "order", default)]
    pub sort_order: i32,
}

fn default_true() -> bool {
    true
}

impl GarmentAsset {
    /// Total order used for every tie-break: `sort_order`, then `id`.
    fn display_order(&self, other: &Self) -> Ordering {
        self.sort_order
            .cmp(&other.sort_order)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Read-only asset list fetched once per session and shared freely.
#[derive(Debug, Clone, Default)]
pub struct AssetSnapshot {
    assets: Arc<[GarmentAsset]>,
}

impl AssetSnapshot {
    pub fn new(assets: Vec<GarmentAsset>) -> Self {
        Self {
            assets: assets.into(),
        }
    }

    pub fn as_slice(&self) -> &[GarmentAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Resolves against this snapshot. See [`resolve`].
    pub fn resolve(&self, style_id: &str, color_id: &str) -> Result<&GarmentAsset> {
        resolve(&self.assets, style_id, color_id)
    }
}

/// Which step of the degradation ladder produced an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    /// Both color and style matched.
    Exact,
    /// Only the color matched.
    Color,
    /// Only the style matched.
    Style,
    /// Neither matched; first active asset overall.
    Fallback,
}

/// Resolves the garment preview for a selection.
///
/// 1. Active assets matching both color and style.
/// 2. Else active assets matching the color or the style.
/// 3. Else every active asset.
///
/// Within a step the lowest `(sort_order, id)` wins, except that in step 2
/// a color match beats a style match at equal `sort_order`. Inactive assets are
/// never returned; if no active asset exists the call fails with
/// [`StudioError::NoAssetsAvailable`].
pub fn resolve<'a>(
    assets: &'a [GarmentAsset],
    style_id: &str,
    color_id: &str,
) -> Result<&'a GarmentAsset> {
    resolve_with_quality(assets, style_id, color_id).map(|(asset, _)| asset)
}

/// Like [`resolve`], also reporting which step matched.
pub fn resolve_with_quality<'a>(
    assets: &'a [GarmentAsset],
    style_id: &str,
    color_id: &str,
) -> Result<(&'a GarmentAsset, MatchQuality)> {
    let active = || assets.iter().filter(|a| a.is_active);

    if let Some(exact) = active()
        .filter(|a| a.color_id == color_id && a.style_id == style_id)
        .min_by(|a, b| a.display_order(b))
    {
        return Ok((exact, MatchQuality::Exact));
    }

    // Partial matches compete on sort order; at equal sort order a color
    // match outranks a style match.
    let partial = active()
        .filter(|a| a.color_id == color_id || a.style_id == style_id)
        .min_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| (b.color_id == color_id).cmp(&(a.color_id == color_id)))
                .then_with(|| a.id.cmp(&b.id))
        });
    if let Some(asset) = partial {
        let quality = if asset.color_id == color_id {
            MatchQuality::Color
        } else {
            MatchQuality::Style
        };
        return Ok((asset, quality));
    }

    active()
        .min_by(|a, b| a.display_order(b))
        .map(|asset| (asset, MatchQuality::Fallback))
        .ok_or(StudioError::NoAssetsAvailable)
}

/// Read-only source of garment assets.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Lists the active garment assets. Called once per session start.
    async fn list_active_garment_assets(&self) -> Result<Vec<GarmentAsset>>;
}

/// A content service backed by a fixed list.
#[async_trait]
impl ContentService for AssetSnapshot {
    async fn list_active_garment_assets(&self) -> Result<Vec<GarmentAsset>> {
        Ok(self.assets.iter().filter(|a| a.is_active).cloned().collect())
    }
}
