//! Cart line items built from the current selection and composition.
//!
//! Pricing is the style's unit price, unmodified by color or size. Tax,
//! shipping and quantity merging belong to the cart collaborator.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::catalog::Selection;
use crate::error::{Result, StudioError};
use crate::layer::Layer;
use crate::raster::FlatImage;
use crate::surface::CompositionSurface;

/// Rules applied when a line item is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemPolicy {
    /// Fail with [`StudioError::EmptyComposition`] when the surface has no layers.
    pub require_layers: bool,
    /// Size recorded on the item.
    pub size_name: String,
}

impl Default for LineItemPolicy {
    fn default() -> Self {
        Self {
            require_layers: false,
            size_name: "M".to_string(),
        }
    }
}

impl LineItemPolicy {
    pub fn strict() -> Self {
        Self {
            require_layers: true,
            ..Self::default()
        }
    }
}

/// Where the customer's artwork sits on the garment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignPlacement {
    pub position_x: f32,
    pub position_y: f32,
    pub scale: f32,
    pub rotation_degrees: f32,
}

impl From<&Layer> for DesignPlacement {
    fn from(layer: &Layer) -> Self {
        let t = layer.transform();
        Self {
            position_x: t.position_x,
            position_y: t.position_y,
            scale: t.scale_x,
            rotation_degrees: t.rotation_degrees,
        }
    }
}

/// A priced, cart-ready design.
///
/// Serializes with camelCase keys and the composite as a PNG data URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub id: Uuid,
    pub product_reference: String,
    pub display_name: String,
    pub unit_price: u32,
    pub quantity: u32,
    pub color_name: String,
    pub size_name: String,
    pub style_name: String,
    #[serde(serialize_with = "serialize_data_url")]
    pub composite_image: FlatImage,
    /// Placement of the active layer, or the top-most one if none is active.
    pub design: Option<DesignPlacement>,
    pub created_at: DateTime<Utc>,
}

impl CartLineItem {
    /// Unit price times quantity.
    pub fn line_total(&self) -> u64 {
        u64::from(self.unit_price) * u64::from(self.quantity)
    }

    /// Items with equal keys are the same cart entry.
    pub fn cart_key(&self) -> (&str, &str, &str) {
        (&self.product_reference, &self.color_name, &self.size_name)
    }
}

fn serialize_data_url<S: Serializer>(
    image: &FlatImage,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let url = image
        .to_data_url()
        .map_err(<S::Error as serde::ser::Error>::custom)?;
    serializer.serialize_str(&url)
}

/// Builds a line item for `quantity` units of the current design.
///
/// `composite_image` is the surface's rasterization at call time.
pub fn build_line_item(
    selection: &Selection,
    surface: &CompositionSurface,
    quantity: u32,
    policy: &LineItemPolicy,
) -> Result<CartLineItem> {
    if quantity == 0 {
        return Err(StudioError::InvalidQuantity);
    }
    if policy.require_layers && surface.is_empty() {
        return Err(StudioError::EmptyComposition);
    }

    let composite_image = surface.rasterize()?;
    let design = surface
        .active_layer()
        .or_else(|| surface.layers().last())
        .map(DesignPlacement::from);

    let created_at = Utc::now();
    let Selection { style, color } = selection;
    let item = CartLineItem {
        id: Uuid::new_v4(),
        product_reference: format!("custom-{}", created_at.timestamp_millis()),
        display_name: format!("Custom {} - {}", style.display_name, color.display_name),
        unit_price: style.unit_price,
        quantity,
        color_name: color.display_name.clone(),
        size_name: policy.size_name.clone(),
        style_name: style.display_name.clone(),
        composite_image,
        design,
        created_at,
    };
    tracing::debug!(
        style = %style.id,
        color = %color.id,
        unit_price = item.unit_price,
        quantity,
        "Line item built"
    );
    Ok(item)
}

// ============================================================================
// Cart collaborator
// ============================================================================

/// Receives finished line items.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn add_line_item(&self, item: CartLineItem) -> Result<()>;
}

/// In-memory cart that merges items sharing a [`CartLineItem::cart_key`].
#[derive(Debug, Default)]
pub struct MemoryCart {
    items: Mutex<Vec<CartLineItem>>,
}

impl MemoryCart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<CartLineItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total_items(&self) -> u64 {
        self.items().iter().map(|i| u64::from(i.quantity)).sum()
    }

    pub fn total_price(&self) -> u64 {
        self.items().iter().map(CartLineItem::line_total).sum()
    }
}

#[async_trait]
impl CartStore for MemoryCart {
    async fn add_line_item(&self, item: CartLineItem) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = items.iter_mut().find(|i| i.cart_key() == item.cart_key()) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            items.push(item);
        }
        Ok(())
    }
}
