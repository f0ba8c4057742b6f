//! One customer's design session.
//!
//! `DesignSession` owns the selection, the asset snapshot and the surface,
//! and exposes the studio as explicit commands. Every selection change
//! re-resolves the garment background; the caller loads the referenced
//! asset and hands its bytes back through
//! [`attach_background_image`](DesignSession::attach_background_image).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::asset::{AssetSnapshot, ContentService, MatchQuality, resolve_with_quality};
use crate::catalog::{Catalog, Selection, SelectionChange, SelectionState};
use crate::config::StudioConfig;
use crate::error::{Result, StudioError};
use crate::export::{ShareContext, build_share_reference, export_as_file};
use crate::layer::{LayerId, LayerTransform, TransformPatch};
use crate::pricing::{CartLineItem, CartStore, LineItemPolicy, build_line_item};
use crate::profile::{DesignProfile, LayerSettings};
use crate::raster::FlatImage;
use crate::removal::BackgroundRemovalGateway;
use crate::segmentation::SegmentationService;
use crate::surface::{Background, CompositionSurface, SharedSurface, lock_surface};

// ============================================================================
// Configurable Trait
// ============================================================================

/// Trait for types that can be saved to and restored from a [`DesignProfile`].
pub trait Configurable {
    /// Replaces the current design with the profile's.
    ///
    /// Nothing changes unless the whole profile is valid.
    fn apply_profile(&mut self, profile: &DesignProfile) -> Result<()>;

    /// Exports the current design as a profile.
    fn export_profile(&self) -> DesignProfile;
}

// ============================================================================
// DesignSession
// ============================================================================

/// The studio state of one customer.
#[derive(Debug)]
pub struct DesignSession {
    id: Uuid,
    config: StudioConfig,
    policy: LineItemPolicy,
    selection: SelectionState,
    assets: AssetSnapshot,
    surface: SharedSurface,
}

impl DesignSession {
    /// Starts a session, fetching the garment assets once.
    pub async fn start(
        catalog: Arc<Catalog>,
        content: &dyn ContentService,
        config: StudioConfig,
    ) -> Result<Self> {
        config.validate()?;
        let assets = content.list_active_garment_assets().await?;
        Self::with_assets(catalog, AssetSnapshot::new(assets), config)
    }

    /// Starts a session against an already fetched asset snapshot.
    pub fn with_assets(
        catalog: Arc<Catalog>,
        assets: AssetSnapshot,
        config: StudioConfig,
    ) -> Result<Self> {
        let surface = CompositionSurface::new(config.surface_config()?)?.into_shared();
        let selection = SelectionState::new(catalog)?;
        let session = Self {
            id: Uuid::new_v4(),
            policy: config.line_item_policy(),
            config,
            selection,
            assets,
            surface,
        };
        session.refresh_background()?;
        tracing::info!(
            session_id = %session.id,
            assets = session.assets.len(),
            "Design session started"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn assets(&self) -> &AssetSnapshot {
        &self.assets
    }

    /// Handle for the background-removal gateway.
    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    /// Runs `f` against the surface under its lock.
    pub fn with_surface<R>(&self, f: impl FnOnce(&CompositionSurface) -> R) -> R {
        f(&*lock_surface(&self.surface))
    }

    // ---- selection ----

    pub fn selection(&self) -> Selection {
        self.selection.current_selection()
    }

    pub fn select_style(&mut self, style_id: &str) -> Result<SelectionChange> {
        let change = self.selection.select_style(style_id)?;
        if change.is_changed() {
            self.refresh_background()?;
        }
        Ok(change)
    }

    pub fn select_color(&mut self, color_id: &str) -> Result<SelectionChange> {
        let change = self.selection.select_color(color_id)?;
        if change.is_changed() {
            self.refresh_background()?;
        }
        Ok(change)
    }

    /// Reference of the garment asset the background wants loaded, if any.
    pub fn background_reference(&self) -> Option<String> {
        self.with_surface(|s| s.background_reference().map(str::to_string))
    }

    /// Supplies the pixels of the current garment asset. Stale references
    /// are ignored and return `Ok(false)`.
    pub fn attach_background_image(&mut self, reference: &str, bytes: &[u8]) -> Result<bool> {
        lock_surface(&self.surface).attach_background_image(reference, bytes)
    }

    fn refresh_background(&self) -> Result<()> {
        let style = self.selection.style();
        let color = self.selection.color();

        let background = match resolve_with_quality(self.assets.as_slice(), &style.id, &color.id) {
            Ok((asset, quality)) => {
                if quality != MatchQuality::Exact {
                    tracing::info!(
                        style = %style.id,
                        color = %color.id,
                        asset = %asset.id,
                        ?quality,
                        "No exact garment asset, using nearest match"
                    );
                }
                Background::asset(asset.image_reference.clone())
            }
            Err(StudioError::NoAssetsAvailable) => {
                tracing::warn!(
                    style = %style.id,
                    color = %color.id,
                    "No garment assets, showing placeholder"
                );
                Background::Placeholder {
                    color: color.srgb()?,
                }
            }
            Err(e) => return Err(e),
        };

        // Keep an already attached image when the asset did not change.
        let mut surface = lock_surface(&self.surface);
        let unchanged = background.reference().is_some()
            && surface.background_reference() == background.reference();
        if !unchanged {
            surface.set_background(background);
        }
        Ok(())
    }

    // ---- layers ----

    pub fn add_layer(&mut self, bytes: &[u8]) -> Result<LayerId> {
        lock_surface(&self.surface).add_layer(bytes)
    }

    /// Applies a partial transform update and returns the new transform.
    pub fn update_layer(&mut self, id: LayerId, patch: &TransformPatch) -> Result<LayerTransform> {
        lock_surface(&self.surface)
            .update_layer(id, patch)
            .map(|layer| *layer.transform())
    }

    pub fn select_layer(&mut self, id: LayerId) -> Result<()> {
        lock_surface(&self.surface).select_layer(id)
    }

    pub fn deselect(&mut self) {
        lock_surface(&self.surface).deselect();
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<()> {
        lock_surface(&self.surface).remove_layer(id).map(|_| ())
    }

    /// Removes every layer. The garment background for the current
    /// selection stays, including pixels already attached to it.
    pub fn clear(&mut self) -> Result<()> {
        lock_surface(&self.surface).clear_layers();
        self.refresh_background()
    }

    /// Runs background removal on the active layer.
    pub async fn remove_active_background<S: SegmentationService>(
        &self,
        gateway: &BackgroundRemovalGateway<S>,
        cancel: &CancellationToken,
    ) -> Result<LayerId> {
        gateway.remove_active_background(&self.surface, cancel).await
    }

    // ---- output ----

    pub fn rasterize(&self) -> Result<FlatImage> {
        self.with_surface(CompositionSurface::rasterize)
    }

    pub fn build_line_item(&self, quantity: u32) -> Result<CartLineItem> {
        let selection = self.selection();
        self.with_surface(|surface| build_line_item(&selection, surface, quantity, &self.policy))
    }

    /// Builds a line item and hands it to `cart`. Returns a copy of it.
    pub async fn add_to_cart(&self, cart: &dyn CartStore, quantity: u32) -> Result<CartLineItem> {
        let item = self.build_line_item(quantity)?;
        cart.add_line_item(item.clone()).await?;
        tracing::info!(
            session_id = %self.id,
            item_id = %item.id,
            unit_price = item.unit_price,
            quantity = item.quantity,
            "Design added to cart"
        );
        Ok(item)
    }

    pub fn export_file(&self) -> Result<Vec<u8>> {
        self.with_surface(export_as_file)
    }

    pub fn share_context(&self) -> ShareContext {
        ShareContext {
            base_url: self.config.share_base_url.clone(),
            session_id: self.id,
            style_id: self.selection.style().id.clone(),
            color_id: self.selection.color().id.clone(),
        }
    }

    pub fn share_reference(&self) -> String {
        build_share_reference(&self.share_context())
    }
}

impl Configurable for DesignSession {
    fn apply_profile(&mut self, profile: &DesignProfile) -> Result<()> {
        let layers = profile.load_layers()?;
        let mut selection = self.selection.clone();
        selection.select_style(&profile.style_id)?;
        selection.select_color(&profile.color_id)?;

        {
            let mut surface = lock_surface(&self.surface);
            surface.clear_layers();
            let ids: Vec<LayerId> = layers
                .into_iter()
                .map(|(image, transform)| surface.push_layer(image, transform))
                .collect();
            match profile.active_layer.and_then(|index| ids.get(index)) {
                Some(&id) => surface.select_layer(id)?,
                None => surface.deselect(),
            }
        }
        self.selection = selection;
        self.refresh_background()?;
        let resolved = self.background_reference();
        if profile.background_reference.is_some() && profile.background_reference != resolved {
            tracing::debug!(
                saved = ?profile.background_reference,
                resolved = ?resolved,
                "Profile garment asset differs from the resolved one"
            );
        }
        tracing::debug!(session_id = %self.id, layers = profile.layers.len(), "Profile applied");
        Ok(())
    }

    fn export_profile(&self) -> DesignProfile {
        let surface = lock_surface(&self.surface);
        let active = surface.active_layer_id();
        DesignProfile {
            background_reference: surface.background_reference().map(str::to_string),
            layers: surface.layers().iter().map(LayerSettings::from).collect(),
            active_layer: surface.layers().iter().position(|l| Some(l.id()) == active),
            ..DesignProfile::new(&self.selection.style().id, &self.selection.color().id)
        }
    }
}
