//! The composition surface: background plus an ordered stack of layers.
//!
//! A [`CompositionSurface`] is an in-memory, synchronous model. It is only
//! mutated through its own methods and has a single writer: the session
//! that owns it. When the background-removal gateway needs to reach it
//! across an `.await`, the surface is shared as a [`SharedSurface`] whose
//! lock is held only for the synchronous steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};
use palette::Srgb;

use crate::error::{Result, StudioError};
use crate::layer::composite::{draw_contained, draw_transformed};
use crate::layer::svg::render_placeholder;
use crate::layer::{Layer, LayerId, LayerTransform, OriginMode, TransformPatch};
use crate::raster::{FlatImage, ImageData, SizePx};

/// Default fraction of the surface's shorter side a new layer's longer side fills.
pub const DEFAULT_FIT_FRACTION: f32 = 0.5;

/// A surface shared between its owning session and the removal gateway.
pub type SharedSurface = Arc<Mutex<CompositionSurface>>;

/// Locks a shared surface. A poisoned lock still yields the surface: every
/// mutation is applied in one step, so the state behind it is consistent.
pub fn lock_surface(surface: &SharedSurface) -> MutexGuard<'_, CompositionSurface> {
    surface.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SurfaceConfig
// ============================================================================

/// Fixed properties of a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceConfig {
    /// Native resolution width in pixels.
    pub width: u32,
    /// Native resolution height in pixels.
    pub height: u32,
    /// Fraction (0.0-1.0] of the shorter surface side that a new layer's
    /// longer side is scaled to.
    pub fit_fraction: f32,
    /// Fill color underneath everything else.
    pub base_color: Srgb<u8>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 400,
            height: 400,
            fit_fraction: DEFAULT_FIT_FRACTION,
            base_color: Srgb::new(0xf3, 0xf4, 0xf6),
        }
    }
}

impl SurfaceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StudioError::Config(format!(
                "surface size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.fit_fraction > 0.0 && self.fit_fraction <= 1.0) {
            return Err(StudioError::Config(format!(
                "fit fraction must be in (0, 1], got {}",
                self.fit_fraction
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Background
// ============================================================================

/// What is drawn underneath the layers.
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// Only the base color.
    None,
    /// The built-in garment silhouette in the given color.
    Placeholder { color: Srgb<u8> },
    /// A garment asset from the content service. `image` stays `None`
    /// until a caller attaches the decoded pixels.
    Asset {
        reference: String,
        image: Option<Arc<RgbaImage>>,
    },
}

impl Background {
    pub fn asset(reference: impl Into<String>) -> Self {
        Self::Asset {
            reference: reference.into(),
            image: None,
        }
    }

    /// The asset reference, if this is an asset background.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Asset { reference, .. } => Some(reference),
            _ => None,
        }
    }
}

// ============================================================================
// In-flight removal slot
// ============================================================================

/// Proof that the caller holds the surface's single background-removal slot.
///
/// Dropping the ticket releases the slot, whatever path the removal took.
#[derive(Debug)]
pub(crate) struct RemovalTicket {
    pub layer_id: LayerId,
    pub source: ImageData,
    slot: SlotGuard,
}

#[derive(Debug)]
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// CompositionSurface
// ============================================================================

/// The editable canvas of one design session.
#[derive(Debug)]
pub struct CompositionSurface {
    config: SurfaceConfig,
    background: Background,
    layers: Vec<Layer>,
    active: Option<LayerId>,
    next_id: u64,
    revision: u64,
    removal_slot: Arc<AtomicBool>,
}

impl CompositionSurface {
    pub fn new(config: SurfaceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            background: Background::None,
            layers: Vec::new(),
            active: None,
            next_id: 1,
            revision: 0,
            removal_slot: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Wraps the surface for sharing with the removal gateway.
    pub fn into_shared(self) -> SharedSurface {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn size(&self) -> SizePx {
        SizePx::new(self.config.width, self.config.height)
    }

    /// Counter bumped by every successful mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // ---- background ----

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn background_reference(&self) -> Option<&str> {
        self.background.reference()
    }

    pub fn set_background(&mut self, background: Background) {
        if self.background != background {
            self.background = background;
            self.bump();
        }
    }

    /// Supplies the pixels for the current asset background.
    ///
    /// Returns `Ok(false)` without decoding if `reference` is no longer the
    /// current background (the selection moved on while it was loading).
    pub fn attach_background_image(&mut self, reference: &str, bytes: &[u8]) -> Result<bool> {
        if self.background_reference() != Some(reference) {
            return Ok(false);
        }
        let decoded = ImageData::decode(bytes)?;
        self.background = Background::Asset {
            reference: reference.to_string(),
            image: Some(Arc::new(decoded.pixels().clone())),
        };
        self.bump();
        Ok(true)
    }

    // ---- layers ----

    /// Layers in z-order (first is drawn first).
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or(StudioError::LayerNotFound(id))
    }

    pub fn active_layer_id(&self) -> Option<LayerId> {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.layer(id))
    }

    /// Decodes an upload and places it as a new, active layer.
    pub fn add_layer(&mut self, bytes: &[u8]) -> Result<LayerId> {
        let image = ImageData::decode(bytes)?;
        Ok(self.add_image(image))
    }

    /// Places already-decoded image data as a new, active layer.
    ///
    /// The layer is centered, and scaled uniformly so its longer side spans
    /// `fit_fraction` of the surface's shorter side.
    pub fn add_image(&mut self, image: ImageData) -> LayerId {
        let transform = self.default_placement(image.dimensions());
        self.push_layer(image, transform)
    }

    pub(crate) fn push_layer(&mut self, image: ImageData, transform: LayerTransform) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.push(Layer::new(id, image, transform));
        self.active = Some(id);
        self.bump();
        tracing::debug!(layer_id = %id, revision = self.revision, "Layer added");
        id
    }

    fn default_placement(&self, image: SizePx) -> LayerTransform {
        let target = self.config.fit_fraction * self.size().shorter_side() as f32;
        let scale = target / image.longer_side().max(1) as f32;
        LayerTransform {
            position_x: self.config.width as f32 / 2.0,
            position_y: self.config.height as f32 / 2.0,
            scale_x: scale,
            scale_y: scale,
            rotation_degrees: 0.0,
            origin: OriginMode::Center,
        }
    }

    /// Applies a partial transform update.
    pub fn update_layer(&mut self, id: LayerId, patch: &TransformPatch) -> Result<&Layer> {
        let layer = self.layer_mut(id)?;
        let transform = layer.transform().patched(patch);
        transform.validate()?;
        layer.set_transform(transform);
        self.bump();
        tracing::debug!(layer_id = %id, revision = self.revision, "Layer transform updated");
        self.layer(id).ok_or(StudioError::LayerNotFound(id))
    }

    /// Makes `id` the active layer.
    pub fn select_layer(&mut self, id: LayerId) -> Result<()> {
        if self.layer(id).is_none() {
            return Err(StudioError::LayerNotFound(id));
        }
        if self.active != Some(id) {
            self.active = Some(id);
            self.bump();
        }
        Ok(())
    }

    pub fn deselect(&mut self) {
        if self.active.take().is_some() {
            self.bump();
        }
    }

    /// Removes a layer. If it was active, no layer is active afterwards.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<Layer> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or(StudioError::LayerNotFound(id))?;
        let removed = self.layers.remove(index);
        if self.active == Some(id) {
            self.active = None;
        }
        self.bump();
        tracing::debug!(layer_id = %id, revision = self.revision, "Layer removed");
        Ok(removed)
    }

    /// Removes every layer and the selection. The background stays.
    pub fn clear_layers(&mut self) {
        if self.layers.is_empty() && self.active.is_none() {
            return;
        }
        self.layers.clear();
        self.active = None;
        self.bump();
        tracing::debug!(revision = self.revision, "Layers cleared");
    }

    /// Removes every layer and the background.
    pub fn clear(&mut self) {
        if self.layers.is_empty() && self.active.is_none() && self.background == Background::None {
            return;
        }
        self.layers.clear();
        self.active = None;
        self.background = Background::None;
        self.bump();
        tracing::debug!(revision = self.revision, "Surface cleared");
    }

    // ---- rendering ----

    /// Renders the background and every layer, in insertion order, into a
    /// flat bitmap at the surface's native resolution.
    pub fn rasterize(&self) -> Result<FlatImage> {
        let SurfaceConfig {
            width,
            height,
            base_color,
            ..
        } = self.config;
        let base = Rgba([base_color.red, base_color.green, base_color.blue, 255]);
        let mut canvas = RgbaImage::from_pixel(width, height, base);

        match &self.background {
            Background::None | Background::Asset { image: None, .. } => {}
            Background::Placeholder { color } => {
                let garment = render_placeholder(*color, width.min(height)).ok_or_else(|| {
                    StudioError::RasterizeFailed("placeholder garment did not render".into())
                })?;
                draw_contained(&mut canvas, &garment);
            }
            Background::Asset {
                image: Some(image), ..
            } => draw_contained(&mut canvas, image),
        }

        for layer in &self.layers {
            draw_transformed(&mut canvas, layer.image().pixels(), layer.transform());
        }

        Ok(FlatImage::new(canvas))
    }

    // ---- background removal hand-off ----

    /// Claims the removal slot and snapshots the layer's source image.
    pub(crate) fn begin_removal(&self, id: LayerId) -> Result<RemovalTicket> {
        if self
            .removal_slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StudioError::OperationInProgress);
        }
        let slot = SlotGuard(Arc::clone(&self.removal_slot));

        let layer = self.layer(id).ok_or(StudioError::NoActiveLayer)?;
        Ok(RemovalTicket {
            layer_id: id,
            source: layer.image().clone(),
            slot,
        })
    }

    /// Replaces the ticket's layer image, leaving its transform untouched.
    ///
    /// Fails with [`StudioError::LayerNotFound`], changing nothing, if the
    /// layer was removed while the request was in flight.
    pub(crate) fn commit_removal(&mut self, ticket: RemovalTicket, image: ImageData) -> Result<()> {
        let RemovalTicket { layer_id, slot, .. } = ticket;
        let layer = self.layer_mut(layer_id)?;
        layer.replace_image(image);
        self.bump();
        drop(slot);
        tracing::debug!(layer_id = %layer_id, revision = self.revision, "Layer image replaced");
        Ok(())
    }

    /// True while a background removal holds the slot.
    pub fn removal_in_progress(&self) -> bool {
        self.removal_slot.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::tests::solid_png;
    use assert_matches::assert_matches;

    fn surface() -> CompositionSurface {
        CompositionSurface::new(SurfaceConfig::default()).unwrap()
    }

    #[test]
    fn add_layer_centers_and_fits_half_of_shorter_side() {
        let mut surface = surface();
        let id = surface
            .add_layer(&solid_png(1000, 500, [0, 0, 0, 255]))
            .unwrap();

        let layer = surface.layer(id).unwrap();
        let t = layer.transform();
        assert_eq!(t.scale_x, t.scale_y);
        assert_eq!((t.position_x, t.position_y), (200.0, 200.0));
        assert_eq!(t.origin, OriginMode::Center);

        let (w, h) = layer.displayed_size();
        assert!((w - 200.0).abs() < 1e-3, "width was {w}");
        assert!((h - 100.0).abs() < 1e-3, "height was {h}");
        assert_eq!(surface.active_layer_id(), Some(id));
    }

    #[test]
    fn add_layer_rejects_invalid_bytes() {
        let mut surface = surface();
        assert_matches!(surface.add_layer(b"GIF? no"), Err(StudioError::InvalidImageData(_)));
        assert!(surface.is_empty());
        assert_eq!(surface.revision(), 0);
    }

    #[test]
    fn update_with_stale_id_fails() {
        let mut surface = surface();
        let id = surface.add_layer(&solid_png(10, 10, [0, 0, 0, 255])).unwrap();
        surface.remove_layer(id).unwrap();

        assert_matches!(
            surface.update_layer(id, &TransformPatch::rotate_to(45.0)),
            Err(StudioError::LayerNotFound(stale)) if stale == id
        );
    }

    #[test]
    fn invalid_patch_leaves_transform_unchanged() {
        let mut surface = surface();
        let id = surface.add_layer(&solid_png(10, 10, [0, 0, 0, 255])).unwrap();
        let before = *surface.layer(id).unwrap().transform();

        let result = surface.update_layer(id, &TransformPatch::uniform_scale(-1.0));
        assert_matches!(result, Err(StudioError::InvalidTransform(_)));
        assert_eq!(*surface.layer(id).unwrap().transform(), before);
    }

    #[test]
    fn removing_active_layer_clears_selection() {
        let mut surface = surface();
        let first = surface.add_layer(&solid_png(10, 10, [1, 1, 1, 255])).unwrap();
        let second = surface.add_layer(&solid_png(10, 10, [2, 2, 2, 255])).unwrap();
        assert_eq!(surface.active_layer_id(), Some(second));

        surface.remove_layer(first).unwrap();
        assert_eq!(surface.active_layer_id(), Some(second));

        surface.remove_layer(second).unwrap();
        assert_eq!(surface.active_layer_id(), None);
    }

    #[test]
    fn ids_are_never_reused_after_clear() {
        let mut surface = surface();
        let before = surface.add_layer(&solid_png(4, 4, [0, 0, 0, 255])).unwrap();
        surface.clear();
        let after = surface.add_layer(&solid_png(4, 4, [0, 0, 0, 255])).unwrap();
        assert_ne!(before, after);
        assert!(surface.layer(before).is_none());
    }

    #[test]
    fn clear_layers_keeps_attached_background() {
        let mut surface = surface();
        surface.set_background(Background::asset("/garment.png".to_string()));
        assert!(
            surface
                .attach_background_image("/garment.png", &solid_png(400, 400, [10, 20, 30, 255]))
                .unwrap()
        );
        surface.add_layer(&solid_png(20, 20, [255, 0, 0, 255])).unwrap();

        surface.clear_layers();
        let revision = surface.revision();
        surface.clear_layers();

        assert!(surface.is_empty());
        assert_eq!(surface.active_layer_id(), None);
        assert_eq!(surface.revision(), revision);
        assert_matches!(surface.background(), Background::Asset { image: Some(_), .. });
        let flat = surface.rasterize().unwrap();
        assert_eq!(flat.data.get_pixel(200, 200).0, [10, 20, 30, 255]);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut surface = surface();
        surface.set_background(Background::asset("/uploads/white-tshirt.png"));
        surface.add_layer(&solid_png(10, 10, [0, 0, 0, 255])).unwrap();

        surface.clear();
        let once = (
            surface.layers().len(),
            surface.active_layer_id(),
            surface.background().clone(),
        );
        let revision = surface.revision();
        let raster = surface.rasterize().unwrap();

        surface.clear();
        assert_eq!(
            (surface.layers().len(), surface.active_layer_id(), surface.background().clone()),
            once
        );
        assert_eq!(once, (0, None, Background::None));
        assert_eq!(surface.revision(), revision);
        assert_eq!(surface.rasterize().unwrap(), raster);
    }

    #[test]
    fn rasterize_depends_only_on_current_state() {
        let red = solid_png(40, 20, [255, 0, 0, 255]);
        let blue = solid_png(20, 40, [0, 0, 255, 200]);

        // Direct path.
        let mut a = surface();
        a.add_layer(&red).unwrap();
        a.add_layer(&blue).unwrap();

        // Roundabout path reaching the same layers.
        let mut b = surface();
        let scratch = b.add_layer(&blue).unwrap();
        b.add_layer(&red).unwrap();
        b.remove_layer(scratch).unwrap();
        b.add_layer(&blue).unwrap();
        b.deselect();

        assert_eq!(a.rasterize().unwrap(), b.rasterize().unwrap());
    }

    #[test]
    fn far_offscreen_layer_rasterizes_to_an_empty_surface() {
        let mut surface = surface();
        let empty = surface.rasterize().unwrap();
        let id = surface.add_layer(&solid_png(10, 10, [255, 0, 0, 255])).unwrap();
        surface
            .update_layer(
                id,
                &TransformPatch::uniform_scale(1.0).merge(TransformPatch::move_to(3.0e9, 200.0)),
            )
            .unwrap();

        assert_eq!(surface.rasterize().unwrap(), empty);
    }

    #[test]
    fn rasterize_uses_base_color_and_native_size() {
        let surface = surface();
        let flat = surface.rasterize().unwrap();
        assert_eq!(flat.dimensions(), SizePx::new(400, 400));
        assert_eq!(flat.data.get_pixel(0, 0).0, [0xf3, 0xf4, 0xf6, 255]);
    }

    #[test]
    fn layers_draw_in_insertion_order() {
        let mut surface = surface();
        surface.add_layer(&solid_png(100, 100, [255, 0, 0, 255])).unwrap();
        surface.add_layer(&solid_png(100, 100, [0, 255, 0, 255])).unwrap();

        let flat = surface.rasterize().unwrap();
        assert_eq!(flat.data.get_pixel(200, 200).0, [0, 255, 0, 255]);
    }

    #[test]
    fn placeholder_background_paints_garment() {
        let mut surface = surface();
        surface.set_background(Background::Placeholder {
            color: Srgb::new(0x16, 0xa3, 0x4a),
        });
        let flat = surface.rasterize().unwrap();
        let torso = flat.data.get_pixel(200, 220);
        assert!(torso[1] > torso[0] && torso[1] > torso[2], "torso should be green: {torso:?}");
    }

    #[test]
    fn attach_background_image_ignores_stale_reference() {
        let mut surface = surface();
        surface.set_background(Background::asset("/uploads/navy.png"));

        let png = solid_png(8, 8, [0, 0, 0, 255]);
        assert!(!surface.attach_background_image("/uploads/black.png", &png).unwrap());
        assert!(surface.attach_background_image("/uploads/navy.png", &png).unwrap());

        let flat = surface.rasterize().unwrap();
        assert_eq!(flat.data.get_pixel(200, 200).0, [0, 0, 0, 255]);
    }

    #[test]
    fn removal_slot_is_exclusive_and_released_on_drop() {
        let mut surface = surface();
        let id = surface.add_layer(&solid_png(10, 10, [0, 0, 0, 255])).unwrap();

        let ticket = surface.begin_removal(id).unwrap();
        assert!(surface.removal_in_progress());
        assert_matches!(surface.begin_removal(id), Err(StudioError::OperationInProgress));

        drop(ticket);
        assert!(!surface.removal_in_progress());
        assert!(surface.begin_removal(id).is_ok());
    }

    #[test]
    fn begin_removal_on_missing_layer_releases_slot() {
        let surface = surface();
        assert_matches!(surface.begin_removal(LayerId(99)), Err(StudioError::NoActiveLayer));
        assert!(!surface.removal_in_progress());
    }

    #[test]
    fn commit_keeps_transform() {
        let mut surface = surface();
        let id = surface.add_layer(&solid_png(10, 10, [0, 0, 0, 255])).unwrap();
        surface
            .update_layer(id, &TransformPatch::rotate_to(30.0))
            .unwrap();
        let before = *surface.layer(id).unwrap().transform();

        let ticket = surface.begin_removal(id).unwrap();
        let processed = ImageData::decode(&solid_png(10, 10, [0, 0, 0, 0])).unwrap();
        surface.commit_removal(ticket, processed.clone()).unwrap();

        let layer = surface.layer(id).unwrap();
        assert_eq!(*layer.transform(), before);
        assert_eq!(layer.image(), &processed);
        assert!(!surface.removal_in_progress());
    }

    #[test]
    fn commit_after_layer_removed_changes_nothing() {
        let mut surface = surface();
        let id = surface.add_layer(&solid_png(10, 10, [0, 0, 0, 255])).unwrap();
        let ticket = surface.begin_removal(id).unwrap();
        surface.clear();
        let revision = surface.revision();

        let processed = ImageData::decode(&solid_png(10, 10, [0, 0, 0, 0])).unwrap();
        assert_matches!(
            surface.commit_removal(ticket, processed),
            Err(StudioError::LayerNotFound(_))
        );
        assert_eq!(surface.revision(), revision);
        assert!(!surface.removal_in_progress());
    }

    #[test]
    fn config_validation() {
        let bad = SurfaceConfig {
            fit_fraction: 0.0,
            ..SurfaceConfig::default()
        };
        assert_matches!(CompositionSurface::new(bad), Err(StudioError::Config(_)));

        let bad = SurfaceConfig {
            width: 0,
            ..SurfaceConfig::default()
        };
        assert!(CompositionSurface::new(bad).is_err());
    }
}
