//! tee-studio: design studio core for custom apparel
//!
//! This crate turns a customer's garment style, color and uploaded artwork
//! into a priced, cart-ready line item. It resolves the garment preview
//! from content-managed assets, composes artwork layers on a fixed-size
//! surface, removes image backgrounds through a segmentation service, and
//! rasterizes the result for the cart or for download.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tee_studio::{AssetSnapshot, Catalog, DesignSession, StudioConfig, TransformPatch};
//!
//! let mut session = DesignSession::with_assets(
//!     Arc::new(Catalog::storefront()),
//!     AssetSnapshot::default(),
//!     StudioConfig::default(),
//! )
//! .unwrap();
//!
//! session.select_style("v-neck").unwrap();
//! session.select_color("navy").unwrap();
//!
//! # let artwork = {
//! #     let img = image::RgbaImage::from_pixel(64, 32, image::Rgba([255, 0, 0, 255]));
//! #     let mut buf = Vec::new();
//! #     img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
//! #     buf
//! # };
//! let layer = session.add_layer(&artwork).unwrap();
//! session.update_layer(layer, &TransformPatch::rotate_to(15.0)).unwrap();
//!
//! let item = session.build_line_item(1).unwrap();
//! assert_eq!(item.unit_price, 549);
//!
//! let png = session.export_file().unwrap();
//! let link = session.share_reference();
//! # let _ = (png, link);
//! ```
//!
//! # Serializable Profiles
//!
//! To save or share a design, use [`DesignProfile`] with the
//! [`Configurable`] trait:
//!
//! ```
//! use std::sync::Arc;
//! use tee_studio::{
//!     AssetSnapshot, Catalog, Configurable, DesignProfile, DesignSession, StudioConfig,
//! };
//!
//! let catalog = Arc::new(Catalog::storefront());
//! let mut session =
//!     DesignSession::with_assets(catalog, AssetSnapshot::default(), StudioConfig::default())
//!         .unwrap();
//!
//! session.apply_profile(&DesignProfile::new("crop", "pink")).unwrap();
//!
//! let json = session.export_profile().to_json().unwrap();
//! ```

mod asset;
mod catalog;
mod config;
mod error;
mod export;
mod layer;
mod pricing;
mod profile;
mod raster;
mod removal;
mod segmentation;
mod session;
mod surface;

pub use asset::{
    AssetSnapshot, ContentService, GarmentAsset, MatchQuality, resolve, resolve_with_quality,
};
pub use catalog::{
    Catalog, ColorOption, Selection, SelectionChange, SelectionState, StyleOption, parse_hex_color,
};
pub use config::{DEFAULT_SEGMENTATION_URL, SegmentationConfig, StudioConfig};
pub use error::{RemovalFailure, Result, SelectionKind, StudioError};
pub use export::{EXPORT_FILE_NAME, ShareContext, build_share_reference, export_as_file};
pub use layer::svg::{darken_color, render_placeholder};
pub use layer::{Layer, LayerId, LayerTransform, OriginMode, TransformPatch};
pub use pricing::{
    CartLineItem, CartStore, DesignPlacement, LineItemPolicy, MemoryCart, build_line_item,
};
pub use profile::{DesignProfile, LayerSettings, PROFILE_VERSION};
pub use raster::{FlatImage, ImageData, SizePx};
pub use removal::{BackgroundRemovalGateway, DEFAULT_REMOVAL_TIMEOUT};
pub use segmentation::{PhotoroomClient, SegmentationError, SegmentationService};
pub use session::{Configurable, DesignSession};
pub use surface::{
    Background, CompositionSurface, DEFAULT_FIT_FRACTION, SharedSurface, SurfaceConfig,
    lock_surface,
};
