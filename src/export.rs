//! Downloadable exports and share references.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::surface::CompositionSurface;

/// Suggested file name for exported designs.
pub const EXPORT_FILE_NAME: &str = "garment-design.png";

/// Encodes the surface's current rasterization as PNG.
pub fn export_as_file(surface: &CompositionSurface) -> Result<Vec<u8>> {
    let png = surface.rasterize()?.to_png()?;
    tracing::debug!(bytes = png.len(), revision = surface.revision(), "Design exported");
    Ok(png)
}

/// Everything a share reference is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareContext {
    pub base_url: String,
    pub session_id: Uuid,
    pub style_id: String,
    pub color_id: String,
}

/// Builds `<base_url>/design/<session id>?style=<id>&color=<id>`.
///
/// The result depends only on `context`.
pub fn build_share_reference(context: &ShareContext) -> String {
    format!(
        "{}/design/{}?style={}&color={}",
        context.base_url.trim_end_matches('/'),
        context.session_id,
        urlencoding::encode(&context.style_id),
        urlencoding::encode(&context.color_id),
    )
}
