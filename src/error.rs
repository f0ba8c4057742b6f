//! Error taxonomy for the design studio core.
//!
//! Every failure is local to one operation and leaves prior state intact.

use std::fmt;

use crate::layer::LayerId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StudioError>;

/// Which half of a selection an invalid id referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Style,
    Color,
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Style => f.write_str("style"),
            Self::Color => f.write_str("color"),
        }
    }
}

/// Why a background removal did not change the layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemovalFailure {
    /// The segmentation service answered with a structured error.
    #[error("service error ({code}): {message}")]
    Service { code: String, message: String },

    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered 2xx but the payload was not a usable image.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The caller cancelled the request.
    #[error("cancelled")]
    Cancelled,

    /// The request exceeded the configured timeout.
    #[error("timed out")]
    TimedOut,
}

/// Errors returned by studio operations.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("unknown {kind} id: {id}")]
    InvalidSelection { kind: SelectionKind, id: String },

    #[error("no garment assets available")]
    NoAssetsAvailable,

    #[error("invalid image data: {0}")]
    InvalidImageData(String),

    #[error("layer not found: {0}")]
    LayerNotFound(LayerId),

    #[error("no active layer")]
    NoActiveLayer,

    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    #[error("background removal failed: {reason}")]
    BackgroundRemovalFailed { reason: RemovalFailure },

    #[error("a background removal is already in progress")]
    OperationInProgress,

    #[error("composition has no layers")]
    EmptyComposition,

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("rasterize failed: {0}")]
    RasterizeFailed(String),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("invalid design profile: {0}")]
    InvalidProfile(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A collaborator (content service, cart store) failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl StudioError {
    pub(crate) fn removal(reason: RemovalFailure) -> Self {
        Self::BackgroundRemovalFailed { reason }
    }
}
