//! Background removal for one layer at a time.
//!
//! The gateway snapshots a layer's source bytes, sends them to a
//! [`SegmentationService`] and commits the result back onto the same layer.
//! The surface lock is only held while snapshotting and committing, never
//! while the request is in flight. Each surface admits one removal at a
//! time; a second call fails fast with [`StudioError::OperationInProgress`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::SegmentationConfig;
use crate::error::{RemovalFailure, Result, StudioError};
use crate::layer::LayerId;
use crate::raster::ImageData;
use crate::segmentation::{PhotoroomClient, SegmentationService};
use crate::surface::{SharedSurface, lock_surface};

/// Default upper bound on one removal request.
pub const DEFAULT_REMOVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs background removal requests against a segmentation service.
pub struct BackgroundRemovalGateway<S> {
    service: S,
    timeout: Duration,
}

impl BackgroundRemovalGateway<PhotoroomClient> {
    /// A gateway backed by Photoroom, using the config's timeout.
    pub fn photoroom(config: SegmentationConfig) -> Self {
        let timeout = config.timeout;
        Self::new(PhotoroomClient::new(config)).with_timeout(timeout)
    }
}

impl<S: SegmentationService> BackgroundRemovalGateway<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            timeout: DEFAULT_REMOVAL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Removes the background of the surface's active layer.
    ///
    /// Returns the id of the layer that was processed.
    pub async fn remove_active_background(
        &self,
        surface: &SharedSurface,
        cancel: &CancellationToken,
    ) -> Result<LayerId> {
        let active = lock_surface(surface)
            .active_layer_id()
            .ok_or(StudioError::NoActiveLayer)?;
        self.remove_background(surface, active, cancel).await?;
        Ok(active)
    }

    /// Replaces `layer_id`'s image with a background-removed version.
    ///
    /// On success only the layer's image changes; its transform, z-order
    /// and the active selection stay as they were. On any failure the
    /// surface is left untouched.
    pub async fn remove_background(
        &self,
        surface: &SharedSurface,
        layer_id: LayerId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ticket = {
            let guard = lock_surface(surface);
            guard.begin_removal(layer_id)?
        };
        tracing::info!(
            layer_id = %layer_id,
            bytes = ticket.source.encoded().len(),
            "Background removal started"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemovalFailure::Cancelled),
            res = tokio::time::timeout(
                self.timeout,
                self.service.segment(ticket.source.encoded()),
            ) => {
                match res {
                    Err(_) => Err(RemovalFailure::TimedOut),
                    Ok(Err(e)) => Err(RemovalFailure::from(e)),
                    Ok(Ok(bytes)) => Ok(bytes),
                }
            }
        };

        let image = outcome.and_then(|bytes| {
            ImageData::decode(&bytes).map_err(|e| RemovalFailure::MalformedPayload(e.to_string()))
        });
        let image = match image {
            Ok(image) => image,
            Err(reason) => {
                tracing::warn!(layer_id = %layer_id, error = %reason, "Background removal failed");
                return Err(StudioError::removal(reason));
            }
        };

        let committed = lock_surface(surface).commit_removal(ticket, image);
        match &committed {
            Ok(()) => tracing::info!(layer_id = %layer_id, "Background removed"),
            Err(e) => tracing::warn!(layer_id = %layer_id, error = %e, "Discarding removal result"),
        }
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::TransformPatch;
    use crate::raster::tests::solid_png;
    use crate::segmentation::SegmentationError;
    use crate::surface::{CompositionSurface, SurfaceConfig};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Returns a fixed response and counts calls.
    struct FixedService {
        response: std::result::Result<Vec<u8>, (u16, &'static str)>,
        calls: AtomicUsize,
    }

    impl FixedService {
        fn ok(bytes: Vec<u8>) -> Self {
            Self {
                response: Ok(bytes),
                calls: AtomicUsize::new(0),
            }
        }

        fn api_error(status: u16, code: &'static str) -> Self {
            Self {
                response: Err((status, code)),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SegmentationService for FixedService {
        async fn segment(&self, _image: &[u8]) -> std::result::Result<Vec<u8>, SegmentationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(bytes) => Ok(bytes.clone()),
                Err((status, code)) => Err(SegmentationError::Api {
                    status: *status,
                    code: code.to_string(),
                    message: "rejected".into(),
                }),
            }
        }
    }

    /// Holds every request until released.
    #[derive(Default)]
    struct GatedService {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SegmentationService for GatedService {
        async fn segment(&self, _image: &[u8]) -> std::result::Result<Vec<u8>, SegmentationError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(transparent_png())
        }
    }

    fn transparent_png() -> Vec<u8> {
        solid_png(10, 10, [0, 0, 0, 0])
    }

    fn surface_with_layer() -> (SharedSurface, LayerId) {
        let mut surface = CompositionSurface::new(SurfaceConfig::default()).unwrap();
        let id = surface
            .add_layer(&solid_png(10, 10, [200, 10, 10, 255]))
            .unwrap();
        surface.update_layer(id, &TransformPatch::rotate_to(15.0)).unwrap();
        (surface.into_shared(), id)
    }

    #[tokio::test]
    async fn success_replaces_only_the_image() {
        let (surface, id) = surface_with_layer();
        let before = *lock_surface(&surface).layer(id).unwrap().transform();

        let gateway = BackgroundRemovalGateway::new(FixedService::ok(transparent_png()));
        let processed = gateway
            .remove_active_background(&surface, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(processed, id);

        let guard = lock_surface(&surface);
        let layer = guard.layer(id).unwrap();
        assert_eq!(*layer.transform(), before);
        assert_eq!(layer.image().pixels().get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(guard.active_layer_id(), Some(id));
        assert!(!guard.removal_in_progress());
    }

    #[tokio::test]
    async fn service_error_leaves_layer_unchanged() {
        let (surface, id) = surface_with_layer();
        let original = lock_surface(&surface).layer(id).unwrap().image().clone();

        let gateway = BackgroundRemovalGateway::new(FixedService::api_error(402, "quota"));
        let err = gateway
            .remove_background(&surface, id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(
            err,
            StudioError::BackgroundRemovalFailed {
                reason: RemovalFailure::Service { ref code, .. }
            }
                if code == "quota"
        );

        let guard = lock_surface(&surface);
        assert_eq!(guard.layer(id).unwrap().image(), &original);
        assert!(!guard.removal_in_progress());
    }

    #[tokio::test]
    async fn undecodable_result_is_malformed_payload() {
        let (surface, id) = surface_with_layer();
        let gateway =
            BackgroundRemovalGateway::new(FixedService::ok(b"definitely not a png".to_vec()));

        assert_matches!(
            gateway.remove_background(&surface, id, &CancellationToken::new()).await,
            Err(StudioError::BackgroundRemovalFailed {
                reason: RemovalFailure::MalformedPayload(_)
            })
        );
        assert!(!lock_surface(&surface).removal_in_progress());
    }

    #[tokio::test]
    async fn no_active_layer_fails_fast() {
        let surface = CompositionSurface::new(SurfaceConfig::default())
            .unwrap()
            .into_shared();
        let gateway = BackgroundRemovalGateway::new(FixedService::ok(transparent_png()));

        assert_matches!(
            gateway.remove_active_background(&surface, &CancellationToken::new()).await,
            Err(StudioError::NoActiveLayer)
        );
        assert_matches!(
            gateway.remove_background(&surface, LayerId(7), &CancellationToken::new()).await,
            Err(StudioError::NoActiveLayer)
        );
        assert_eq!(gateway.service().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_request_while_in_flight_is_rejected() {
        let (surface, id) = surface_with_layer();
        let gateway = Arc::new(BackgroundRemovalGateway::new(GatedService::default()));

        let first = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            let surface = Arc::clone(&surface);
            async move {
                gateway
                    .remove_background(&surface, id, &CancellationToken::new())
                    .await
            }
        });
        gateway.service().started.notified().await;

        assert_matches!(
            gateway.remove_background(&surface, id, &CancellationToken::new()).await,
            Err(StudioError::OperationInProgress)
        );

        gateway.service().release.notify_one();
        first.await.unwrap().unwrap();
        assert!(!lock_surface(&surface).removal_in_progress());
    }

    #[tokio::test]
    async fn cancellation_frees_the_slot() {
        let (surface, id) = surface_with_layer();
        let original = lock_surface(&surface).layer(id).unwrap().image().clone();
        let gateway = Arc::new(BackgroundRemovalGateway::new(GatedService::default()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            let surface = Arc::clone(&surface);
            let cancel = cancel.clone();
            async move { gateway.remove_background(&surface, id, &cancel).await }
        });
        gateway.service().started.notified().await;
        cancel.cancel();

        assert_matches!(
            task.await.unwrap(),
            Err(StudioError::BackgroundRemovalFailed { reason: RemovalFailure::Cancelled })
        );
        let guard = lock_surface(&surface);
        assert_eq!(guard.layer(id).unwrap().image(), &original);
        assert!(!guard.removal_in_progress());
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let (surface, id) = surface_with_layer();
        let gateway = BackgroundRemovalGateway::new(GatedService::default())
            .with_timeout(Duration::from_millis(20));

        assert_matches!(
            gateway.remove_background(&surface, id, &CancellationToken::new()).await,
            Err(StudioError::BackgroundRemovalFailed { reason: RemovalFailure::TimedOut })
        );
        assert!(!lock_surface(&surface).removal_in_progress());
    }

    #[tokio::test]
    async fn layer_removed_mid_flight_is_not_resurrected() {
        let (surface, id) = surface_with_layer();
        let gateway = Arc::new(BackgroundRemovalGateway::new(GatedService::default()));

        let task = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            let surface = Arc::clone(&surface);
            async move {
                gateway
                    .remove_background(&surface, id, &CancellationToken::new())
                    .await
            }
        });
        gateway.service().started.notified().await;
        lock_surface(&surface).remove_layer(id).unwrap();
        gateway.service().release.notify_one();

        assert_matches!(task.await.unwrap(), Err(StudioError::LayerNotFound(gone)) if gone == id);
        let guard = lock_surface(&surface);
        assert!(guard.is_empty());
        assert!(!guard.removal_in_progress());
    }
}
