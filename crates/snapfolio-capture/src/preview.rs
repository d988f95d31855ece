// SPDX-License-Identifier: MIT
//
// Throttled boundary detection for live preview streams.
//
// Preview frames arrive faster than detection can run. The detector keeps at
// most one frame in flight: frames submitted while a detection is running are
// dropped rather than queued, trading completeness for bounded memory and
// latency. Results are published on a watch channel so the preview overlay
// always reads the latest quad without blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use snapfolio_core::EngineConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::boundary::{BoundaryDetector, DetectedQuad};
use crate::page::RasterPage;

/// Lower-priority detection worker for camera preview frames.
pub struct PreviewDetector {
    frames: mpsc::Sender<RasterPage>,
    results: watch::Receiver<Option<DetectedQuad>>,
    in_flight: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl PreviewDetector {
    /// Spawn the detection worker on the current tokio runtime.
    #[instrument(skip_all)]
    pub fn spawn(config: EngineConfig) -> Self {
        let (frame_tx, mut frame_rx) = mpsc::channel::<RasterPage>(1);
        let (result_tx, result_rx) = watch::channel(None);
        let in_flight = Arc::new(AtomicBool::new(false));

        let busy = Arc::clone(&in_flight);
        let worker = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                busy.store(true, Ordering::Release);

                let detector = BoundaryDetector::new(config.clone());
                let quad = tokio::task::spawn_blocking(move || detector.detect(&frame))
                    .await
                    .ok()
                    .flatten();

                // Receiver may be gone during teardown; nothing to do then.
                let _ = result_tx.send(quad);
                busy.store(false, Ordering::Release);
            }
            debug!("Preview detection worker stopped");
        });

        Self {
            frames: frame_tx,
            results: result_rx,
            in_flight,
            worker,
        }
    }

    /// Offer a preview frame for detection.
    ///
    /// Returns `true` if the frame was accepted, `false` if it was dropped
    /// because a detection is already in flight.
    pub fn submit_frame(&self, frame: RasterPage) -> bool {
        if self.in_flight.load(Ordering::Acquire) {
            return false;
        }
        self.frames.try_send(frame).is_ok()
    }

    /// The most recent detection result (possibly `None`).
    pub fn latest(&self) -> Option<DetectedQuad> {
        *self.results.borrow()
    }

    /// Subscribe to detection results as they are published.
    pub fn subscribe(&self) -> watch::Receiver<Option<DetectedQuad>> {
        self.results.clone()
    }

    /// Stop the worker and wait for it to finish.
    pub async fn shutdown(self) {
        drop(self.frames);
        let _ = self.worker.await;
    }
}
