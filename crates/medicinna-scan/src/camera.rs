use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::DynamicImage;
use medicinna_core::{CameraSource, CameraStream, OpticalDecoder};
use medicinna_types::{CameraConstraints, RecognitionResult, ScanBox};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Continuously decodes frames from a live camera until the first hit
#[derive(Clone)]
pub struct CameraStreamDecoder {
    source: Arc<dyn CameraSource>,
    decoder: Arc<dyn OpticalDecoder>,
}

impl CameraStreamDecoder {
    pub fn new(source: Arc<dyn CameraSource>, decoder: Arc<dyn OpticalDecoder>) -> Self {
        Self { source, decoder }
    }

    /// Open the camera and start scanning in the background.
    ///
    /// The camera is closed when the first code is decoded, when the device
    /// fails, when `cancel` fires, or when the handle is stopped or dropped.
    pub fn start(&self, constraints: CameraConstraints, cancel: CancellationToken) -> StreamHandle {
        let (result_tx, result_rx) = oneshot::channel();
        let active = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(run_stream(
            self.source.clone(),
            self.decoder.clone(),
            constraints,
            cancel.clone(),
            result_tx,
            active.clone(),
        ));

        StreamHandle {
            cancel,
            task: Some(task),
            result_rx: Some(result_rx),
            active,
        }
    }
}

/// Owner of a running camera scan
pub struct StreamHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    result_rx: Option<oneshot::Receiver<RecognitionResult>>,
    active: Arc<AtomicBool>,
}

impl StreamHandle {
    /// Whether the camera is still held
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Take the receiving end of the scan result. Only the first call gets it.
    pub fn take_result(&mut self) -> Option<PendingScan> {
        self.result_rx.take().map(|rx| PendingScan { rx })
    }

    /// Stop scanning and wait until the camera is released.
    ///
    /// Calling this again, or on a stream that already finished, does nothing.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("Camera task ended abnormally: {}", e);
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        // The task still closes the camera on its own once it sees this
        self.cancel.cancel();
    }
}

/// Result of a camera scan that hasn't arrived yet
pub struct PendingScan {
    rx: oneshot::Receiver<RecognitionResult>,
}

impl PendingScan {
    /// `None` when the stream was stopped before anything was decoded
    pub async fn wait(self) -> Option<RecognitionResult> {
        self.rx.await.ok()
    }
}

async fn run_stream(
    source: Arc<dyn CameraSource>,
    decoder: Arc<dyn OpticalDecoder>,
    constraints: CameraConstraints,
    cancel: CancellationToken,
    result_tx: oneshot::Sender<RecognitionResult>,
    active: Arc<AtomicBool>,
) {
    let mut stream = match source.open(&constraints).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Error starting camera: {}", e);
            active.store(false, Ordering::SeqCst);
            let _ = result_tx.send(RecognitionResult::DeviceError(e.to_string()));
            return;
        }
    };

    tracing::info!(
        "Camera stream started ({:?}, {} fps, {}x{} scan box)",
        constraints.facing,
        constraints.fps,
        constraints.scan_box.width,
        constraints.scan_box.height
    );

    let outcome = scan_frames(stream.as_mut(), decoder.as_ref(), &constraints, &cancel).await;

    // Release the camera before anyone acts on the result
    if let Err(e) = stream.close().await {
        tracing::warn!("Failed to stop camera stream: {}", e);
    }
    active.store(false, Ordering::SeqCst);
    tracing::info!("Camera stream stopped");

    if let Some(result) = outcome {
        let _ = result_tx.send(result);
    }
}

async fn scan_frames(
    stream: &mut dyn CameraStream,
    decoder: &dyn OpticalDecoder,
    constraints: &CameraConstraints,
    cancel: &CancellationToken,
) -> Option<RecognitionResult> {
    let period = Duration::from_millis(1000 / u64::from(constraints.fps.max(1)));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frames = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = interval.tick() => {}
        }

        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            frame = stream.next_frame() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Camera failed after {} frames: {}", frames, e);
                return Some(RecognitionResult::DeviceError(e.to_string()));
            }
        };
        frames += 1;

        let region = scan_region(&frame, constraints.scan_box);
        match decoder.decode(&region) {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!("Decoded code after {} frames", frames);
                return Some(RecognitionResult::DecodedText(text.trim().to_string()));
            }
            Ok(_) => {}
            Err(e) => tracing::trace!("Frame {}: {}", frames, e),
        }
    }
}

/// Centred scan box of `frame`, shrunk to fit
pub fn scan_region(frame: &DynamicImage, scan_box: ScanBox) -> DynamicImage {
    let width = scan_box.width.min(frame.width());
    let height = scan_box.height.min(frame.height());
    let x = (frame.width() - width) / 2;
    let y = (frame.height() - height) / 2;
    frame.crop_imm(x, y, width, height)
}
