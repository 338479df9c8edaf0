//! Live camera through `nokhwa`.
//!
//! The device handle is not `Send`, so each open camera lives on its own
//! capture thread and hands frames over a one-slot channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use kanal::AsyncReceiver;
use medicinna_core::{CameraSource, CameraStream, DeviceError};
use medicinna_types::{CameraConstraints, FacingMode};
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraInfo, RequestedFormat, RequestedFormatType};
use tokio::sync::oneshot;

const REAR_HINTS: &[&str] = &["back", "rear", "environment", "world"];
const FRONT_HINTS: &[&str] = &["front", "user", "facetime", "integrated"];

/// Index of the camera to use for `facing`.
///
/// Names are matched against the usual driver wording. A rear request with no
/// recognisable rear camera takes the first one that isn't obviously a
/// front camera, then the first camera at all.
pub fn pick_camera(names: &[String], facing: FacingMode) -> Option<usize> {
    let matches = |name: &str, hints: &[&str]| {
        let name = name.to_lowercase();
        hints.iter().any(|hint| name.contains(hint))
    };

    let (wanted, avoided) = match facing {
        FacingMode::Environment => (REAR_HINTS, FRONT_HINTS),
        FacingMode::User => (FRONT_HINTS, REAR_HINTS),
    };

    names
        .iter()
        .position(|name| matches(name, wanted))
        .or_else(|| names.iter().position(|name| !matches(name, avoided)))
        .or(if names.is_empty() { None } else { Some(0) })
}

fn device_error(error: nokhwa::NokhwaError) -> DeviceError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("not authorized") {
        DeviceError::PermissionDenied
    } else if lower.contains("busy") || lower.contains("in use") {
        DeviceError::Busy
    } else {
        DeviceError::Other(message)
    }
}

/// The machine's cameras
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceCameraSource;

#[async_trait]
impl CameraSource for DeviceCameraSource {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, DeviceError> {
        let facing = constraints.facing;
        let (opened_tx, opened_rx) = oneshot::channel();
        let (frame_tx, frame_rx) = kanal::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));

        let worker_stop = stop.clone();
        let worker = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture(facing, opened_tx, frame_tx, worker_stop))
            .map_err(|e| DeviceError::Other(format!("Failed to start capture thread: {e}")))?;

        match opened_rx.await {
            Ok(Ok(name)) => {
                tracing::info!("Opened camera {} ({:?})", name, facing);
                Ok(Box::new(DeviceStream {
                    frames: Some(frame_rx.to_async()),
                    stop,
                    worker: Some(worker),
                }))
            }
            Ok(Err(e)) => {
                let _ = tokio::task::spawn_blocking(move || worker.join()).await;
                Err(e)
            }
            Err(_) => Err(DeviceError::Other("capture thread exited".to_string())),
        }
    }
}

fn capture(
    facing: FacingMode,
    opened: oneshot::Sender<Result<String, DeviceError>>,
    frames: kanal::Sender<Result<DynamicImage, DeviceError>>,
    stop: Arc<AtomicBool>,
) {
    let mut camera = match open_camera(facing) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };
    if opened.send(Ok(camera.info().human_name())).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    while !stop.load(Ordering::SeqCst) {
        let frame = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>())
            .map_err(device_error)
            .and_then(|decoded| {
                let (width, height) = decoded.dimensions();
                RgbImage::from_raw(width, height, decoded.into_raw())
                    .map(DynamicImage::ImageRgb8)
                    .ok_or_else(|| DeviceError::Other("malformed frame".to_string()))
            });
        let failed = frame.is_err();

        // A full slot means the scanner is still busy; that frame is skipped
        if frames.try_send(frame).is_err() || failed {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Failed to stop camera: {}", e);
    }
    tracing::debug!("Capture thread finished");
}

fn open_camera(facing: FacingMode) -> Result<Camera, DeviceError> {
    let cameras: Vec<CameraInfo> = nokhwa::query(ApiBackend::Auto).map_err(device_error)?;
    let names: Vec<String> = cameras.iter().map(CameraInfo::human_name).collect();
    tracing::debug!("Cameras: {:?}", names);

    let index = pick_camera(&names, facing).ok_or(DeviceError::NotFound)?;
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = Camera::new(cameras[index].index().clone(), format).map_err(device_error)?;
    camera.open_stream().map_err(device_error)?;
    Ok(camera)
}

struct DeviceStream {
    frames: Option<AsyncReceiver<Result<DynamicImage, DeviceError>>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

#[async_trait]
impl CameraStream for DeviceStream {
    async fn next_frame(&mut self) -> Result<DynamicImage, DeviceError> {
        let Some(frames) = &self.frames else {
            return Err(DeviceError::Other("stream closed".to_string()));
        };
        frames
            .recv()
            .await
            .map_err(|_| DeviceError::Other("camera disconnected".to_string()))?
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        self.stop.store(true, Ordering::SeqCst);
        self.frames = None;

        if let Some(worker) = self.worker.take() {
            tokio::task::spawn_blocking(move || worker.join())
                .await
                .map_err(|e| DeviceError::Other(e.to_string()))?
                .map_err(|_| DeviceError::Other("capture thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_rear_camera_preferred() {
        let cameras = names(&["FaceTime HD Camera", "Back Camera"]);
        assert_eq!(pick_camera(&cameras, FacingMode::Environment), Some(1));
        assert_eq!(pick_camera(&cameras, FacingMode::User), Some(0));
    }

    #[test]
    fn test_unlabelled_camera_beats_front_for_rear() {
        let cameras = names(&["Integrated Webcam", "USB2.0 Camera"]);
        assert_eq!(pick_camera(&cameras, FacingMode::Environment), Some(1));
    }

    #[test]
    fn test_any_camera_rather_than_none() {
        let cameras = names(&["Integrated Webcam"]);
        assert_eq!(pick_camera(&cameras, FacingMode::Environment), Some(0));
        assert_eq!(pick_camera(&[], FacingMode::Environment), None);
    }
}
