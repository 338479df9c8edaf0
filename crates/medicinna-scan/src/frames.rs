use std::path::PathBuf;

use async_trait::async_trait;
use image::DynamicImage;
use medicinna_core::{CameraSource, CameraStream, DeviceError};
use medicinna_types::CameraConstraints;

/// Camera replaying still images in a loop. Stands in for hardware on
/// kiosks without a camera driver, and for demos.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
}

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Every image file directly inside `dir`, in name order
    pub fn from_dir(dir: &std::path::Path) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| image::ImageFormat::from_path(path).is_ok())
            .collect();
        paths.sort();
        Ok(Self::new(paths))
    }
}

#[async_trait]
impl CameraSource for ImageSequenceSource {
    async fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, DeviceError> {
        tracing::debug!(
            "Opening image sequence camera ({} files, {:?})",
            self.paths.len(),
            constraints.facing
        );

        let mut frames = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let frame = image::open(path)
                .map_err(|e| DeviceError::Other(format!("{}: {}", path.display(), e)))?;
            frames.push(frame);
        }

        if frames.is_empty() {
            return Err(DeviceError::NotFound);
        }

        Ok(Box::new(SequenceStream {
            frames,
            next: 0,
            closed: false,
        }))
    }
}

struct SequenceStream {
    frames: Vec<DynamicImage>,
    next: usize,
    closed: bool,
}

#[async_trait]
impl CameraStream for SequenceStream {
    async fn next_frame(&mut self) -> Result<DynamicImage, DeviceError> {
        if self.closed {
            return Err(DeviceError::Other("stream closed".to_string()));
        }
        let frame = self.frames[self.next % self.frames.len()].clone();
        self.next += 1;
        Ok(frame)
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_sequence_is_not_found() {
        let source = ImageSequenceSource::new(Vec::new());
        let result = source.open(&CameraConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::NotFound)));
    }

    #[tokio::test]
    async fn test_missing_file_is_device_error() {
        let source = ImageSequenceSource::new(vec![PathBuf::from("/nonexistent/frame.png")]);
        let result = source.open(&CameraConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::Other(_))));
    }
}
