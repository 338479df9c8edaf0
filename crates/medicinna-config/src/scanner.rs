use std::env;

use medicinna_types::{CameraConstraints, FacingMode, ScanBox};
use serde::{Deserialize, Serialize};

fn default_fps() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub facing: FacingMode,
    #[serde(default = "default_fps")]
    pub fps: u32,
    pub scan_box: ScanBox,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            fps: default_fps(),
            scan_box: ScanBox::default(),
        }
    }
}

impl ScannerConfig {
    pub fn new() -> Self {
        let fps = env::var("SCANNER_FPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|fps: &u32| *fps > 0)
            .unwrap_or_else(default_fps);

        Self {
            fps,
            ..Self::default()
        }
    }

    pub fn constraints(&self) -> CameraConstraints {
        CameraConstraints {
            facing: self.facing,
            fps: self.fps.max(1),
            scan_box: self.scan_box,
        }
    }
}
