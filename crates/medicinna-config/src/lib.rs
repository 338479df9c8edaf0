use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use self::detector::DetectorConfig;
use self::network::NetworkConfig;
use self::ocr::OcrConfig;
use self::scanner::ScannerConfig;

pub mod detector;
pub mod network;
pub mod ocr;
pub mod scanner;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub scanner: ScannerConfig,
    pub ocr: OcrConfig,
    pub detector: DetectorConfig,

    /// Capacity of the app -> front-end event channel
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            scanner: ScannerConfig::default(),
            ocr: OcrConfig::default(),
            detector: DetectorConfig::default(),

            event_capacity: 256,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        let event_capacity = env::var("EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);

        Config {
            network: NetworkConfig::new(),
            scanner: ScannerConfig::new(),
            ocr: OcrConfig::new(),
            detector: DetectorConfig::new(),

            event_capacity,
        }
    }

    /// Load a JSON profile. Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        tracing::info!("Loading config from {}", path.display());
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&data).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Profile at `path` when given, environment otherwise
    pub fn load_or_env(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::new()),
        }
    }
}
