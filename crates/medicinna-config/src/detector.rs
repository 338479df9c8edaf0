use std::env;

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_url() -> String {
    "https://detect.roboflow.com".to_string()
}

fn default_model_id() -> String {
    "barcodes-zmxjq/4".to_string()
}

fn default_confidence() -> u8 {
    40
}

fn default_overlap() -> u8 {
    30
}

/// Remote object detection service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Minimum confidence in percent, applied by the service
    #[serde(default = "default_confidence")]
    pub confidence: u8,
    /// Allowed box overlap in percent
    #[serde(default = "default_overlap")]
    pub overlap: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: default_url(),
            model_id: default_model_id(),
            api_key: String::new(),
            confidence: default_confidence(),
            overlap: default_overlap(),
        }
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self {
            url: env::var("DETECTOR_URL").unwrap_or_else(|_| default_url()),
            model_id: env::var("DETECTOR_MODEL").unwrap_or_else(|_| default_model_id()),
            api_key: env::var("DETECTOR_API_KEY").unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}?api_key={}&confidence={}&overlap={}&format=json",
            self.url.trim_end_matches('/'),
            self.model_id,
            self.api_key,
            self.confidence,
            self.overlap
        )
    }

    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }
}
