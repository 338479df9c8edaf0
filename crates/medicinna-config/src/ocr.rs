use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_detection_model() -> String {
    "pp-ocrv5_mobile_det.onnx".to_string()
}

fn default_recognition_model() -> String {
    "pp-ocrv5_mobile_rec.onnx".to_string()
}

fn default_dictionary() -> String {
    "ppocrv5_dict.txt".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_language")]
    pub language: String,

    /// Directory holding the ONNX text models. Unused by the Windows engine.
    pub model_dir: Option<PathBuf>,
    #[serde(default = "default_detection_model")]
    pub detection_model: String,
    #[serde(default = "default_recognition_model")]
    pub recognition_model: String,
    #[serde(default = "default_dictionary")]
    pub dictionary: String,
}

/// Resolved paths of the ONNX text models
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrModelFiles {
    pub detection: PathBuf,
    pub recognition: PathBuf,
    pub dictionary: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            language: default_language(),
            model_dir: None,
            detection_model: default_detection_model(),
            recognition_model: default_recognition_model(),
            dictionary: default_dictionary(),
        }
    }
}

impl OcrConfig {
    pub fn new() -> Self {
        let language = env::var("OCR_LANGUAGE").unwrap_or_else(|_| default_language());
        let model_dir = env::var("OCR_MODEL_DIR").ok().map(PathBuf::from);

        Self {
            language,
            model_dir,
            ..Self::default()
        }
    }

    /// Model paths, when a model directory is configured
    pub fn model_files(&self) -> Option<OcrModelFiles> {
        let dir = self.model_dir.as_ref()?;
        Some(OcrModelFiles {
            detection: dir.join(&self.detection_model),
            recognition: dir.join(&self.recognition_model),
            dictionary: dir.join(&self.dictionary),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_files_need_a_directory() {
        assert_eq!(OcrConfig::default().model_files(), None);

        let config = OcrConfig {
            model_dir: Some(PathBuf::from("/opt/models")),
            ..OcrConfig::default()
        };
        let files = config.model_files().unwrap();
        assert_eq!(files.detection, PathBuf::from("/opt/models/pp-ocrv5_mobile_det.onnx"));
        assert_eq!(files.dictionary, PathBuf::from("/opt/models/ppocrv5_dict.txt"));
    }
}
