use async_trait::async_trait;
use medicinna_config::detector::DetectorConfig;
use medicinna_config::network::NetworkConfig;
use medicinna_core::{DetectionFailure, ObjectDetector};
use medicinna_types::DetectionBox;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::backend::http_client;
use crate::error::ClientError;

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    #[serde(default)]
    predictions: Vec<DetectionBox>,
}

/// Object detection over HTTP.
///
/// Talks either to the detection service directly or to the backend's
/// `/scan/ai` proxy, which forwards the upload and relays the same body.
#[derive(Clone)]
pub struct RemoteDetector {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteDetector {
    pub fn direct(config: &DetectorConfig, timeout_secs: u64) -> Result<Self, ClientError> {
        Self::with_endpoint(config.endpoint(), timeout_secs)
    }

    pub fn via_backend(config: &NetworkConfig) -> Result<Self, ClientError> {
        Self::with_endpoint(format!("{}/scan/ai", config.base_url()), config.timeout_secs)
    }

    fn with_endpoint(endpoint: String, timeout_secs: u64) -> Result<Self, ClientError> {
        let client = http_client(&endpoint, timeout_secs)?;
        Ok(Self { client, endpoint })
    }

    async fn request(&self, image: &[u8]) -> Result<Vec<DetectionBox>, ClientError> {
        let part = Part::bytes(image.to_vec()).file_name("upload.jpg");
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let body: DetectionResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(body.predictions)
    }
}

#[async_trait]
impl ObjectDetector for RemoteDetector {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectionBox>, DetectionFailure> {
        let boxes = self.request(image).await?;
        tracing::debug!("Detector returned {} boxes", boxes.len());
        Ok(boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve_once;

    fn detector(url: &str) -> RemoteDetector {
        let config = NetworkConfig {
            api_url: url.to_string(),
            timeout_secs: 5,
        };
        RemoteDetector::via_backend(&config).unwrap()
    }

    #[tokio::test]
    async fn test_parse_predictions() {
        let (url, request) = serve_once(
            200,
            r#"{"time": 0.05, "image": {"width": 640, "height": 480},
                "predictions": [
                    {"x": 320.5, "y": 240.0, "width": 200.0, "height": 80.0,
                     "confidence": 0.91, "class": "barcode", "class_id": 0},
                    {"x": 50.0, "y": 60.0, "width": 20.0, "height": 10.0, "confidence": 0.42}
                ]}"#,
        )
        .await;

        let boxes = detector(&url).detect(b"fake-jpeg").await.unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].class.as_deref(), Some("barcode"));
        assert_eq!(boxes[1].confidence, 0.42);

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /scan/ai "));
        assert!(raw.contains("name=\"file\""));
        assert!(raw.contains("fake-jpeg"));
    }

    #[tokio::test]
    async fn test_no_predictions_is_empty() {
        let (url, _request) = serve_once(200, r#"{"predictions": []}"#).await;
        let boxes = detector(&url).detect(b"img").await.unwrap();
        assert!(boxes.is_empty());
    }

    #[tokio::test]
    async fn test_service_error() {
        let (url, _request) = serve_once(500, r#"{"detail": "quota exceeded"}"#).await;
        let result = detector(&url).detect(b"img").await;
        match result {
            Err(DetectionFailure::Service(message)) => assert!(message.contains("quota exceeded")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_direct_endpoint() {
        let config = DetectorConfig {
            api_key: "k".to_string(),
            ..DetectorConfig::default()
        };
        let detector = RemoteDetector::direct(&config, 5).unwrap();
        assert!(detector.endpoint.starts_with("https://detect.roboflow.com/barcodes-zmxjq/4?"));
    }
}
