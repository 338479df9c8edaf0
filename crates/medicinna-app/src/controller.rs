use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use kanal::{AsyncReceiver, AsyncSender};
use medicinna_client::{BackendClient, RemoteDetector};
use medicinna_core::{CameraSource, ObjectDetector};
use medicinna_scan::{
    CameraStreamDecoder, DetectAndCrop, ImageSequenceSource, StaticImageDecoder,
    TextExtractionEngine,
};
use medicinna_types::{AppEvent, CameraConstraints};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::events::event_loop;
use crate::orchestrator::Orchestrator;
use crate::pipeline::Pipeline;
use crate::state::AppState;

/// Centralized channel management
pub struct ChannelSet {
    pub app_to_ui: (AsyncSender<AppEvent>, AsyncReceiver<AppEvent>),
    pub ui_to_app: (AsyncSender<AppEvent>, AsyncReceiver<AppEvent>),
}

impl ChannelSet {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            app_to_ui: kanal::bounded_async(event_capacity.max(1)), // progress bursts
            ui_to_app: kanal::bounded_async(64),
        }
    }
}

/// Application controller for task spawning and lifecycle
pub struct AppController {
    channels: ChannelSet,
    state: Arc<AppState>,
    cancel_token: CancellationToken,
}

impl AppController {
    pub fn new(state: Arc<AppState>, event_capacity: usize) -> Self {
        Self {
            channels: ChannelSet::new(event_capacity),
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Front-end side: where requests go
    pub fn sender(&self) -> AsyncSender<AppEvent> {
        self.channels.ui_to_app.0.clone()
    }

    /// Front-end side: where status and results arrive
    pub fn receiver(&self) -> AsyncReceiver<AppEvent> {
        self.channels.app_to_ui.1.clone()
    }

    pub async fn spawn_tasks(
        &self,
        frames: Option<&Path>,
    ) -> anyhow::Result<JoinSet<anyhow::Result<()>>> {
        let (pipeline, backend) = build_pipeline(&self.state, frames).await?;
        let constraints: CameraConstraints = self.state.config.read().await.scanner.constraints();

        let orchestrator = Orchestrator::new(
            pipeline,
            Some(backend),
            constraints,
            self.cancel_token.child_token(),
            self.channels.app_to_ui.0.clone(),
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(event_loop(
            orchestrator,
            self.channels.ui_to_app.1.clone(),
            self.cancel_token.child_token(),
        ));

        Ok(tasks)
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

/// Wire the recognition strategies and the backend from config
pub async fn build_pipeline(
    state: &AppState,
    frames: Option<&Path>,
) -> anyhow::Result<(Arc<Pipeline>, BackendClient)> {
    let config = state.config.read().await;

    let backend = BackendClient::new(&config.network, state.session.clone())
        .context("Failed to create backend client")?;

    let source: Arc<dyn CameraSource> = match frames {
        Some(dir) => Arc::new(
            ImageSequenceSource::from_dir(dir)
                .with_context(|| format!("Failed to read frames from {}", dir.display()))?,
        ),
        None => medicinna_scan::default_camera_source(),
    };

    // Loading OCR models blocks
    let ocr = config.ocr.clone();
    let recognizer =
        tokio::task::spawn_blocking(move || medicinna_scan::default_text_recognizer(&ocr))
            .await
            .context("OCR setup failed")?;

    let detector: Option<Arc<dyn ObjectDetector>> = if config.detector.is_usable() {
        Some(Arc::new(RemoteDetector::direct(
            &config.detector,
            config.network.timeout_secs,
        )?))
    } else if config.detector.enabled {
        tracing::info!("No detector API key, routing AI scans through the backend");
        Some(Arc::new(RemoteDetector::via_backend(&config.network)?))
    } else {
        None
    };

    let decoder = medicinna_scan::default_decoder();
    let pipeline = Pipeline {
        camera: CameraStreamDecoder::new(source, decoder.clone()),
        still: StaticImageDecoder::new(decoder),
        text: TextExtractionEngine::new(recognizer, config.ocr.language.clone()),
        detect: detector.map(DetectAndCrop::new),
        verifier: Arc::new(backend.clone()),
    };

    Ok((Arc::new(pipeline), backend))
}
