use std::future::Future;
use std::sync::Arc;

use kanal::{AsyncReceiver, AsyncSender};
use medicinna_client::BackendClient;
use medicinna_core::{AcquisitionError, ProgressReporter};
use medicinna_scan::StreamHandle;
use medicinna_types::{
    AcquisitionMode, AcquisitionState, AppEvent, AttemptId, BatchCodeCandidate, CameraConstraints,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{self, Attempt, Pipeline, Verified};

/// Result of a finished attempt task, fed back into the event loop
#[derive(Debug)]
pub struct AttemptFinished {
    pub attempt: AttemptId,
    pub result: Result<Verified, AcquisitionError>,
}

/// Owns the acquisition state machine.
///
/// One attempt is current at a time. Starting another cancels the previous
/// one, and whatever it reports afterwards is dropped.
pub struct Orchestrator {
    mode: AcquisitionMode,
    state: AcquisitionState,
    current: Option<Attempt>,
    stream: Option<StreamHandle>,

    pipeline: Arc<Pipeline>,
    backend: Option<BackendClient>,
    constraints: CameraConstraints,

    root: CancellationToken,
    events: AsyncSender<AppEvent>,
    finished: (AsyncSender<AttemptFinished>, AsyncReceiver<AttemptFinished>),
}

impl Orchestrator {
    pub fn new(
        pipeline: Arc<Pipeline>,
        backend: Option<BackendClient>,
        constraints: CameraConstraints,
        root: CancellationToken,
        events: AsyncSender<AppEvent>,
    ) -> Self {
        Self {
            mode: AcquisitionMode::default(),
            state: AcquisitionState::Idle,
            current: None,
            stream: None,
            pipeline,
            backend,
            constraints,
            root,
            events,
            finished: kanal::bounded_async(16),
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }

    pub fn camera_active(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamHandle::is_active)
    }

    /// Where attempt tasks report back
    pub fn completions(&self) -> AsyncReceiver<AttemptFinished> {
        self.finished.1.clone()
    }

    pub async fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::SwitchMode(mode) => self.switch_mode(mode).await,
            AppEvent::SubmitManual(input) => self.submit_manual(&input).await,
            AppEvent::StartCamera => self.start_camera().await,
            AppEvent::StopCamera => self.stop_camera().await,
            AppEvent::UploadImage(bytes) => self.upload_image(bytes).await,
            AppEvent::AiScan(bytes) => self.ai_scan(bytes).await,
            AppEvent::Login { username, password } => self.login(&username, &password).await,
            AppEvent::Logout => self.logout().await,

            // Outbound only
            AppEvent::ModeChanged(_)
            | AppEvent::OcrProgress { .. }
            | AppEvent::StatusUpdate { .. }
            | AppEvent::CodeDetected { .. }
            | AppEvent::ShowVerification { .. }
            | AppEvent::ShowError(_)
            | AppEvent::SessionChanged { .. }
            | AppEvent::BackendReady => {}
        }
    }

    /// Apply an attempt's result, unless a newer attempt has replaced it
    pub async fn finish(&mut self, finished: AttemptFinished) {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|attempt| attempt.id == finished.attempt);
        if !is_current {
            tracing::debug!("Dropping result of stale attempt {}", finished.attempt);
            return;
        }

        if let Some(stream) = self.stream.as_mut() {
            stream.stop().await;
        }
        self.stream = None;
        self.current = None;

        match finished.result {
            Ok(Verified { code, outcome }) => {
                tracing::info!("Batch {} verified as {}", code, outcome.status);
                self.state = AcquisitionState::Succeeded {
                    attempt: finished.attempt,
                    code: code.clone(),
                };
                self.status(format!("Verified: {}", outcome.status), false).await;
                self.emit(AppEvent::ShowVerification { code, outcome }).await;
            }
            Err(AcquisitionError::Cancelled) => {
                self.state = AcquisitionState::Idle;
                self.status("Ready".to_string(), false).await;
            }
            Err(e) => self.fail(finished.attempt, e).await,
        }
    }

    /// Tell the front-end the loop is accepting events
    pub async fn ready(&self) {
        self.emit(AppEvent::BackendReady).await;
    }

    /// Release the camera and abandon any attempt in flight
    pub async fn shutdown(&mut self) {
        self.release().await;
        self.state = AcquisitionState::Idle;
    }

    async fn switch_mode(&mut self, mode: AcquisitionMode) {
        if mode == self.mode {
            return;
        }

        self.release().await;
        tracing::info!("Mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.state = AcquisitionState::Idle;
        self.emit(AppEvent::ModeChanged(mode)).await;
    }

    async fn submit_manual(&mut self, input: &str) {
        if !self.require_mode(AcquisitionMode::Manual).await {
            return;
        }

        let attempt = self.begin_attempt().await;
        match Pipeline::manual(input) {
            Ok(code) => self.spawn_attempt(attempt, async move { Ok(code) }),
            Err(e) => {
                self.current = None;
                self.fail(attempt.id, e).await;
            }
        }
    }

    async fn start_camera(&mut self) {
        if !self.require_mode(AcquisitionMode::BarcodeScan).await {
            return;
        }

        let attempt = self.begin_attempt().await;
        let mut stream = self
            .pipeline
            .camera
            .start(self.constraints, attempt.cancel.child_token());
        let pending = stream.take_result();
        self.stream = Some(stream);

        self.status("Scanning...".to_string(), true).await;
        self.spawn_attempt(attempt, async move {
            match pending {
                Some(pending) => pipeline::camera_result(pending).await,
                None => Err(AcquisitionError::Cancelled),
            }
        });
    }

    async fn stop_camera(&mut self) {
        if self.stream.is_none() {
            return;
        }

        self.release().await;
        self.state = AcquisitionState::Idle;
        self.status("Camera stopped".to_string(), false).await;
    }

    async fn upload_image(&mut self, bytes: Vec<u8>) {
        if !self.require_mode(AcquisitionMode::OcrUpload).await {
            return;
        }

        let attempt = self.begin_attempt().await;
        let (progress, progress_rx) = ProgressReporter::new();
        tokio::spawn(forward_progress(
            attempt.clone(),
            progress_rx,
            self.events.clone(),
        ));

        self.status("Reading image...".to_string(), true).await;
        let pipeline = self.pipeline.clone();
        let cancel = attempt.cancel.clone();
        self.spawn_attempt(attempt, async move {
            pipeline.ocr_upload(&bytes, &cancel, &progress).await
        });
    }

    async fn ai_scan(&mut self, bytes: Vec<u8>) {
        if !self.require_mode(AcquisitionMode::AiSmartScan).await {
            return;
        }

        let attempt = self.begin_attempt().await;
        self.status("AI is analyzing image...".to_string(), true).await;
        let pipeline = self.pipeline.clone();
        self.spawn_attempt(attempt, async move { pipeline.ai_smart_scan(&bytes).await });
    }

    async fn login(&mut self, username: &str, password: &str) {
        let Some(backend) = &self.backend else {
            self.emit(AppEvent::ShowError("No backend configured".to_string())).await;
            return;
        };

        match backend.login(username, password).await {
            Ok(session) => {
                self.emit(AppEvent::SessionChanged {
                    username: Some(session.username),
                    role: Some(session.role),
                })
                .await;
            }
            Err(e) => {
                tracing::warn!("Login failed: {}", e);
                self.emit(AppEvent::ShowError(format!("Login failed: {e}"))).await;
            }
        }
    }

    async fn logout(&mut self) {
        self.release().await;
        self.state = AcquisitionState::Idle;
        if let Some(backend) = &self.backend {
            backend.logout().await;
        }
        self.emit(AppEvent::SessionChanged {
            username: None,
            role: None,
        })
        .await;
    }

    async fn require_mode(&self, needed: AcquisitionMode) -> bool {
        if self.mode == needed {
            return true;
        }
        tracing::warn!("Ignoring {} request while in {} mode", needed, self.mode);
        self.emit(AppEvent::ShowError(format!(
            "Switch to {} mode first",
            needed
        )))
        .await;
        false
    }

    /// Cancel-and-replace: whatever was running is torn down first
    async fn begin_attempt(&mut self) -> Attempt {
        self.release().await;

        let attempt = Attempt::new(self.root.child_token());
        tracing::info!("Attempt {} started in {} mode", attempt.id, self.mode);
        self.state = AcquisitionState::Acquiring {
            attempt: attempt.id,
            mode: self.mode,
        };
        self.current = Some(attempt.clone());
        attempt
    }

    /// Stop the camera, then cancel the current attempt
    async fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop().await;
        }
        if let Some(attempt) = self.current.take() {
            tracing::debug!("Cancelling attempt {}", attempt.id);
            attempt.cancel.cancel();
        }
    }

    fn spawn_attempt<F>(&self, attempt: Attempt, acquire: F)
    where
        F: Future<Output = Result<BatchCodeCandidate, AcquisitionError>> + Send + 'static,
    {
        let verifier = self.pipeline.verifier.clone();
        let events = self.events.clone();
        let finished = self.finished.0.clone();

        tokio::spawn(async move {
            let result =
                pipeline::acquire_and_verify(&attempt, acquire, verifier.as_ref(), &events).await;
            if finished
                .send(AttemptFinished {
                    attempt: attempt.id,
                    result,
                })
                .await
                .is_err()
            {
                tracing::debug!("Event loop gone, dropping attempt {}", attempt.id);
            }
        });
    }

    async fn fail(&mut self, attempt: AttemptId, error: AcquisitionError) {
        let message = error.user_message();
        tracing::warn!("Attempt {} failed: {:?}", attempt, error);
        self.state = AcquisitionState::Failed {
            attempt,
            message: message.clone(),
        };
        self.status(String::new(), false).await;
        self.emit(AppEvent::ShowError(message)).await;
    }

    async fn status(&self, status: String, busy: bool) {
        self.emit(AppEvent::StatusUpdate { status, busy }).await;
    }

    async fn emit(&self, event: AppEvent) {
        if let Err(e) = self.events.send(event).await {
            tracing::warn!("Front-end channel closed: {}", e);
        }
    }
}

/// Relay OCR progress until the engine finishes or the attempt is abandoned
async fn forward_progress(
    attempt: Attempt,
    mut progress: watch::Receiver<u8>,
    events: AsyncSender<AppEvent>,
) {
    loop {
        tokio::select! {
            biased;
            _ = attempt.cancel.cancelled() => break,
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let value = *progress.borrow_and_update();
        let _ = events
            .send(AppEvent::OcrProgress {
                attempt: attempt.id,
                progress: value,
            })
            .await;
    }
}
