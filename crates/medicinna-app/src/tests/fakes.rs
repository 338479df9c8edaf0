//! Hand-written stand-ins for the recognition seams

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use kanal::AsyncReceiver;
use medicinna_core::{
    CameraSource, CameraStream, DecodeFailure, DetectionFailure, DeviceError, NetworkFailure,
    ObjectDetector, OcrFailure, OpticalDecoder, ProgressReporter, TextRecognizer, Verifier,
};
use medicinna_scan::{
    CameraStreamDecoder, DetectAndCrop, StaticImageDecoder, TextExtractionEngine,
};
use medicinna_types::{
    AppEvent, BatchCodeCandidate, CameraConstraints, DetectionBox, VerificationOutcome,
    VerificationStatus,
};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{AttemptFinished, Orchestrator};
use crate::pipeline::Pipeline;

/// Reads a code only from images of the listed sizes
pub struct SizeDecoder {
    hits: Vec<((u32, u32), &'static str)>,
    pub calls: AtomicUsize,
    pub threads: Mutex<Vec<ThreadId>>,
}

impl OpticalDecoder for SizeDecoder {
    fn decode(&self, image: &DynamicImage) -> Result<String, DecodeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().unwrap().push(std::thread::current().id());
        self.hits
            .iter()
            .find(|(size, _)| *size == (image.width(), image.height()))
            .map(|(_, text)| text.to_string())
            .ok_or(DecodeFailure::NotFound)
    }

    fn name(&self) -> &str {
        "size"
    }
}

pub struct ScriptedRecognizer {
    text: Result<&'static str, OcrFailure>,
    delay: Duration,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        _image: &DynamicImage,
        _language: &str,
        progress: &ProgressReporter,
    ) -> Result<String, OcrFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress.report(30);
        tokio::time::sleep(self.delay).await;
        progress.report(60);
        self.text.clone().map(str::to_string)
    }
}

pub struct FixedDetector(Vec<DetectionBox>);

#[async_trait]
impl ObjectDetector for FixedDetector {
    async fn detect(&self, _image: &[u8]) -> Result<Vec<DetectionBox>, DetectionFailure> {
        Ok(self.0.clone())
    }
}

pub struct CountingVerifier {
    fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Verifier for CountingVerifier {
    async fn verify(&self, code: &BatchCodeCandidate) -> Result<VerificationOutcome, NetworkFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NetworkFailure::Status(500));
        }
        Ok(VerificationOutcome {
            status: VerificationStatus::Valid,
            details: format!("{code} is authentic"),
            data: None,
        })
    }
}

#[derive(Default)]
pub struct CameraCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

/// Blank frames until `hit_after`, then a 120x80 frame
pub struct ScriptedCamera {
    counters: Arc<CameraCounters>,
    hit_after: Option<usize>,
    fail_open: bool,
}

struct ScriptedStream {
    counters: Arc<CameraCounters>,
    hit_after: Option<usize>,
    frames: usize,
}

#[async_trait]
impl CameraSource for ScriptedCamera {
    async fn open(
        &self,
        _constraints: &CameraConstraints,
    ) -> Result<Box<dyn CameraStream>, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::PermissionDenied);
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            counters: self.counters.clone(),
            hit_after: self.hit_after,
            frames: 0,
        }))
    }
}

#[async_trait]
impl CameraStream for ScriptedStream {
    async fn next_frame(&mut self) -> Result<DynamicImage, DeviceError> {
        let n = self.frames;
        self.frames += 1;
        match self.hit_after {
            Some(hit) if n >= hit => Ok(DynamicImage::new_luma8(120, 80)),
            _ => Ok(DynamicImage::new_luma8(320, 240)),
        }
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn detection(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> DetectionBox {
    DetectionBox {
        x,
        y,
        width,
        height,
        confidence,
        class: Some("barcode".to_string()),
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Knobs for one test pipeline
pub struct Fixture {
    pub decoder_hits: Vec<((u32, u32), &'static str)>,
    pub ocr_text: Result<&'static str, OcrFailure>,
    pub ocr_delay: Duration,
    pub boxes: Option<Vec<DetectionBox>>,
    pub verify_fails: bool,
    pub camera_fails: bool,
    pub camera_hit_after: Option<usize>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            decoder_hits: Vec::new(),
            ocr_text: Ok(""),
            ocr_delay: Duration::ZERO,
            boxes: None,
            verify_fails: false,
            camera_fails: false,
            camera_hit_after: None,
        }
    }
}

pub struct Built {
    pub pipeline: Arc<Pipeline>,
    pub decoder: Arc<SizeDecoder>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub verifier: Arc<CountingVerifier>,
    pub camera: Arc<CameraCounters>,
}

impl Fixture {
    pub fn build(self) -> Built {
        let decoder = Arc::new(SizeDecoder {
            hits: self.decoder_hits,
            calls: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        });
        let recognizer = Arc::new(ScriptedRecognizer {
            text: self.ocr_text,
            delay: self.ocr_delay,
            calls: AtomicUsize::new(0),
        });
        let verifier = Arc::new(CountingVerifier {
            fail: self.verify_fails,
            calls: AtomicUsize::new(0),
        });
        let camera = Arc::new(CameraCounters::default());

        let pipeline = Pipeline {
            camera: CameraStreamDecoder::new(
                Arc::new(ScriptedCamera {
                    counters: camera.clone(),
                    hit_after: self.camera_hit_after,
                    fail_open: self.camera_fails,
                }),
                decoder.clone(),
            ),
            still: StaticImageDecoder::new(decoder.clone()),
            text: TextExtractionEngine::new(recognizer.clone(), "eng"),
            detect: self
                .boxes
                .map(|boxes| DetectAndCrop::new(Arc::new(FixedDetector(boxes)))),
            verifier: verifier.clone(),
        };

        Built {
            pipeline: Arc::new(pipeline),
            decoder,
            recognizer,
            verifier,
            camera,
        }
    }
}

impl Built {
    pub fn orchestrator(&self) -> (Orchestrator, AsyncReceiver<AppEvent>) {
        let (tx, rx) = kanal::unbounded_async();
        let constraints = CameraConstraints {
            fps: 100,
            ..CameraConstraints::default()
        };
        let orchestrator = Orchestrator::new(
            self.pipeline.clone(),
            None,
            constraints,
            CancellationToken::new(),
            tx,
        );
        (orchestrator, rx)
    }

    pub fn verify_calls(&self) -> usize {
        self.verifier.calls.load(Ordering::SeqCst)
    }
}

pub async fn next_finished(orchestrator: &Orchestrator) -> AttemptFinished {
    tokio::time::timeout(Duration::from_secs(2), orchestrator.completions().recv())
        .await
        .expect("attempt did not finish")
        .unwrap()
}

/// Everything emitted so far
pub fn drain(events: &AsyncReceiver<AppEvent>) -> Vec<AppEvent> {
    let mut drained = Vec::new();
    while let Ok(Some(event)) = events.try_recv() {
        drained.push(event);
    }
    drained
}
