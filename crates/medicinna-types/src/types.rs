use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum AppEvent {
    SwitchMode(AcquisitionMode),
    /// Typed batch code; trimmed and uppercased before verification
    SubmitManual(String),
    StartCamera,
    StopCamera,
    /// Encoded image for the OCR upload flow
    UploadImage(Vec<u8>),
    /// Encoded image for the AI smart scan flow
    AiScan(Vec<u8>),
    Login {
        username: String,
        password: String,
    },
    Logout,
    ModeChanged(AcquisitionMode),
    OcrProgress {
        attempt: AttemptId,
        progress: u8,
    },
    StatusUpdate {
        status: String,
        busy: bool,
    },
    CodeDetected {
        attempt: AttemptId,
        code: BatchCodeCandidate,
    },
    ShowVerification {
        code: BatchCodeCandidate,
        outcome: VerificationOutcome,
    },
    ShowError(String),
    SessionChanged {
        username: Option<String>,
        role: Option<Role>,
    },
    BackendReady,
}

/// The four ways a batch code can be acquired. Exactly one is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    #[default]
    Manual,
    BarcodeScan,
    OcrUpload,
    AiSmartScan,
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionMode::Manual => "manual",
            AcquisitionMode::BarcodeScan => "barcode",
            AcquisitionMode::OcrUpload => "ocr",
            AcquisitionMode::AiSmartScan => "ai",
        };
        f.write_str(name)
    }
}

/// Identity of a single acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the current acquisition attempt stands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Acquiring {
        attempt: AttemptId,
        mode: AcquisitionMode,
    },
    Succeeded {
        attempt: AttemptId,
        code: BatchCodeCandidate,
    },
    Failed {
        attempt: AttemptId,
        message: String,
    },
}

impl AcquisitionState {
    pub fn is_acquiring(&self) -> bool {
        matches!(self, AcquisitionState::Acquiring { .. })
    }
}

/// Outcome of one optical decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    DecodedText(String),
    NoMatch,
    DeviceError(String),
}

impl RecognitionResult {
    pub fn decoded(&self) -> Option<&str> {
        match self {
            RecognitionResult::DecodedText(text) => Some(text),
            _ => None,
        }
    }
}

/// Bounding box reported by the detection service.
///
/// `x` and `y` are the box centre, in source-image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    #[serde(default)]
    pub class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrOutcome {
    pub raw_text: String,
    pub progress: u8,
}

/// Normalized batch code token: uppercase alphanumerics and hyphens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchCodeCandidate(String);

impl BatchCodeCandidate {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    /// Typed input, `None` when blank
    pub fn from_input(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self::new(trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for BatchCodeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Valid,
    Fake,
    Expired,
    Recalled,
    Substandard,
}

impl VerificationStatus {
    pub fn is_safe(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerificationStatus::Valid => "VALID",
            VerificationStatus::Fake => "FAKE",
            VerificationStatus::Expired => "EXPIRED",
            VerificationStatus::Recalled => "RECALLED",
            VerificationStatus::Substandard => "SUBSTANDARD",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub details: String,
    #[serde(default)]
    pub data: Option<MedicineRecord>,
}

/// Manufacturer record attached to a verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
    pub batch_id: String,
    #[serde(default)]
    pub medicine_name: String,
    #[serde(default)]
    pub manufacturer: String,
    /// ISO date, YYYY-MM-DD
    #[serde(default)]
    pub expiry_date: String,
    #[serde(default, alias = "purity_level")]
    pub purity: f64,
    #[serde(default)]
    pub is_recalled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Hospital,
    Admin,
    Manufacturer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLog {
    #[serde(default)]
    pub id: Option<i64>,
    pub batch_id: String,
    pub status: VerificationStatus,
    pub scanned_by: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total: u64,
    pub fake: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

/// Centred region of each frame that the decoder looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanBox {
    pub width: u32,
    pub height: u32,
}

impl Default for ScanBox {
    fn default() -> Self {
        Self {
            width: 250,
            height: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub facing: FacingMode,
    /// Decode attempts per second
    pub fps: u32,
    pub scan_box: ScanBox,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            fps: 10,
            scan_box: ScanBox::default(),
        }
    }
}
