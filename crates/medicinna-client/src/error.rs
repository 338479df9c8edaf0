use medicinna_core::{DetectionFailure, NetworkFailure};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Invalid response: {0}")]
    Parse(String),
}

impl ClientError {
    /// Map a non-success response to an error, keeping the backend's `detail`
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return ClientError::Unauthorized;
        }

        let detail = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body["detail"].as_str().map(str::to_string))
            .unwrap_or_default();

        ClientError::Status {
            status: status.as_u16(),
            detail,
        }
    }
}

impl From<ClientError> for NetworkFailure {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Network(e) => NetworkFailure::Request(e.to_string()),
            ClientError::Status { status, .. } => NetworkFailure::Status(status),
            ClientError::Unauthorized | ClientError::NotLoggedIn => NetworkFailure::Unauthorized,
            ClientError::Parse(e) => NetworkFailure::Parse(e),
        }
    }
}

impl From<ClientError> for DetectionFailure {
    fn from(error: ClientError) -> Self {
        DetectionFailure::Service(error.to_string())
    }
}
