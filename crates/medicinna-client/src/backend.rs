use std::time::Duration;

use async_trait::async_trait;
use medicinna_config::network::NetworkConfig;
use medicinna_core::{NetworkFailure, Verifier};
use medicinna_types::{BatchCodeCandidate, Role, ScanLog, ScanStats, VerificationOutcome};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ClientError;
use crate::session::{Session, SessionContext};

/// Client for the verification backend
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
    session: SessionContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub hospital_name: String,
    pub role: Role,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: String,
}

impl BackendClient {
    pub fn new(config: &NetworkConfig, session: SessionContext) -> Result<Self, ClientError> {
        let client = http_client(config.base_url(), config.timeout_secs)?;

        Ok(Self {
            base_url: config.base_url().to_string(),
            client,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Log in and start a session
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        let session: Session = parse(response).await?;
        self.session.begin(session.clone()).await;
        Ok(session)
    }

    pub async fn logout(&self) {
        self.session.end().await;
    }

    pub async fn register(&self, registration: &Registration) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(registration)
            .send()
            .await?;

        let body: MessageResponse = parse(response).await?;
        Ok(body.message)
    }

    /// Look up a batch code
    pub async fn verify_batch(&self, batch_code: &str) -> Result<VerificationOutcome, ClientError> {
        tracing::debug!("Verifying batch {}", batch_code);
        let request = self
            .client
            .post(self.url("/verify"))
            .json(&json!({ "batch_code": batch_code }));

        let outcome: VerificationOutcome = parse(self.send_authorized(request).await?).await?;
        tracing::info!("Batch {} is {}", batch_code, outcome.status);
        Ok(outcome)
    }

    pub async fn stats(&self) -> Result<ScanStats, ClientError> {
        let request = self.client.get(self.url("/stats"));
        parse(self.send_authorized(request).await?).await
    }

    /// Most recent scans, newest first
    pub async fn history(&self) -> Result<Vec<ScanLog>, ClientError> {
        let request = self.client.get(self.url("/history"));
        parse(self.send_authorized(request).await?).await
    }

    /// Check that the backend answers
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.stats().await.map(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the session token. A 401 means the token is no longer any good,
    /// so the session is dropped.
    async fn send_authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let request = match self.session.bearer().await {
            Some(bearer) => request.header(AUTHORIZATION, bearer),
            None => request,
        };

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            && self.session.end().await.is_some()
        {
            tracing::warn!("Backend rejected the session token, logged out");
        }
        Ok(response)
    }
}

/// Shared HTTP client setup. Loopback backends never go through a proxy.
pub(crate) fn http_client(url: &str, timeout_secs: u64) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs));

    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string));
    if matches!(host.as_deref(), Some("localhost" | "127.0.0.1" | "[::1]")) {
        builder = builder.no_proxy();
    }

    Ok(builder.build()?)
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::from_response(response).await);
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Parse(e.to_string()))
}

#[async_trait]
impl Verifier for BackendClient {
    async fn verify(&self, code: &BatchCodeCandidate) -> Result<VerificationOutcome, NetworkFailure> {
        Ok(self.verify_batch(code.as_str()).await?)
    }
}
