//! HTTP client for the Satellite (Foreman) v2 remote execution API.
//!
//! The client owns a reqwest [`Client`] only while a session is open; every
//! call outside of `init_session`/`close_session` fails with
//! [`ApiError::NoSession`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Certificate, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::error::{ApiError, ApiResult};
use super::types::{BulkOutputs, BulkPoll, HealthStatus, HostOutput, JobInvocation};
use super::SatelliteApi;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Remote execution feature used to run playbooks
const PLAYBOOK_FEATURE: &str = "ansible_run_playbook";

/// Configuration for the Satellite client
#[derive(Debug, Clone)]
pub struct SatelliteClientConfig {
    /// Base URL of the Satellite instance
    pub url: String,
    /// API username
    pub username: String,
    /// API password
    pub password: String,
    /// Whether to verify TLS certificates
    pub validate_certs: bool,
    /// Extra CA bundle (PEM) to trust
    pub ca_file: Option<PathBuf>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for SatelliteClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            validate_certs: true,
            ca_file: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SatelliteClientConfig {
    /// Creates a configuration for the given Satellite URL and credentials.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

/// [`SatelliteApi`] implementation over HTTP.
#[derive(Debug)]
pub struct SatelliteClient {
    config: SatelliteClientConfig,
    session: Mutex<Option<Client>>,
}

impl SatelliteClient {
    /// Creates a client; no connection is made until [`SatelliteApi::init_session`].
    pub fn new(config: SatelliteClientConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// Returns the configured base URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_http_client(&self) -> ApiResult<Client> {
        let mut builder = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(format!("receptor-satellite/{}", env!("CARGO_PKG_VERSION")));

        if !self.config.validate_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref path) = self.config.ca_file {
            let pem = std::fs::read(path).map_err(|e| {
                ApiError::transport(format!("Failed to read CA file '{}'", path.display()), e)
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| ApiError::transport("Invalid CA certificate", e))?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| ApiError::transport("Failed to create HTTP client", e))
    }

    fn client(&self) -> ApiResult<Client> {
        self.session.lock().clone().ok_or(ApiError::NoSession)
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn get(&self, client: &Client, path: &str) -> reqwest::RequestBuilder {
        client
            .get(self.endpoint(path))
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    fn post(&self, client: &Client, path: &str) -> reqwest::RequestBuilder {
        client
            .post(self.endpoint(path))
            .basic_auth(&self.config.username, Some(&self.config.password))
    }
}

/// Builds the Foreman search query selecting hosts by name.
fn name_query(hosts: &[String]) -> String {
    format!("name ^ ({})", hosts.join(","))
}

/// Decodes a successful response, turning error statuses into [`ApiError`]s.
async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(ApiError::from);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

/// Foreman reports failures as `{"error": {"message": ...}}`; fall back to the
/// raw body otherwise.
fn error_from_body(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.pointer("/error"))
                .and_then(|m| m.as_str().map(String::from))
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.is_empty() {
        ApiError::Status {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("").to_string(),
        }
    } else {
        ApiError::Request(message)
    }
}

#[async_trait]
impl SatelliteApi for SatelliteClient {
    async fn init_session(&self) -> ApiResult<()> {
        let client = self.build_http_client()?;
        *self.session.lock() = Some(client);
        Ok(())
    }

    async fn close_session(&self) {
        self.session.lock().take();
    }

    async fn trigger(&self, playbook: &str, hosts: &[String]) -> ApiResult<JobInvocation> {
        let client = self.client()?;
        let body = json!({
            "job_invocation": {
                "feature": PLAYBOOK_FEATURE,
                "inputs": { "playbook": playbook },
                "targeting_type": "static_query",
                "search_query": name_query(hosts),
            }
        });

        debug!("Triggering playbook run on {} hosts", hosts.len());
        let response = self
            .post(&client, "api/v2/job_invocations")
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    async fn output(
        &self,
        job_id: i64,
        host_id: i64,
        since: Option<f64>,
    ) -> ApiResult<HostOutput> {
        let client = self.client()?;
        let path = format!("api/v2/job_invocations/{}/hosts/{}/raw", job_id, host_id);
        let mut request = self.get(&client, &path);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_string())]);
        }

        let response = request.send().await?;
        decode(response).await
    }

    async fn outputs(
        &self,
        job_id: i64,
        hosts: &[String],
        since: Option<f64>,
    ) -> ApiResult<BulkPoll> {
        let client = self.client()?;
        let path = format!("api/v2/job_invocations/{}/outputs", job_id);
        let mut request = self
            .get(&client, &path)
            .query(&[("search_query", name_query(hosts))]);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_string())]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Bulk output endpoint not available for job {}", job_id);
            return Ok(BulkPoll::NotFound);
        }
        decode::<BulkOutputs>(response).await.map(BulkPoll::Outputs)
    }

    async fn cancel(&self, job_id: i64) -> ApiResult<u16> {
        let client = self.client()?;
        let path = format!("api/v2/job_invocations/{}/cancel", job_id);
        let response = self.post(&client, &path).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Cancelling job {} returned {}", job_id, status);
        }
        Ok(status.as_u16())
    }

    async fn health_check(&self, satellite_instance_id: &str) -> ApiResult<HealthStatus> {
        let client = self.client()?;
        let response = self.get(&client, "api/v2/status").send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(HealthStatus::ok(satellite_instance_id))
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(HealthStatus::error(
                satellite_instance_id,
                error_from_body(status, &body).to_string(),
            ))
        }
    }
}
