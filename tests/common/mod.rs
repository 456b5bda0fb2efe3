//! Shared test utilities for the receptor-satellite test suite.
//!
//! This module provides:
//! - A scripted [`FakeSatelliteApi`] recording every request
//! - Pass-through and failing playbook verifiers
//! - A run scenario wiring both to an in-memory response sink
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use receptor_satellite::response::{MemorySink, Message, ResponseQueue};
use receptor_satellite::run::{Run, RunConfig, RunContext, RunRegistry, RunRequest, RunServices};
use receptor_satellite::satellite::{
    ApiError, ApiResult, BulkHostOutput, BulkOutputs, BulkPoll, HealthStatus, HostOutput,
    JobInvocation, SatelliteApi,
};
use receptor_satellite::verifier::{PlaybookVerifier, ValidationError};

// ============================================================================
// Fake Satellite API
// ============================================================================

/// A request received by the fake API.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Trigger {
        playbook: String,
        hosts: Vec<String>,
    },
    Output {
        job_id: i64,
        host_id: i64,
        since: Option<f64>,
    },
    Outputs {
        job_id: i64,
        hosts: Vec<String>,
        since: Option<f64>,
    },
    Cancel {
        job_id: i64,
    },
    HealthCheck,
}

/// A scripted response, consumed in order.
#[derive(Debug)]
pub enum Response {
    Trigger(ApiResult<JobInvocation>),
    Output(ApiResult<HostOutput>),
    Outputs(ApiResult<BulkPoll>),
    Cancel(ApiResult<u16>),
    HealthCheck(ApiResult<HealthStatus>),
}

/// Satellite API answering from a script.
#[derive(Debug, Default)]
pub struct FakeSatelliteApi {
    requests: Mutex<Vec<Request>>,
    responses: Mutex<VecDeque<Response>>,
    session_error: Mutex<Option<String>>,
    sessions_opened: Mutex<usize>,
    sessions_closed: Mutex<usize>,
}

impl FakeSatelliteApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: impl IntoIterator<Item = Response>) -> Self {
        let api = Self::new();
        api.responses.lock().extend(responses);
        api
    }

    /// Makes `init_session` fail with `message`.
    pub fn failing_session(self, message: impl Into<String>) -> Self {
        *self.session_error.lock() = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn sessions(&self) -> (usize, usize) {
        (*self.sessions_opened.lock(), *self.sessions_closed.lock())
    }

    fn record(&self, request: Request) -> Option<Response> {
        self.requests.lock().push(request);
        self.responses.lock().pop_front()
    }
}

fn unscripted() -> ApiError {
    ApiError::request("No scripted response")
}

#[async_trait]
impl SatelliteApi for FakeSatelliteApi {
    async fn init_session(&self) -> ApiResult<()> {
        if let Some(message) = self.session_error.lock().clone() {
            return Err(ApiError::request(message));
        }
        *self.sessions_opened.lock() += 1;
        Ok(())
    }

    async fn close_session(&self) {
        *self.sessions_closed.lock() += 1;
    }

    async fn trigger(&self, playbook: &str, hosts: &[String]) -> ApiResult<JobInvocation> {
        match self.record(Request::Trigger {
            playbook: playbook.to_string(),
            hosts: hosts.to_vec(),
        }) {
            Some(Response::Trigger(response)) => response,
            other => panic!("unexpected response to trigger: {:?}", other),
        }
    }

    async fn output(
        &self,
        job_id: i64,
        host_id: i64,
        since: Option<f64>,
    ) -> ApiResult<HostOutput> {
        match self.record(Request::Output {
            job_id,
            host_id,
            since,
        }) {
            Some(Response::Output(response)) => response,
            None => Err(unscripted()),
            other => panic!("unexpected response to output: {:?}", other),
        }
    }

    async fn outputs(
        &self,
        job_id: i64,
        hosts: &[String],
        since: Option<f64>,
    ) -> ApiResult<BulkPoll> {
        match self.record(Request::Outputs {
            job_id,
            hosts: hosts.to_vec(),
            since,
        }) {
            Some(Response::Outputs(response)) => response,
            None => Err(unscripted()),
            other => panic!("unexpected response to outputs: {:?}", other),
        }
    }

    async fn cancel(&self, job_id: i64) -> ApiResult<u16> {
        match self.record(Request::Cancel { job_id }) {
            Some(Response::Cancel(response)) => response,
            None => Err(unscripted()),
            other => panic!("unexpected response to cancel: {:?}", other),
        }
    }

    async fn health_check(&self, satellite_instance_id: &str) -> ApiResult<HealthStatus> {
        match self.record(Request::HealthCheck) {
            Some(Response::HealthCheck(response)) => response,
            None => Ok(HealthStatus::ok(satellite_instance_id)),
            other => panic!("unexpected response to health check: {:?}", other),
        }
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

pub fn triggered(job_id: i64, hosts: &[(&str, i64)]) -> Response {
    Response::Trigger(Ok(JobInvocation::new(job_id, hosts.iter().copied())))
}

pub fn trigger_error(message: &str) -> Response {
    Response::Trigger(Err(ApiError::request(message)))
}

pub fn host_output(output: HostOutput) -> Response {
    Response::Output(Ok(output))
}

pub fn output_error(message: &str) -> Response {
    Response::Output(Err(ApiError::request(message)))
}

pub fn bulk(entries: Vec<(i64, HostOutput)>) -> Response {
    Response::Outputs(Ok(BulkPoll::Outputs(BulkOutputs {
        outputs: entries
            .into_iter()
            .map(|(host_id, payload)| BulkHostOutput { host_id, payload })
            .collect(),
    })))
}

pub fn bulk_not_found() -> Response {
    Response::Outputs(Ok(BulkPoll::NotFound))
}

pub fn bulk_error(message: &str) -> Response {
    Response::Outputs(Err(ApiError::request(message)))
}

// ============================================================================
// Verifiers
// ============================================================================

/// Verifier accepting every playbook unchanged.
#[derive(Debug, Default)]
pub struct PassthroughVerifier;

#[async_trait]
impl PlaybookVerifier for PassthroughVerifier {
    async fn verify(&self, playbook: &str) -> Result<String, ValidationError> {
        Ok(playbook.to_string())
    }
}

/// Verifier rejecting every playbook.
#[derive(Debug)]
pub struct FailingVerifier(pub String);

#[async_trait]
impl PlaybookVerifier for FailingVerifier {
    async fn verify(&self, _playbook: &str) -> Result<String, ValidationError> {
        Err(ValidationError::new(self.0.clone()))
    }
}

// ============================================================================
// Scenarios
// ============================================================================

pub fn request(hosts: &[&str], config: Value) -> RunRequest {
    RunRequest {
        remediation_id: "rem_id".to_string(),
        playbook_run_id: "play_id".to_string(),
        account: "account_no".to_string(),
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
        playbook: "playbook".to_string(),
        config,
    }
}

/// Everything a run test needs to drive and inspect a run.
pub struct Scenario {
    pub api: Arc<FakeSatelliteApi>,
    pub sink: Arc<MemorySink>,
    pub registry: Arc<RunRegistry>,
    pub verifier: Arc<dyn PlaybookVerifier>,
}

impl Scenario {
    pub fn new(api: FakeSatelliteApi) -> Self {
        Self {
            api: Arc::new(api),
            sink: Arc::new(MemorySink::new()),
            registry: Arc::new(RunRegistry::new()),
            verifier: Arc::new(PassthroughVerifier),
        }
    }

    pub fn with_verifier(mut self, verifier: impl PlaybookVerifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn queue(&self) -> ResponseQueue {
        ResponseQueue::new(self.sink.clone())
    }

    pub fn services(&self) -> RunServices {
        RunServices {
            api: self.api.clone(),
            verifier: Arc::clone(&self.verifier),
            registry: Arc::clone(&self.registry),
            queue: self.queue(),
        }
    }

    pub fn run(&self, request: RunRequest) -> Run {
        Run::new(request, self.services())
    }

    /// Context of a run already triggered as job 123.
    pub fn context(&self, config: RunConfig) -> RunContext {
        RunContext::new("play_id", config, self.api.clone(), self.queue()).with_job_invocation_id(123)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sink.messages()
    }
}
