//! Worker directives.
//!
//! The worker receives three directives, each carrying a JSON payload:
//!
//! - `execute` runs a playbook to completion
//! - `cancel` cancels a run started by this process
//! - `health_check` checks that Satellite is reachable
//!
//! Every directive talks to Satellite through its own API session; runs never
//! share one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::response::{CancelStatus, ResponseQueue};
use crate::run::{Lookup, Run, RunRegistry, RunRequest, RunServices};
use crate::satellite::{HealthStatus, SatelliteApi, SatelliteClient, SatelliteClientConfig};
use crate::verifier::PlaybookVerifier;

/// Creates a fresh API client for one directive.
pub type ApiFactory = Arc<dyn Fn() -> Arc<dyn SatelliteApi> + Send + Sync>;

/// Payload of the `cancel` directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Run to cancel
    pub playbook_run_id: String,
}

/// Payload of the `health_check` directive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    /// Instance id echoed back in the result
    #[serde(default)]
    pub satellite_instance_id: String,
}

/// A decoded directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Run a playbook
    Execute(RunRequest),
    /// Cancel a run
    Cancel(CancelRequest),
    /// Check Satellite health
    HealthCheck(HealthCheckRequest),
}

/// Wire form of a directive: `{"directive": "...", "payload": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    directive: String,
    #[serde(default)]
    payload: Value,
}

fn payload<T: serde::de::DeserializeOwned>(directive: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::invalid_payload(directive, e.to_string()))
}

impl Directive {
    /// Name of the directive on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Execute(_) => "execute",
            Directive::Cancel(_) => "cancel",
            Directive::HealthCheck(_) => "health_check",
        }
    }

    /// Decodes one directive line.
    pub fn parse(line: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(line)?;
        match envelope.directive.as_str() {
            "execute" => Ok(Directive::Execute(payload("execute", envelope.payload)?)),
            "cancel" => Ok(Directive::Cancel(payload("cancel", envelope.payload)?)),
            "health_check" => {
                let request = match envelope.payload {
                    Value::Null => HealthCheckRequest::default(),
                    value => payload("health_check", value)?,
                };
                Ok(Directive::HealthCheck(request))
            }
            other => Err(Error::UnknownDirective(other.to_string())),
        }
    }
}

/// Handles directives against one Satellite instance.
#[derive(Clone)]
pub struct Worker {
    api_factory: ApiFactory,
    verifier: Arc<dyn PlaybookVerifier>,
    registry: Arc<RunRegistry>,
    queue: ResponseQueue,
}

impl Worker {
    /// Creates a worker talking to the Satellite described by `config`,
    /// tracking runs in the process-wide registry.
    pub fn new(config: &WorkerConfig, queue: ResponseQueue) -> Self {
        let client_config: SatelliteClientConfig = config.client_config();
        let api_factory: ApiFactory = Arc::new(move || {
            Arc::new(SatelliteClient::new(client_config.clone())) as Arc<dyn SatelliteApi>
        });

        Self {
            api_factory,
            verifier: Arc::new(config.verifier()),
            registry: RunRegistry::global(),
            queue,
        }
    }

    /// Creates a worker from explicit collaborators.
    pub fn with_services(
        api_factory: ApiFactory,
        verifier: Arc<dyn PlaybookVerifier>,
        registry: Arc<RunRegistry>,
        queue: ResponseQueue,
    ) -> Self {
        Self {
            api_factory,
            verifier,
            registry,
            queue,
        }
    }

    /// Runs a directive. Only health checks produce a value; everything else
    /// reports through the response queue.
    pub async fn dispatch(&self, directive: Directive) -> Option<HealthStatus> {
        debug!("Handling '{}' directive", directive.name());
        match directive {
            Directive::Execute(request) => {
                self.execute(request).await;
                None
            }
            Directive::Cancel(request) => {
                self.cancel(&request.playbook_run_id).await;
                None
            }
            Directive::HealthCheck(request) => {
                Some(self.health_check(&request.satellite_instance_id).await)
            }
        }
    }

    /// Runs a playbook to completion.
    pub async fn execute(&self, request: RunRequest) {
        let services = RunServices {
            api: (self.api_factory)(),
            verifier: Arc::clone(&self.verifier),
            registry: Arc::clone(&self.registry),
            queue: self.queue.clone(),
        };
        Run::new(request, services).start().await;
    }

    /// Cancels a run.
    pub async fn cancel(&self, playbook_run_id: &str) {
        let api = (self.api_factory)();
        cancel_run(api.as_ref(), &self.registry, &self.queue, playbook_run_id).await;
    }

    /// Checks that Satellite is reachable.
    pub async fn health_check(&self, satellite_instance_id: &str) -> HealthStatus {
        let api = (self.api_factory)();
        if let Err(err) = api.init_session().await {
            return HealthStatus::error(satellite_instance_id, err.to_string());
        }

        let status = api
            .health_check(satellite_instance_id)
            .await
            .unwrap_or_else(|err| HealthStatus::error(satellite_instance_id, err.to_string()));
        api.close_session().await;
        status
    }
}

/// Cancels a run and reports the outcome with exactly one cancel ack.
///
/// Satellite answers 422 when the job already finished and 200 when the
/// cancellation was accepted.
pub async fn cancel_run(
    api: &dyn SatelliteApi,
    registry: &RunRegistry,
    queue: &ResponseQueue,
    playbook_run_id: &str,
) {
    info!("Cancelling playbook run {}", playbook_run_id);

    let status = match registry.lookup(playbook_run_id) {
        Lookup::Finished => {
            info!("Playbook run {} is already finished", playbook_run_id);
            CancelStatus::Finished
        }
        Lookup::Absent => {
            info!("Playbook run {} is not known by receptor", playbook_run_id);
            CancelStatus::Failure
        }
        Lookup::Running(handle) => match handle.job_invocation_id() {
            None => {
                warn!(
                    "Playbook run {} has not been started on Satellite yet",
                    playbook_run_id
                );
                handle.cancel();
                CancelStatus::Failure
            }
            Some(job_id) => {
                let response = match api.init_session().await {
                    Ok(()) => {
                        let response = api.cancel(job_id).await;
                        api.close_session().await;
                        response
                    }
                    Err(err) => Err(err),
                };
                handle.cancel();

                match response {
                    Ok(422) => CancelStatus::Finished,
                    Ok(200) => CancelStatus::Cancelling,
                    Ok(code) => {
                        warn!("Satellite answered HTTP {} to cancel job {}", code, job_id);
                        CancelStatus::Failure
                    }
                    Err(err) => {
                        warn!("Cancelling job {} failed: {}", job_id, err);
                        CancelStatus::Failure
                    }
                }
            }
        },
    };

    queue.playbook_run_cancel_ack(playbook_run_id, status);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute() {
        let line = r#"{"directive": "execute", "payload": {"remediation_id": "rem_id", "playbook_run_id": "play_id", "account": "account_no", "hosts": ["host1"], "playbook": "---"}}"#;
        let Directive::Execute(request) = Directive::parse(line).unwrap() else {
            panic!("expected execute");
        };
        assert_eq!(request.playbook_run_id, "play_id");
        assert_eq!(request.hosts, vec!["host1"]);
    }

    #[test]
    fn test_parse_cancel() {
        let line = r#"{"directive": "cancel", "payload": {"playbook_run_id": "play_id"}}"#;
        assert_eq!(
            Directive::parse(line).unwrap(),
            Directive::Cancel(CancelRequest {
                playbook_run_id: "play_id".to_string()
            })
        );
    }

    #[test]
    fn test_parse_health_check_without_payload() {
        let line = r#"{"directive": "health_check"}"#;
        assert_eq!(
            Directive::parse(line).unwrap(),
            Directive::HealthCheck(HealthCheckRequest::default())
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = Directive::parse(r#"{"directive": "reboot", "payload": {}}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownDirective(ref name) if name == "reboot"));

        let err = Directive::parse(r#"{"directive": "cancel", "payload": {}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { ref directive, .. } if directive == "cancel"));

        let err = Directive::parse("not json").unwrap_err();
        assert!(matches!(err, Error::JsonParse(_)));
    }
}
