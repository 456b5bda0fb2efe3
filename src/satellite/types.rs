//! Typed payloads exchanged with the Satellite remote execution API.
//!
//! Responses are validated into these shapes at the client boundary so the run
//! engine never handles untyped JSON.

use serde::{Deserialize, Serialize};

/// Response of a successful job trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInvocation {
    /// Job invocation id
    pub id: i64,
    /// Hosts the job resolved to
    pub targeting: Targeting,
}

/// Targeting section of a job invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Targeting {
    /// Hosts Satellite knows about
    #[serde(default)]
    pub hosts: Vec<TargetHost>,
}

/// A host Satellite resolved from the search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetHost {
    /// Host name as requested
    pub name: String,
    /// Satellite host id
    pub id: i64,
}

impl JobInvocation {
    /// Creates a job invocation targeting the given `(name, id)` pairs.
    pub fn new<I, S>(id: i64, hosts: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            id,
            targeting: Targeting {
                hosts: hosts
                    .into_iter()
                    .map(|(name, id)| TargetHost {
                        name: name.into(),
                        id,
                    })
                    .collect(),
            },
        }
    }
}

/// One chunk of console output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Console text
    pub output: String,
    /// Epoch timestamp of the chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// stdout / stderr / debug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
}

impl OutputChunk {
    /// Creates a chunk without a timestamp.
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            timestamp: None,
            output_type: None,
        }
    }

    /// Sets the chunk timestamp.
    pub fn at(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Output of one host: the single-host poll response, and the per-host entry of
/// a bulk poll response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostOutput {
    /// Output chunks since the requested cursor
    #[serde(default)]
    pub output: Vec<OutputChunk>,
    /// Whether the job finished on the host
    #[serde(default)]
    pub complete: bool,
}

impl HostOutput {
    /// Creates a host output from chunks.
    pub fn new(output: Vec<OutputChunk>, complete: bool) -> Self {
        Self { output, complete }
    }

    /// Creates a completed host output holding a single chunk.
    pub fn completed(text: impl Into<String>) -> Self {
        Self::new(vec![OutputChunk::new(text)], true)
    }
}

/// Per-host entry of a bulk poll response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkHostOutput {
    /// Satellite host id
    pub host_id: i64,
    /// Output payload of the host
    #[serde(flatten)]
    pub payload: HostOutput,
}

/// Body of a successful bulk poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOutputs {
    /// One entry per host still reporting
    #[serde(default)]
    pub outputs: Vec<BulkHostOutput>,
}

/// Outcome of a bulk poll request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkPoll {
    /// Satellite returned outputs for some hosts.
    Outputs(BulkOutputs),
    /// The bulk endpoint is not available; poll hosts one by one instead.
    NotFound,
}

/// Result of a Satellite health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `ok` or `error`
    pub result: String,
    /// Instance id echoed from the request
    pub satellite_instance_id: String,
    /// Human readable detail
    pub message: String,
}

impl HealthStatus {
    /// Healthy instance.
    pub fn ok(satellite_instance_id: impl Into<String>) -> Self {
        Self {
            result: "ok".to_string(),
            satellite_instance_id: satellite_instance_id.into(),
            message: "Satellite is reachable".to_string(),
        }
    }

    /// Unhealthy instance.
    pub fn error(satellite_instance_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            result: "error".to_string(),
            satellite_instance_id: satellite_instance_id.into(),
            message: message.into(),
        }
    }
}
