//! Satellite remote execution API.
//!
//! The run engine talks to Satellite only through the [`SatelliteApi`] trait.
//! [`SatelliteClient`] is the HTTP implementation used by the worker; tests
//! provide scripted fakes.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::{SatelliteClient, SatelliteClientConfig};
pub use error::{ApiError, ApiResult};
pub use types::{
    BulkHostOutput, BulkOutputs, BulkPoll, HealthStatus, HostOutput, JobInvocation,
    OutputChunk, TargetHost, Targeting,
};

/// Operations the run engine needs from Satellite.
///
/// A session is opened before the first call and closed after the last one;
/// a session is never shared between runs.
#[async_trait]
pub trait SatelliteApi: Send + Sync {
    /// Opens the API session.
    async fn init_session(&self) -> ApiResult<()>;

    /// Closes the API session. Closing an already closed session is a no-op.
    async fn close_session(&self);

    /// Starts a playbook run against the given hosts.
    async fn trigger(&self, playbook: &str, hosts: &[String]) -> ApiResult<JobInvocation>;

    /// Fetches the output of a single host, from `since` when given.
    async fn output(&self, job_id: i64, host_id: i64, since: Option<f64>)
        -> ApiResult<HostOutput>;

    /// Fetches the output of several hosts at once, from `since` when given.
    async fn outputs(
        &self,
        job_id: i64,
        hosts: &[String],
        since: Option<f64>,
    ) -> ApiResult<BulkPoll>;

    /// Requests cancellation of a job, returning the HTTP status Satellite answered with.
    async fn cancel(&self, job_id: i64) -> ApiResult<u16>;

    /// Checks that Satellite is reachable.
    async fn health_check(&self, satellite_instance_id: &str) -> ApiResult<HealthStatus>;
}
