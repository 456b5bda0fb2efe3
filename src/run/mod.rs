//! Playbook run orchestration.
//!
//! A [`Run`] owns one playbook execution from registration to completion:
//!
//! ```text
//!  register ─► verify ─► trigger ─► ack ─► bulk poll ──────────► finish ─► mark finished
//!     │           │          │                 │  404                ▲
//!     │           │          │                 └─► per-host polls ───┘
//!     │           └──────────┴─── abort (validation / connection) ───┘
//!     └─ duplicate: skipped
//! ```
//!
//! Every outcome, including failures, is reported through the response queue;
//! [`Run::start`] itself never fails.

pub mod config;
pub mod host;
pub mod output;
pub mod registry;

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::response::{Classification, ResponseQueue, RunStatus};
use crate::satellite::{ApiError, BulkOutputs, BulkPoll, SatelliteApi, TargetHost};
use crate::verifier::PlaybookVerifier;

pub use config::RunConfig;
pub use host::{Host, POLL_ATTEMPTS, UNKNOWN_HOST_MESSAGE};
pub use registry::{Lookup, RunHandle, RunRegistry};

/// Message reported for hosts whose name cannot be used in a search query.
pub const COMMA_HOSTNAME_MESSAGE: &str = "Hostname contains a comma, skipping";

/// Infrastructure error reported when a host never started the job.
pub const INFRASTRUCTURE_ERROR: &str = "Infrastructure error";

/// Incoming request to run a playbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Remediation the playbook belongs to
    pub remediation_id: String,
    /// Run identifier, unique per execution
    pub playbook_run_id: String,
    /// Account the run belongs to
    pub account: String,
    /// Target host names
    pub hosts: Vec<String>,
    /// Signed playbook
    pub playbook: String,
    /// Raw run configuration
    #[serde(default)]
    pub config: Value,
}

/// Collaborators a run works with.
#[derive(Clone)]
pub struct RunServices {
    /// Satellite API; its session is scoped to the run
    pub api: Arc<dyn SatelliteApi>,
    /// Playbook signature verifier
    pub verifier: Arc<dyn PlaybookVerifier>,
    /// Registry used for deduplication and cancellation
    pub registry: Arc<RunRegistry>,
    /// Outbound messages
    pub queue: ResponseQueue,
}

/// State of a run shared read-only with its host pollers.
pub struct RunContext {
    /// Run identifier
    pub playbook_run_id: String,
    /// Normalized configuration
    pub config: RunConfig,
    /// Satellite job, once triggered
    pub job_invocation_id: Option<i64>,
    /// Satellite API
    pub api: Arc<dyn SatelliteApi>,
    /// Outbound messages
    pub queue: ResponseQueue,
    handle: RunHandle,
}

impl RunContext {
    /// Creates a context for a run that has not been triggered yet.
    pub fn new(
        playbook_run_id: impl Into<String>,
        config: RunConfig,
        api: Arc<dyn SatelliteApi>,
        queue: ResponseQueue,
    ) -> Self {
        let playbook_run_id = playbook_run_id.into();
        Self {
            handle: RunHandle::new(playbook_run_id.clone()),
            playbook_run_id,
            config,
            job_invocation_id: None,
            api,
            queue,
        }
    }

    /// Records the Satellite job of the run.
    pub fn with_job_invocation_id(mut self, id: i64) -> Self {
        self.set_job_invocation_id(id);
        self
    }

    fn set_job_invocation_id(&mut self, id: i64) {
        self.job_invocation_id = Some(id);
        self.handle.set_job_invocation_id(id);
    }

    /// Handle used to cancel the run from elsewhere.
    pub fn handle(&self) -> &RunHandle {
        &self.handle
    }

    /// Whether a cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

/// Which hosts an abort reports as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbortScope {
    /// Every valid host of the run
    All,
    /// Hosts still being polled
    Active,
}

/// Result of a bulk poll with retries.
enum BulkOutcome {
    Outputs(BulkOutputs),
    NotFound,
    Exhausted(ApiError),
}

/// One playbook execution.
pub struct Run {
    ctx: RunContext,
    remediation_id: String,
    account: String,
    playbook: String,
    hosts: Vec<Host>,
    /// Hosts dropped because their name cannot be used in a search query
    rejected: Vec<Host>,
    /// Indexes into `hosts` of the hosts still being polled
    active: Vec<usize>,
    /// Bulk poll cursor, `None` in full-text mode
    since: Option<f64>,
    verifier: Arc<dyn PlaybookVerifier>,
    registry: Arc<RunRegistry>,
}

impl Run {
    /// Builds a run from a request.
    ///
    /// Hostnames containing a comma cannot be expressed in a Satellite search
    /// query; they are set aside and reported as failed once the run starts.
    pub fn new(request: RunRequest, services: RunServices) -> Self {
        let RunRequest {
            remediation_id,
            playbook_run_id,
            account,
            hosts,
            playbook,
            config,
        } = request;
        let RunServices {
            api,
            verifier,
            registry,
            queue,
        } = services;

        let config = RunConfig::from_value(&config, |message| warn!("{}", message));
        let ctx = RunContext::new(playbook_run_id, config, api, queue);

        let (rejected, hosts): (Vec<Host>, Vec<Host>) = hosts
            .into_iter()
            .map(|name| Host::new(name, config.text_update_full))
            .partition(|host| host.name().contains(','));

        Self {
            ctx,
            remediation_id,
            account,
            playbook,
            hosts,
            rejected,
            active: Vec::new(),
            since: if config.text_update_full { None } else { Some(0.0) },
            verifier,
            registry,
        }
    }

    /// Run identifier.
    pub fn playbook_run_id(&self) -> &str {
        &self.ctx.playbook_run_id
    }

    /// Remediation the run belongs to.
    pub fn remediation_id(&self) -> &str {
        &self.remediation_id
    }

    /// Account the run belongs to.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Normalized configuration.
    pub fn config(&self) -> &RunConfig {
        &self.ctx.config
    }

    /// Hosts that will be targeted.
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Handle used to cancel the run from elsewhere.
    pub fn handle(&self) -> RunHandle {
        self.ctx.handle().clone()
    }

    /// Executes the run to completion.
    #[instrument(skip(self), fields(playbook_run_id = %self.ctx.playbook_run_id, account = %self.account))]
    pub async fn start(mut self) {
        let playbook_run_id = self.ctx.playbook_run_id.clone();
        if !self.registry.register(self.ctx.handle().clone()) {
            error!("Playbook run {} already known, skipping.", playbook_run_id);
            return;
        }

        for host in &mut self.rejected {
            warn!("Hostname '{}' contains a comma, skipping", host.name());
            host.mark_as_failed(&self.ctx, COMMA_HOSTNAME_MESSAGE, Some(true));
        }

        let session = self.ctx.api.init_session().await;
        match session {
            Ok(()) => {
                self.execute().await;
                self.ctx.api.close_session().await;
            }
            Err(err) => self.abort(Classification::connection(err.to_string()), AbortScope::All),
        }

        self.registry.mark_finished(&playbook_run_id);
        info!("Playbook run {} done", playbook_run_id);
    }

    async fn execute(&mut self) {
        let verified = self.verifier.verify(&self.playbook).await;
        match verified {
            Ok(verified) => self.playbook = verified,
            Err(err) => {
                let message = format!("Playbook failed signature validation: {}", err);
                self.abort(Classification::validation(message), AbortScope::All);
                return;
            }
        }

        let names: Vec<String> = self.hosts.iter().map(|h| h.name().to_string()).collect();
        let response = self.ctx.api.trigger(&self.playbook, &names).await;
        self.ctx.queue.ack(&self.ctx.playbook_run_id);

        let job = match response {
            Ok(job) => job,
            Err(err) => {
                self.abort(Classification::connection(err.to_string()), AbortScope::All);
                return;
            }
        };

        self.ctx.set_job_invocation_id(job.id);
        info!(
            "Playbook run {} running as job invocation {}",
            self.ctx.playbook_run_id, job.id
        );

        self.update_hosts(&job.targeting.hosts);
        if self.polling_loop().await {
            self.finish();
        }
    }

    /// Assigns Satellite ids; hosts Satellite did not resolve are failed and
    /// never polled.
    fn update_hosts(&mut self, targets: &[TargetHost]) {
        for target in targets {
            match self.hosts.iter_mut().find(|h| h.name() == target.name) {
                Some(host) => host.set_id(target.id),
                None => warn!("Satellite returned unrequested host '{}'", target.name),
            }
        }

        for (index, host) in self.hosts.iter_mut().enumerate() {
            if host.id().is_some() {
                self.active.push(index);
            } else {
                host.mark_as_failed(&self.ctx, UNKNOWN_HOST_MESSAGE, None);
            }
        }
    }

    /// Polls until every active host is done. Returns `false` when the run was
    /// aborted.
    async fn polling_loop(&mut self) -> bool {
        while !self.active.is_empty() {
            match self.bulk_poll_with_retries().await {
                BulkOutcome::Outputs(outputs) => self.process_bulk(outputs),
                BulkOutcome::NotFound => {
                    debug!(
                        "Bulk polling not available for playbook run {}, polling hosts individually",
                        self.ctx.playbook_run_id
                    );
                    self.poll_hosts_individually().await;
                    break;
                }
                BulkOutcome::Exhausted(err) => {
                    self.abort(Classification::connection(err.to_string()), AbortScope::Active);
                    return false;
                }
            }
        }
        true
    }

    async fn bulk_poll_with_retries(&self) -> BulkOutcome {
        let Some(job_id) = self.ctx.job_invocation_id else {
            return BulkOutcome::Exhausted(ApiError::request("Playbook run was not triggered"));
        };

        let mut last_error = None;
        for attempt in 1..=POLL_ATTEMPTS {
            tokio::time::sleep(self.ctx.config.poll_interval()).await;
            let names: Vec<String> = self
                .active
                .iter()
                .map(|&index| self.hosts[index].name().to_string())
                .collect();

            match self.ctx.api.outputs(job_id, &names, self.since).await {
                Ok(BulkPoll::Outputs(outputs)) => return BulkOutcome::Outputs(outputs),
                Ok(BulkPoll::NotFound) => return BulkOutcome::NotFound,
                Err(err) => {
                    debug!(
                        "Bulk polling playbook run {} failed (attempt {}/{}): {}",
                        self.ctx.playbook_run_id, attempt, POLL_ATTEMPTS, err
                    );
                    last_error = Some(err);
                }
            }
        }

        BulkOutcome::Exhausted(last_error.unwrap_or_else(|| ApiError::request("Polling failed")))
    }

    fn process_bulk(&mut self, outputs: BulkOutputs) {
        for entry in outputs.outputs {
            let Some(position) = self
                .active
                .iter()
                .position(|&index| self.hosts[index].id() == Some(entry.host_id))
            else {
                warn!(
                    "Ignoring output for host id {} which is not being polled",
                    entry.host_id
                );
                continue;
            };

            let host = &mut self.hosts[self.active[position]];
            host.process_output(&self.ctx, &entry.payload);

            if let (Some(run_since), Some(host_since)) = (self.since, host.since()) {
                if host_since > run_since {
                    self.since = Some(host_since);
                }
            }

            if entry.payload.complete {
                host.done(&self.ctx);
                self.active.remove(position);
            }
        }
    }

    async fn poll_hosts_individually(&mut self) {
        let active = std::mem::take(&mut self.active);
        let ctx = &self.ctx;
        let pollers = self
            .hosts
            .iter_mut()
            .enumerate()
            .filter(|(index, _)| active.contains(index))
            .map(|(_, host)| host.poll(ctx));
        join_all(pollers).await;
    }

    /// Reports the run verdict once every host is done.
    fn finish(&mut self) {
        let infrastructure_error = self
            .hosts
            .iter()
            .any(|host| host.unreachable() == Some(true))
            .then(|| INFRASTRUCTURE_ERROR.to_string());

        let status = if self.ctx.is_cancelled() {
            RunStatus::Cancel
        } else if self
            .hosts
            .iter()
            .all(|host| host.result() == Some(RunStatus::Success))
        {
            RunStatus::Success
        } else {
            RunStatus::Failure
        };

        self.ctx.queue.playbook_run_completed(
            &self.ctx.playbook_run_id,
            status,
            Classification {
                infrastructure_error,
                ..Classification::none()
            },
        );
    }

    /// Fails the hosts in `scope` and reports the run as failed with `classification`.
    fn abort(&mut self, classification: Classification, scope: AbortScope) {
        let error = classification.message().unwrap_or_default().to_string();
        error!(
            "Playbook run {} encountered error `{}`, aborting.",
            self.ctx.playbook_run_id, error
        );

        let indexes: Vec<usize> = match scope {
            AbortScope::All => (0..self.hosts.len()).collect(),
            AbortScope::Active => std::mem::take(&mut self.active),
        };
        for index in indexes {
            self.hosts[index].mark_as_failed(&self.ctx, &error, None);
        }

        let status = if self.ctx.is_cancelled() {
            RunStatus::Cancel
        } else {
            RunStatus::Failure
        };
        self.ctx
            .queue
            .playbook_run_completed(&self.ctx.playbook_run_id, status, classification);
    }
}
