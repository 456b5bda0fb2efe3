//! Per-host polling and outcome classification.

use tracing::{debug, warn};

use crate::response::RunStatus;
use crate::satellite::{ApiError, HostOutput};

use super::output::{find_exit_status, is_unreachable, ExitStatus, RecapMatcher};
use super::RunContext;

/// Number of attempts of a poll request before giving up.
pub const POLL_ATTEMPTS: usize = 5;

/// Message reported for hosts Satellite did not resolve.
pub const UNKNOWN_HOST_MESSAGE: &str = "This host is not known by Satellite";

/// One target host of a run.
///
/// A host is mutated only by the task polling it, and becomes immutable once
/// its result is set.
#[derive(Debug, Clone)]
pub struct Host {
    name: String,
    id: Option<i64>,
    sequence: u64,
    since: Option<f64>,
    last_output: String,
    last_recap_line: String,
    recap: RecapMatcher,
    unreachable: Option<bool>,
    result: Option<RunStatus>,
}

impl Host {
    /// Creates a host. In full-text mode no cursor is kept and every poll
    /// returns the whole output.
    pub fn new(name: impl Into<String>, text_update_full: bool) -> Self {
        let name = name.into();
        Self {
            recap: RecapMatcher::new(&name),
            name,
            id: None,
            sequence: 0,
            since: if text_update_full { None } else { Some(0.0) },
            last_output: String::new(),
            last_recap_line: String::new(),
            unreachable: None,
            result: None,
        }
    }

    /// Sets the Satellite host id.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Host name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Satellite host id, once the trigger resolved it.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Sequence number of the next update.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Output cursor, `None` in full-text mode.
    pub fn since(&self) -> Option<f64> {
        self.since
    }

    /// Most recent recap line of this host.
    pub fn last_recap_line(&self) -> &str {
        &self.last_recap_line
    }

    /// `Some(true)` when the job never reported an exit status for this host.
    pub fn unreachable(&self) -> Option<bool> {
        self.unreachable
    }

    /// Terminal outcome, once decided.
    pub fn result(&self) -> Option<RunStatus> {
        self.result
    }

    fn emit_update(&mut self, ctx: &RunContext, console: &str) {
        ctx.queue
            .playbook_run_update(&self.name, &ctx.playbook_run_id, console, self.sequence);
        self.sequence += 1;
    }

    /// Reports the host as failed with `message`.
    pub fn mark_as_failed(
        &mut self,
        ctx: &RunContext,
        message: &str,
        connection_result: Option<bool>,
    ) {
        self.emit_update(ctx, message);
        ctx.queue.playbook_run_finished(
            &self.name,
            &ctx.playbook_run_id,
            RunStatus::Failure,
            connection_result,
            None,
        );
        self.result = Some(RunStatus::Failure);
    }

    /// Handles one output payload: emits an update when there is something to
    /// show and refreshes the recap line.
    pub fn process_output(&mut self, ctx: &RunContext, payload: &HostOutput) {
        if !payload.output.is_empty() && (ctx.config.text_updates || payload.complete) {
            let console: String = payload
                .output
                .iter()
                .map(|chunk| chunk.output.as_str())
                .collect();

            if self.since.is_some() {
                if let Some(timestamp) = payload.output.last().and_then(|chunk| chunk.timestamp) {
                    self.since = Some(timestamp);
                }
            }

            self.emit_update(ctx, &console);
            self.last_output = console;
        }

        self.find_recap_line();
    }

    fn find_recap_line(&mut self) {
        if let Some(line) = self.recap.last_recap_line(&self.last_output) {
            self.last_recap_line = line.to_string();
        }
    }

    /// Decides the terminal outcome from the collected output and reports it.
    pub fn done(&mut self, ctx: &RunContext) {
        let cancelled = ctx.is_cancelled();
        let mut connection_result = Some(true);
        let mut exit_code = None;

        let result = match find_exit_status(&self.last_output) {
            Some(ExitStatus::Code(code)) => {
                self.unreachable = Some(false);
                exit_code = Some(code);
                if code == 0 {
                    RunStatus::Success
                } else if cancelled {
                    RunStatus::Cancel
                } else {
                    RunStatus::Failure
                }
            }
            Some(ExitStatus::Exception) => {
                self.unreachable = Some(false);
                RunStatus::Failure
            }
            // The job never started on the host
            None if cancelled => RunStatus::Cancel,
            None => {
                self.unreachable = Some(true);
                connection_result = None;
                RunStatus::Failure
            }
        };

        if is_unreachable(&self.last_recap_line) {
            connection_result = Some(false);
        }

        ctx.queue.playbook_run_finished(
            &self.name,
            &ctx.playbook_run_id,
            result,
            connection_result,
            exit_code,
        );
        self.result = Some(result);
    }

    /// Polls this host alone until it completes or polling keeps failing.
    pub async fn poll(&mut self, ctx: &RunContext) {
        let (Some(host_id), Some(job_id)) = (self.id, ctx.job_invocation_id) else {
            self.mark_as_failed(ctx, UNKNOWN_HOST_MESSAGE, None);
            return;
        };

        while let Some(payload) = self.poll_with_retries(ctx, job_id, host_id).await {
            self.process_output(ctx, &payload);
            if payload.complete {
                self.done(ctx);
                break;
            }
        }
    }

    /// Requests the next output, retrying up to [`POLL_ATTEMPTS`] times. On
    /// exhaustion the host is marked as failed and `None` is returned.
    async fn poll_with_retries(
        &mut self,
        ctx: &RunContext,
        job_id: i64,
        host_id: i64,
    ) -> Option<HostOutput> {
        let mut last_error = None;
        for attempt in 1..=POLL_ATTEMPTS {
            tokio::time::sleep(ctx.config.poll_interval()).await;
            match ctx.api.output(job_id, host_id, self.since).await {
                Ok(payload) => return Some(payload),
                Err(err) => {
                    debug!(
                        "Polling host {} failed (attempt {}/{}): {}",
                        self.name, attempt, POLL_ATTEMPTS, err
                    );
                    last_error = Some(err);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| ApiError::request("Polling failed"));
        warn!("Giving up polling host {}: {}", self.name, error);
        self.mark_as_failed(ctx, &error.to_string(), None);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_depends_on_mode() {
        assert_eq!(Host::new("host1", true).since(), None);
        assert_eq!(Host::new("host1", false).since(), Some(0.0));
    }

    #[test]
    fn test_new_host_state() {
        let host = Host::new("host1", true).with_id(5);
        assert_eq!(host.name(), "host1");
        assert_eq!(host.id(), Some(5));
        assert_eq!(host.sequence(), 0);
        assert_eq!(host.unreachable(), None);
        assert_eq!(host.result(), None);
        assert_eq!(host.last_recap_line(), "");
    }
}
