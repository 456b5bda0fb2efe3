//! Process-wide registry of playbook runs.
//!
//! A run registers itself before doing anything, which rejects duplicate
//! executions of the same run id. When it ends, its entry is replaced by a
//! finished marker rather than removed, so a late cancellation can still tell
//! "already finished" apart from "never seen".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tracing::debug;

static GLOBAL_REGISTRY: Lazy<Arc<RunRegistry>> = Lazy::new(|| Arc::new(RunRegistry::new()));

/// Shared view of an in-flight run, used to cancel it from another task.
#[derive(Debug, Clone)]
pub struct RunHandle {
    playbook_run_id: Arc<str>,
    cancelled: Arc<AtomicBool>,
    job_invocation_id: Arc<OnceCell<i64>>,
}

impl RunHandle {
    /// Creates a handle for a run that has not been triggered yet.
    pub fn new(playbook_run_id: impl Into<String>) -> Self {
        Self {
            playbook_run_id: Arc::from(playbook_run_id.into()),
            cancelled: Arc::new(AtomicBool::new(false)),
            job_invocation_id: Arc::new(OnceCell::new()),
        }
    }

    /// The run identifier.
    pub fn playbook_run_id(&self) -> &str {
        &self.playbook_run_id
    }

    /// Flags the run as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether a cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Records the Satellite job invocation id. Only the first call has an effect.
    pub fn set_job_invocation_id(&self, id: i64) {
        let _ = self.job_invocation_id.set(id);
    }

    /// The Satellite job invocation id, once the run has been triggered.
    pub fn job_invocation_id(&self) -> Option<i64> {
        self.job_invocation_id.get().copied()
    }
}

/// Registry entry.
#[derive(Debug, Clone)]
enum Entry {
    Running(RunHandle),
    Finished,
}

/// Result of a registry lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The run is in flight.
    Running(RunHandle),
    /// The run was seen and has ended.
    Finished,
    /// The run was never registered.
    Absent,
}

/// Map from run id to run state, guarded for concurrent use.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, Entry>>,
}

impl RunRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every run of this process.
    pub fn global() -> Arc<RunRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Registers a run. Returns `false` if the id is already known, running or
    /// finished.
    pub fn register(&self, handle: RunHandle) -> bool {
        let mut runs = self.runs.lock();
        if runs.contains_key(handle.playbook_run_id()) {
            return false;
        }
        debug!("Registering playbook run {}", handle.playbook_run_id());
        runs.insert(handle.playbook_run_id().to_string(), Entry::Running(handle));
        true
    }

    /// Replaces the run entry with the finished marker.
    pub fn mark_finished(&self, playbook_run_id: &str) {
        debug!("Playbook run {} marked as finished", playbook_run_id);
        self.runs
            .lock()
            .insert(playbook_run_id.to_string(), Entry::Finished);
    }

    /// Looks a run up.
    pub fn lookup(&self, playbook_run_id: &str) -> Lookup {
        match self.runs.lock().get(playbook_run_id) {
            Some(Entry::Running(handle)) => Lookup::Running(handle.clone()),
            Some(Entry::Finished) => Lookup::Finished,
            None => Lookup::Absent,
        }
    }

    /// Number of runs currently in flight.
    pub fn running(&self) -> usize {
        self.runs
            .lock()
            .values()
            .filter(|entry| matches!(entry, Entry::Running(_)))
            .count()
    }
}
