//! # receptor-satellite
//!
//! A receptor worker that runs Ansible playbooks on hosts managed by Red Hat
//! Satellite and streams their progress back as protocol messages.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Worker (execute / cancel / health_check)     │
//! └──────────────────────────────────────────────────────────────┘
//!          │                      │                      │
//!          ▼                      ▼                      ▼
//! ┌─────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  Run            │   │  Run registry    │   │  Satellite API   │
//! │  (verify,       │◄──┤  (dedup, cancel) │   │  (trigger, poll, │
//! │   trigger, poll)│   └──────────────────┘   │   cancel, status)│
//! └─────────────────┘                          └──────────────────┘
//!          │
//!          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │     Response queue (ack, update, finished, completed, ...)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use receptor_satellite::prelude::*;
//!
//! let (sink, mut messages) = ChannelSink::new();
//! let worker = Worker::new(&WorkerConfig::load(None)?, ResponseQueue::new(Arc::new(sink)));
//! worker.dispatch(Directive::parse(line)?).await;
//! ```

pub mod config;
pub mod error;
pub mod response;
pub mod run;
pub mod satellite;
pub mod verifier;
pub mod worker;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::WorkerConfig;
    pub use crate::error::{Error, Result};
    pub use crate::response::{
        CancelStatus, ChannelSink, Classification, MemorySink, Message, ResponseQueue,
        ResponseSink, RunStatus,
    };
    pub use crate::run::{Host, Run, RunConfig, RunContext, RunRegistry, RunRequest, RunServices};
    pub use crate::satellite::{ApiError, SatelliteApi, SatelliteClient, SatelliteClientConfig};
    pub use crate::verifier::{CommandVerifier, PlaybookVerifier, ValidationError};
    pub use crate::worker::{Directive, Worker};
}

pub use error::{Error, Result};

/// Version of the crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
