//! Response protocol.
//!
//! [`messages`] holds the wire shapes and their pure constructors; [`queue`]
//! delivers them in order to a [`ResponseSink`].

pub mod messages;
pub mod queue;

pub use messages::{CancelStatus, Classification, Message, RunStatus, PROTOCOL_VERSION};
pub use queue::{ChannelSink, MemorySink, ResponseQueue, ResponseSink};
