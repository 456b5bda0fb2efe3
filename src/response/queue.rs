//! Response queue: the single producer side of the outbound message stream.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::messages::{self, CancelStatus, Classification, Message, RunStatus};

/// Destination of outbound messages.
///
/// Delivery order is the order of `put` calls; sinks must not reorder.
pub trait ResponseSink: Send + Sync + Debug {
    /// Delivers one message.
    fn put(&self, message: Message);
}

/// Sink forwarding messages into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Message>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ResponseSink for ChannelSink {
    fn put(&self, message: Message) {
        if let Err(err) = self.sender.send(message) {
            warn!(
                "Dropping message for playbook run {}: receiver closed",
                err.0.playbook_run_id()
            );
        }
    }
}

/// Sink collecting messages in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<Message>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message received so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Removes and returns every message received so far.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl ResponseSink for MemorySink {
    fn put(&self, message: Message) {
        self.messages.lock().push(message);
    }
}

/// Typed front of a [`ResponseSink`].
#[derive(Debug, Clone)]
pub struct ResponseQueue {
    sink: Arc<dyn ResponseSink>,
}

impl ResponseQueue {
    /// Wraps a sink.
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self { sink }
    }

    fn put(&self, message: Message) {
        trace!(?message, "queueing response");
        self.sink.put(message);
    }

    /// Reports that the run was dispatched to Satellite.
    pub fn ack(&self, playbook_run_id: &str) {
        self.put(messages::ack(playbook_run_id));
    }

    /// Queues console output of a host.
    pub fn playbook_run_update(
        &self,
        host: &str,
        playbook_run_id: &str,
        console: &str,
        sequence: u64,
    ) {
        self.put(messages::playbook_run_update(
            host,
            playbook_run_id,
            console,
            sequence,
        ));
    }

    /// Queues the terminal state of a host.
    pub fn playbook_run_finished(
        &self,
        host: &str,
        playbook_run_id: &str,
        status: RunStatus,
        connection_result: Option<bool>,
        exit_code: Option<i64>,
    ) {
        self.put(messages::playbook_run_finished(
            host,
            playbook_run_id,
            status,
            connection_result,
            exit_code,
        ));
    }

    /// Queues the run verdict.
    pub fn playbook_run_completed(
        &self,
        playbook_run_id: &str,
        status: RunStatus,
        classification: Classification,
    ) {
        self.put(messages::playbook_run_completed(
            playbook_run_id,
            status,
            classification,
        ));
    }

    /// Queues the answer to a cancellation request.
    pub fn playbook_run_cancel_ack(&self, playbook_run_id: &str, status: CancelStatus) {
        self.put(messages::playbook_run_cancel_ack(playbook_run_id, status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_order() {
        let sink = Arc::new(MemorySink::new());
        let queue = ResponseQueue::new(sink.clone());

        queue.ack("play_id");
        queue.playbook_run_update("host1", "play_id", "controlled failure", 0);
        queue.playbook_run_finished("host1", "play_id", RunStatus::Failure, None, None);
        queue.playbook_run_completed(
            "play_id",
            RunStatus::Failure,
            Classification::connection("controlled failure"),
        );

        assert_eq!(
            sink.drain(),
            vec![
                messages::ack("play_id"),
                messages::playbook_run_update("host1", "play_id", "controlled failure", 0),
                messages::playbook_run_finished("host1", "play_id", RunStatus::Failure, None, None),
                messages::playbook_run_completed(
                    "play_id",
                    RunStatus::Failure,
                    Classification::connection("controlled failure"),
                ),
            ]
        );
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut receiver) = ChannelSink::new();
        let queue = ResponseQueue::new(Arc::new(sink));

        queue.playbook_run_cancel_ack("play_id", CancelStatus::Finished);

        assert_eq!(
            receiver.recv().await,
            Some(messages::playbook_run_cancel_ack("play_id", CancelStatus::Finished))
        );
    }

    #[test]
    fn test_channel_sink_closed_receiver_does_not_panic() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.put(messages::ack("play_id"));
    }
}
