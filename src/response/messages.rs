//! Outbound protocol messages.
//!
//! Field names are the wire contract consumed downstream; each message is a
//! JSON object tagged by `type`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol version carried by finished/completed messages.
pub const PROTOCOL_VERSION: u8 = 2;

/// Outcome of a host or of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Finished successfully
    Success,
    /// Finished with an error
    Failure,
    /// Stopped by a cancellation request
    #[serde(rename = "canceled")]
    Cancel,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failure => write!(f, "failure"),
            RunStatus::Cancel => write!(f, "canceled"),
        }
    }
}

/// Answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStatus {
    /// The run had already finished
    Finished,
    /// Satellite accepted the cancellation
    Cancelling,
    /// The run is unknown or Satellite refused
    Failure,
}

/// A message sent to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// The run has been dispatched to Satellite.
    PlaybookRunAck {
        /// Run identifier
        playbook_run_id: String,
    },

    /// Console output of a host.
    PlaybookRunUpdate {
        /// Run identifier
        playbook_run_id: String,
        /// Host name
        host: String,
        /// Per-host update counter, starting at 0
        sequence: u64,
        /// Console text
        console: String,
    },

    /// A host reached a terminal state.
    PlaybookRunFinished {
        /// Protocol version
        version: u8,
        /// Run identifier
        playbook_run_id: String,
        /// Host name
        host: String,
        /// Host outcome
        status: RunStatus,
        /// 0 connected, 1 connection failed, null undetermined
        connection_code: Option<u8>,
        /// Playbook exit code when known
        execution_code: Option<i64>,
    },

    /// The whole run reached a terminal state.
    PlaybookRunCompleted {
        /// Protocol version
        version: u8,
        /// Run identifier
        playbook_run_id: String,
        /// Run verdict
        status: RunStatus,
        /// 0 or 1
        playbook_validation_code: Option<u8>,
        /// Validation failure message
        playbook_validation_error: Option<String>,
        /// 0, 1 or null
        satellite_connection_code: Option<u8>,
        /// Connection failure message
        satellite_connection_error: Option<String>,
        /// 0, 1 or null
        satellite_infrastructure_code: Option<u8>,
        /// Infrastructure failure message
        satellite_infrastructure_error: Option<String>,
    },

    /// Answer to a cancellation request.
    PlaybookRunCancelAck {
        /// Run identifier
        playbook_run_id: String,
        /// Cancellation outcome
        status: CancelStatus,
    },
}

impl Message {
    /// Returns the run identifier the message refers to.
    pub fn playbook_run_id(&self) -> &str {
        match self {
            Message::PlaybookRunAck { playbook_run_id }
            | Message::PlaybookRunUpdate { playbook_run_id, .. }
            | Message::PlaybookRunFinished { playbook_run_id, .. }
            | Message::PlaybookRunCompleted { playbook_run_id, .. }
            | Message::PlaybookRunCancelAck { playbook_run_id, .. } => playbook_run_id,
        }
    }
}

/// The three error classifications of a completion message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Playbook signature validation failure
    pub validation_error: Option<String>,
    /// Satellite could not be reached or kept failing
    pub connection_error: Option<String>,
    /// A host reported its execution layer unreachable
    pub infrastructure_error: Option<String>,
}

impl Classification {
    /// No error.
    pub fn none() -> Self {
        Self::default()
    }

    /// Validation error.
    pub fn validation(error: impl Into<String>) -> Self {
        Self {
            validation_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Connection error.
    pub fn connection(error: impl Into<String>) -> Self {
        Self {
            connection_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Infrastructure error.
    pub fn infrastructure(error: impl Into<String>) -> Self {
        Self {
            infrastructure_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// The message of the highest-precedence error, if any.
    pub fn message(&self) -> Option<&str> {
        self.validation_error
            .as_deref()
            .or(self.connection_error.as_deref())
            .or(self.infrastructure_error.as_deref())
    }
}

/// Builds a run ack message.
pub fn ack(playbook_run_id: impl Into<String>) -> Message {
    Message::PlaybookRunAck {
        playbook_run_id: playbook_run_id.into(),
    }
}

/// Builds a console update message for `host`.
pub fn playbook_run_update(
    host: impl Into<String>,
    playbook_run_id: impl Into<String>,
    console: impl Into<String>,
    sequence: u64,
) -> Message {
    Message::PlaybookRunUpdate {
        playbook_run_id: playbook_run_id.into(),
        host: host.into(),
        sequence,
        console: console.into(),
    }
}

/// Builds a host finished message.
///
/// `connection_result` is `Some(true)` when Satellite reached the host,
/// `Some(false)` when it explicitly could not and `None` when undetermined. The
/// exit code is only reported for connected hosts.
pub fn playbook_run_finished(
    host: impl Into<String>,
    playbook_run_id: impl Into<String>,
    status: RunStatus,
    connection_result: Option<bool>,
    exit_code: Option<i64>,
) -> Message {
    let connection_code = connection_result.map(|connected| if connected { 0 } else { 1 });
    let execution_code = match connection_result {
        Some(true) => exit_code,
        _ => None,
    };

    Message::PlaybookRunFinished {
        version: PROTOCOL_VERSION,
        playbook_run_id: playbook_run_id.into(),
        host: host.into(),
        status,
        connection_code,
        execution_code,
    }
}

/// Builds a run completed message.
///
/// Exactly one classification drives the codes: a validation error nulls the
/// connection and infrastructure codes, a connection error nulls the
/// infrastructure code, and a cancelled run nulls both regardless.
pub fn playbook_run_completed(
    playbook_run_id: impl Into<String>,
    status: RunStatus,
    classification: Classification,
) -> Message {
    let Classification {
        validation_error,
        connection_error,
        infrastructure_error,
    } = classification;

    let mut validation_code = Some(0);
    let mut connection_code = Some(0);
    let mut infrastructure_code = Some(0);

    if validation_error.is_some() {
        validation_code = Some(1);
        connection_code = None;
        infrastructure_code = None;
    } else if connection_error.is_some() {
        connection_code = Some(1);
        infrastructure_code = None;
    } else if infrastructure_error.is_some() {
        infrastructure_code = Some(1);
    }

    if status == RunStatus::Cancel {
        connection_code = None;
        infrastructure_code = None;
    }

    Message::PlaybookRunCompleted {
        version: PROTOCOL_VERSION,
        playbook_run_id: playbook_run_id.into(),
        status,
        playbook_validation_code: validation_code,
        playbook_validation_error: validation_error,
        satellite_connection_code: connection_code,
        satellite_connection_error: connection_error,
        satellite_infrastructure_code: infrastructure_code,
        satellite_infrastructure_error: infrastructure_error,
    }
}

/// Builds the answer to a cancellation request.
pub fn playbook_run_cancel_ack(playbook_run_id: impl Into<String>, status: CancelStatus) -> Message {
    Message::PlaybookRunCancelAck {
        playbook_run_id: playbook_run_id.into(),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codes(message: &Message) -> (Option<u8>, Option<u8>, Option<u8>) {
        match message {
            Message::PlaybookRunCompleted {
                playbook_validation_code,
                satellite_connection_code,
                satellite_infrastructure_code,
                ..
            } => (
                *playbook_validation_code,
                *satellite_connection_code,
                *satellite_infrastructure_code,
            ),
            other => panic!("not a completion message: {:?}", other),
        }
    }

    #[test]
    fn test_completion_code_precedence() {
        let cases = [
            (RunStatus::Success, Classification::none(), (Some(0), Some(0), Some(0))),
            (RunStatus::Failure, Classification::none(), (Some(0), Some(0), Some(0))),
            (RunStatus::Cancel, Classification::none(), (Some(0), None, None)),
            (
                RunStatus::Failure,
                Classification::connection("Satellite unreachable"),
                (Some(0), Some(1), None),
            ),
            (
                RunStatus::Failure,
                Classification::infrastructure("Capsule is down"),
                (Some(0), Some(0), Some(1)),
            ),
            (
                RunStatus::Failure,
                Classification::validation("Playbook validation failed"),
                (Some(1), None, None),
            ),
            (
                RunStatus::Cancel,
                Classification::infrastructure("Infrastructure error"),
                (Some(0), None, None),
            ),
            (
                RunStatus::Cancel,
                Classification::connection("Satellite unreachable"),
                (Some(0), None, None),
            ),
        ];

        for (status, classification, expected) in cases {
            let message = playbook_run_completed("some-uuid", status, classification.clone());
            assert_eq!(
                codes(&message),
                expected,
                "status {:?} with {:?}",
                status,
                classification
            );
        }
    }

    #[test]
    fn test_completion_keeps_error_text() {
        let message = playbook_run_completed(
            "some-uuid",
            RunStatus::Cancel,
            Classification::connection("Satellite unreachable"),
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["satellite_connection_error"], "Satellite unreachable");
        assert_eq!(value["satellite_connection_code"], serde_json::Value::Null);
        assert_eq!(value["status"], "canceled");
    }

    #[test]
    fn test_finished_connection_codes() {
        let cases = [
            (Some(true), Some(123), Some(0), Some(123)),
            (Some(true), None, Some(0), None),
            (Some(false), Some(1), Some(1), None),
            (None, Some(1), None, None),
            (None, None, None, None),
        ];

        for (connection_result, exit_code, connection_code, execution_code) in cases {
            let message = playbook_run_finished(
                "host1",
                "play_id",
                RunStatus::Failure,
                connection_result,
                exit_code,
            );
            assert_eq!(
                message,
                Message::PlaybookRunFinished {
                    version: PROTOCOL_VERSION,
                    playbook_run_id: "play_id".to_string(),
                    host: "host1".to_string(),
                    status: RunStatus::Failure,
                    connection_code,
                    execution_code,
                }
            );
        }
    }

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(ack("play_id")).unwrap(),
            json!({"type": "playbook_run_ack", "playbook_run_id": "play_id"})
        );

        assert_eq!(
            serde_json::to_value(playbook_run_update("host1", "play_id", "Exit status: 0", 3))
                .unwrap(),
            json!({
                "type": "playbook_run_update",
                "playbook_run_id": "play_id",
                "host": "host1",
                "sequence": 3,
                "console": "Exit status: 0"
            })
        );

        assert_eq!(
            serde_json::to_value(playbook_run_finished(
                "host1",
                "play_id",
                RunStatus::Success,
                Some(true),
                Some(0)
            ))
            .unwrap(),
            json!({
                "type": "playbook_run_finished",
                "version": 2,
                "playbook_run_id": "play_id",
                "host": "host1",
                "status": "success",
                "connection_code": 0,
                "execution_code": 0
            })
        );

        assert_eq!(
            serde_json::to_value(playbook_run_cancel_ack("play_id", CancelStatus::Cancelling))
                .unwrap(),
            json!({
                "type": "playbook_run_cancel_ack",
                "playbook_run_id": "play_id",
                "status": "cancelling"
            })
        );
    }

    #[test]
    fn test_completed_wire_shape() {
        let value = serde_json::to_value(playbook_run_completed(
            "play_id",
            RunStatus::Failure,
            Classification::validation("bad signature"),
        ))
        .unwrap();
        assert_eq!(
            value,
            json!({
                "type": "playbook_run_completed",
                "version": 2,
                "playbook_run_id": "play_id",
                "status": "failure",
                "playbook_validation_code": 1,
                "playbook_validation_error": "bad signature",
                "satellite_connection_code": null,
                "satellite_connection_error": null,
                "satellite_infrastructure_code": null,
                "satellite_infrastructure_error": null
            })
        );
    }

    #[test]
    fn test_status_display_matches_wire() {
        for status in [RunStatus::Success, RunStatus::Failure, RunStatus::Cancel] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, json!(status.to_string()));
        }
    }

    #[test]
    fn test_classification_message() {
        assert_eq!(Classification::none().message(), None);
        assert_eq!(
            Classification::connection("Satellite unreachable").message(),
            Some("Satellite unreachable")
        );
        let both = Classification {
            validation_error: Some("bad signature".to_string()),
            ..Classification::infrastructure("Infrastructure error")
        };
        assert_eq!(both.message(), Some("bad signature"));
    }
}
