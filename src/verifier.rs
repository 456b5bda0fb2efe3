//! Playbook signature verification.
//!
//! Playbooks are checked by an external program before they are sent to
//! Satellite. The program reads the signed playbook on stdin and prints the
//! verified playbook on stdout, possibly preceded by log lines.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Default verifier program
pub const DEFAULT_VERIFIER_PROGRAM: &str = "/usr/bin/insights-client";

/// Default verifier arguments
pub const DEFAULT_VERIFIER_ARGS: &[&str] =
    &["--module", "insights.client.apps.ansible.playbook_verifier"];

/// The playbook could not be verified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Checks a playbook signature and returns the playbook to run.
#[async_trait]
pub trait PlaybookVerifier: Send + Sync {
    /// Verifies `playbook`, returning its verified text.
    async fn verify(&self, playbook: &str) -> Result<String, ValidationError>;
}

/// Verifier running an external program.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: PathBuf,
    args: Vec<String>,
}

impl Default for CommandVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_VERIFIER_PROGRAM)
            .with_args(DEFAULT_VERIFIER_ARGS.iter().map(|s| s.to_string()))
    }
}

impl CommandVerifier {
    /// Creates a verifier running `program` without arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Sets the program arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Strips anything the verifier printed before the YAML document start.
fn extract_playbook(stdout: &str) -> String {
    match stdout.find("---") {
        Some(start) => stdout[start..].to_string(),
        None => stdout.to_string(),
    }
}

#[async_trait]
impl PlaybookVerifier for CommandVerifier {
    async fn verify(&self, playbook: &str) -> Result<String, ValidationError> {
        debug!("Verifying playbook with {}", self.program.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    ValidationError::new(format!("{} not found", self.program.display()))
                }
                _ => ValidationError::new(e.to_string()),
            })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let input = playbook.as_bytes().to_vec();
            tokio::spawn(async move {
                stdin.write_all(&input).await?;
                stdin.shutdown().await
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ValidationError::new(e.to_string()))?;

        // The verifier may exit without draining stdin; a broken pipe here is not an error.
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return Ok(extract_playbook(&stdout));
        }

        let code = output
            .status
            .code()
            .map_or_else(|| "unknown".to_string(), |c| c.to_string());
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ValidationError::new(format!(
            "Playbook signature validation exit code: {}\n{}\n{}",
            code, stdout, stderr
        )))
    }
}
