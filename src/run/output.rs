//! Classification of console output.
//!
//! Satellite appends `Exit status: N` to the output of every host the job ran
//! on (`EXCEPTION` when the capsule failed to talk to the host), and
//! ansible-playbook prints a recap line per host with its `unreachable=` count.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches the exit status marker Satellite appends to the output.
static EXIT_STATUS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)Exit status: (([0-9]+)|EXCEPTION)").expect("Invalid exit status regex")
});

/// Matches a non-zero unreachable count in a recap line.
static UNREACHABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"unreachable=[1-9][0-9]*").expect("Invalid unreachable regex"));

/// Exit status marker found in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The playbook exited with this code
    Code(i64),
    /// The capsule failed before the playbook could report a code
    Exception,
}

impl ExitStatus {
    /// Returns the numeric code, if any.
    pub fn code(self) -> Option<i64> {
        match self {
            ExitStatus::Code(code) => Some(code),
            ExitStatus::Exception => None,
        }
    }
}

/// Returns the first exit status marker in `output`.
pub fn find_exit_status(output: &str) -> Option<ExitStatus> {
    let captures = EXIT_STATUS_REGEX.captures(output)?;
    match captures.get(2) {
        // Codes too large for i64 are still failures
        Some(code) => Some(ExitStatus::Code(code.as_str().parse().unwrap_or(i64::MAX))),
        None => Some(ExitStatus::Exception),
    }
}

/// Whether a recap line reports the host as unreachable.
pub fn is_unreachable(recap_line: &str) -> bool {
    UNREACHABLE_REGEX.is_match(recap_line)
}

/// Finds the recap line of one host.
#[derive(Debug, Clone)]
pub struct RecapMatcher {
    regex: Regex,
}

impl RecapMatcher {
    /// Builds a matcher for `host`.
    pub fn new(host: &str) -> Self {
        let pattern = format!("^.*{}.*ok=[0-9]+", regex::escape(host));
        Self {
            regex: Regex::new(&pattern).expect("Escaped host name yields a valid regex"),
        }
    }

    /// Whether `line` is a recap line of the host.
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Returns the last recap line of the host in `output`.
    pub fn last_recap_line<'a>(&self, output: &'a str) -> Option<&'a str> {
        output.split('\n').rev().find(|line| self.is_match(line))
    }
}
