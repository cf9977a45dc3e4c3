use std::fmt;

use serde::{Deserialize, Serialize};

/// How a process finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    /// Process exited on its own with the given code
    Normal(i32),

    /// Process was terminated by a fatal signal (e.g. "SIGSEGV")
    Signaled(String),

    /// Wall-clock budget exceeded; the process group was killed
    TimedOut,

    /// The process could not be spawned
    FailedToStart,
}

impl ExitKind {
    /// Check if the process exited normally with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitKind::Normal(0))
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Normal(code) => write!(f, "exit code {code}"),
            ExitKind::Signaled(name) => write!(f, "killed by {name}"),
            ExitKind::TimedOut => write!(f, "timed out"),
            ExitKind::FailedToStart => write!(f, "failed to start"),
        }
    }
}

/// Result of a single process execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// How the process finished
    pub exit: ExitKind,

    /// Captured standard output, decoded lossily as UTF-8
    pub stdout: String,

    /// Standard output exactly as the process wrote it
    pub raw_stdout: Vec<u8>,

    /// Captured standard error, with a trailing signal diagnostic if any
    pub stderr: String,

    /// Wall clock time in milliseconds (the timeout bound for `TimedOut`)
    pub elapsed_ms: u64,
}

impl RunOutcome {
    /// Outcome for a process that never started
    pub fn failed_to_start(message: impl Into<String>) -> Self {
        Self {
            exit: ExitKind::FailedToStart,
            stdout: String::new(),
            raw_stdout: Vec::new(),
            stderr: message.into(),
            elapsed_ms: 0,
        }
    }

    /// Check if the execution was successful (exited with code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit.is_success()
    }
}

/// A single test case supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable identity of the case (not its position in a batch)
    pub index: usize,

    /// Text fed to the program's standard input
    pub input: String,

    /// Output the program is expected to print
    pub expected_output: String,
}

impl TestCase {
    pub fn new(index: usize, input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            index,
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Classified outcome of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictStatus {
    #[serde(rename = "AC")]
    Accepted,

    #[serde(rename = "WA")]
    WrongAnswer,

    #[serde(rename = "RE")]
    RuntimeError,

    #[serde(rename = "TLE")]
    TimeLimitExceeded,

    #[serde(rename = "FTS")]
    FailedToStart,
}

impl VerdictStatus {
    /// Derive a verdict from a finished run and the expected output
    pub fn judge(outcome: &RunOutcome, expected_output: &str) -> Self {
        match outcome.exit {
            ExitKind::TimedOut => VerdictStatus::TimeLimitExceeded,
            ExitKind::FailedToStart => VerdictStatus::FailedToStart,
            ExitKind::Normal(0) => {
                if crate::normalize::outputs_equal(&outcome.stdout, expected_output) {
                    VerdictStatus::Accepted
                } else {
                    VerdictStatus::WrongAnswer
                }
            }
            ExitKind::Normal(_) | ExitKind::Signaled(_) => VerdictStatus::RuntimeError,
        }
    }

    /// Short judge-style code (AC, WA, ...)
    pub fn code(&self) -> &'static str {
        match self {
            VerdictStatus::Accepted => "AC",
            VerdictStatus::WrongAnswer => "WA",
            VerdictStatus::RuntimeError => "RE",
            VerdictStatus::TimeLimitExceeded => "TLE",
            VerdictStatus::FailedToStart => "FTS",
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, VerdictStatus::Accepted)
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Verdict for one test case, tagged with the originating case index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVerdict {
    /// Index of the test case this verdict belongs to
    pub index: usize,

    /// Program output
    pub output: String,

    /// Program error output
    pub error: String,

    /// Verdict status
    pub status: VerdictStatus,

    /// Wall clock time in milliseconds
    pub elapsed_ms: u64,
}

impl TestVerdict {
    /// Judge a run outcome against a test case
    pub fn from_outcome(case: &TestCase, outcome: RunOutcome) -> Self {
        let status = VerdictStatus::judge(&outcome, &case.expected_output);
        Self {
            index: case.index,
            output: outcome.stdout,
            error: outcome.stderr,
            status,
            elapsed_ms: outcome.elapsed_ms,
        }
    }
}

/// One timing observation from a stress iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressSample {
    /// Generated input size in bytes
    pub input_size: usize,

    /// Candidate wall clock time in milliseconds
    pub candidate_elapsed_ms: u64,
}
