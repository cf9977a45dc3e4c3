//! Execution step for code running
//!
//! Runs an already compiled program against one input in its own working
//! directory and judges the result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cancel::CancelFlag;
use crate::sandbox::{ProgramCommand, SandboxError, WorkDir, run_process};
use crate::types::{RunOutcome, TestCase, TestVerdict};

/// Prefix of per-run working directories
const RUN_PREFIX: &str = "run-";

/// Immutable view of a compiled program used by a single run
///
/// Snapshots are taken once per batch, so a run never sees a half-updated
/// configuration. Holding one keeps the program's directory alive.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    run_command: Arc<[String]>,
    root: Arc<WorkDir>,
    timeout: Duration,
}

impl RunSnapshot {
    pub(crate) fn new(run_command: Arc<[String]>, root: Arc<WorkDir>, timeout: Duration) -> Self {
        Self {
            run_command,
            root,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn run_command(&self) -> &[String] {
        &self.run_command
    }

    /// Run the program in a fresh directory under the program's root
    pub async fn run(
        &self,
        input: &[u8],
        cancel: Option<&CancelFlag>,
    ) -> Result<RunOutcome, SandboxError> {
        self.run_under(self.root.path(), input, cancel).await
    }

    /// Run the program in a fresh directory under `parent`
    ///
    /// Failing to create the directory is reported as an outcome that failed
    /// to start; the only error is [`SandboxError::Cancelled`].
    #[instrument(skip(self, input, cancel), fields(input_len = input.len()))]
    pub async fn run_under(
        &self,
        parent: &Path,
        input: &[u8],
        cancel: Option<&CancelFlag>,
    ) -> Result<RunOutcome, SandboxError> {
        let dir = match WorkDir::create(parent, RUN_PREFIX) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "failed to create run directory");
                return Ok(RunOutcome::failed_to_start(e.to_string()));
            }
        };

        let command = ProgramCommand::new(self.run_command.clone()).working_dir(dir.path());
        match run_process(&command, input, self.timeout, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(SandboxError::Cancelled) => Err(SandboxError::Cancelled),
            Err(e) => {
                warn!(error = %e, "run failed");
                Ok(RunOutcome::failed_to_start(e.to_string()))
            }
        }
    }
}

/// Run one test case and judge it
#[instrument(skip(snapshot, case, cancel), fields(index = case.index))]
pub async fn execute(
    snapshot: &RunSnapshot,
    case: &TestCase,
    cancel: Option<&CancelFlag>,
) -> Result<TestVerdict, SandboxError> {
    let outcome = snapshot.run(case.input.as_bytes(), cancel).await?;
    let verdict = TestVerdict::from_outcome(case, outcome);
    debug!(status = %verdict.status, elapsed_ms = verdict.elapsed_ms, "case judged");
    Ok(verdict)
}
