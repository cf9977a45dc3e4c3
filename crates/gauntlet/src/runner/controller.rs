//! Sequential test execution
//!
//! Compiles a program once and runs its test cases one after another,
//! reporting each verdict as it lands. A stop kills the case in flight.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::runner::compile::compile;
use crate::runner::execute::execute;
use crate::runner::lifecycle::Lifecycle;
use crate::runner::{
    CompileError, EventSink, EventStream, ExecutionError, ExecutionEvent, ExecutionState,
    ProgramSource, StopHandle, event_channel,
};
use crate::types::{TestCase, TestVerdict};

/// Runs test batches one case at a time
#[derive(Debug)]
pub struct ExecutionController {
    config: Arc<Config>,
    lifecycle: Lifecycle,
    events: EventSink<ExecutionEvent>,
}

impl ExecutionController {
    /// Create a controller and the stream its events are delivered on
    pub fn new(config: Arc<Config>) -> (Self, EventStream<ExecutionEvent>) {
        let (events, stream) = event_channel();
        let controller = Self {
            config,
            lifecycle: Lifecycle::default(),
            events,
        };
        (controller, stream)
    }

    pub fn state(&self) -> ExecutionState {
        self.lifecycle.state()
    }

    /// Handle for stopping batches from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.lifecycle.stop_handle()
    }

    /// Stop the running batch, if any
    pub fn stop(&self) -> bool {
        self.lifecycle.stop_handle().stop()
    }

    /// Run a single case using the configured timeout
    pub async fn run(
        &self,
        program: &ProgramSource,
        case: TestCase,
    ) -> Result<TestVerdict, ExecutionError> {
        let mut verdicts = self
            .run_batch(program, vec![case], self.config.timeout())
            .await?;
        verdicts.pop().ok_or(ExecutionError::Cancelled)
    }

    /// Compile once, then run every case in order
    ///
    /// Verdicts come back in input order. A stop between or during cases
    /// ends the batch with [`ExecutionError::Cancelled`]; cases already
    /// finished were reported through [`ExecutionEvent::CaseFinished`].
    #[instrument(skip(self, program, cases), fields(language = %program.language(), cases = cases.len()))]
    pub async fn run_batch(
        &self,
        program: &ProgramSource,
        cases: Vec<TestCase>,
        timeout: Duration,
    ) -> Result<Vec<TestVerdict>, ExecutionError> {
        let batch = self
            .lifecycle
            .begin(&self.events, ExecutionEvent::StateChanged)
            .ok_or(ExecutionError::Busy)?;
        let cancel = batch.cancel_flag();

        let compiled = match compile(
            program,
            &self.config.work_root(),
            self.config.compile_timeout(),
            Some(cancel),
        )
        .await
        {
            Ok(compiled) => compiled,
            Err(e) => return Err(self.compile_failed(e)),
        };

        let snapshot = compiled.snapshot(timeout);
        let mut verdicts = Vec::with_capacity(cases.len());

        for case in &cases {
            if batch.is_cancelled() {
                info!(finished = verdicts.len(), "batch stopped");
                return Err(ExecutionError::Cancelled);
            }
            batch.transition(ExecutionState::Running);

            let verdict = execute(&snapshot, case, Some(cancel)).await?;
            debug!(index = verdict.index, status = %verdict.status, "case finished");
            self.events
                .emit(ExecutionEvent::CaseFinished(verdict.clone()));
            verdicts.push(verdict);
        }

        self.events
            .emit(ExecutionEvent::BatchFinished(verdicts.clone()));
        Ok(verdicts)
    }

    fn compile_failed(&self, error: CompileError) -> ExecutionError {
        let error = ExecutionError::from(error);
        if let ExecutionError::Compile(ref e) = error {
            warn!(error = %e, "compilation failed");
            self.events.emit(ExecutionEvent::CompileFailed(e.output()));
        }
        error
    }
}
