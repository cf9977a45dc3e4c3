//! Differential stress testing
//!
//! A generator produces inputs, a trusted reference solves them and the
//! candidate's answers are compared against the reference. Candidate timings
//! feed the complexity estimator.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelFlag;
use crate::complexity::ComplexityEstimate;
use crate::config::Config;
use crate::normalize::outputs_equal;
use crate::runner::compile::{CompileUnit, ROOT_PREFIX};
use crate::runner::lifecycle::Lifecycle;
use crate::runner::parallel::RunPool;
use crate::runner::{
    CompileError, EventSink, EventStream, ExecutionState, ProgramSource, RunSnapshot, StopHandle,
    event_channel,
};
use crate::sandbox::{SandboxError, WorkDir};
use crate::types::{RunOutcome, StressSample};

/// Largest accepted iteration count
pub const MAX_ITERATIONS: usize = 10_000;

/// Which of the three stress programs something refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramRole {
    Generator,
    Reference,
    Candidate,
}

impl ProgramRole {
    /// Name of the role, also used as its build sub-directory
    pub fn name(&self) -> &'static str {
        match self {
            ProgramRole::Generator => "generator",
            ProgramRole::Reference => "reference",
            ProgramRole::Candidate => "candidate",
        }
    }
}

impl fmt::Display for ProgramRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that end a stress run
#[derive(Debug, Error)]
pub enum StressError {
    #[error("iteration count must be between 1 and {MAX_ITERATIONS}, got {0}")]
    InvalidCount(usize),

    #[error("{role} failed to compile: {source}")]
    Compile {
        role: ProgramRole,
        #[source]
        source: CompileError,
    },

    #[error("{role} failed on iteration {index}: {}", .outcome.exit)]
    ProgramFailed {
        role: ProgramRole,
        index: usize,
        outcome: RunOutcome,
    },

    #[error("another stress run is already running")]
    Busy,

    #[error("stress run cancelled")]
    Cancelled,

    #[error("sandbox error: {0}")]
    Sandbox(SandboxError),
}

impl From<SandboxError> for StressError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Cancelled => StressError::Cancelled,
            other => StressError::Sandbox(other),
        }
    }
}

/// Whether iterations run one at a time or concurrently
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StressMode {
    #[default]
    Sequential,
    Parallel,
}

/// Everything a stress run needs
#[derive(Debug, Clone)]
pub struct StressRequest {
    pub generator: ProgramSource,
    pub reference: ProgramSource,
    pub candidate: ProgramSource,
    /// Number of iterations, `1..=MAX_ITERATIONS`
    pub count: usize,
    pub mode: StressMode,
    /// Timeout applied to each program run
    pub timeout: Duration,
}

/// Result of a stress run
#[derive(Debug, Clone)]
pub struct StressReport {
    /// True if every iteration matched
    pub passed: bool,
    /// Index of the first mismatching iteration
    pub failed_index: Option<usize>,
    /// Generated input of the failing iteration, decoded lossily as UTF-8
    pub input: String,
    pub reference_output: String,
    pub candidate_output: String,
    /// Candidate stderr of the failing iteration
    pub stderr: String,
    /// Timing samples of matched iterations, in iteration order
    pub samples: Vec<StressSample>,
    pub complexity: ComplexityEstimate,
    /// Number of iterations that produced a result
    pub iterations_run: usize,
}

impl StressReport {
    fn passed(samples: Vec<StressSample>, iterations_run: usize) -> Self {
        Self {
            passed: true,
            failed_index: None,
            input: String::new(),
            reference_output: String::new(),
            candidate_output: String::new(),
            stderr: String::new(),
            complexity: ComplexityEstimate::estimate(&samples),
            samples,
            iterations_run,
        }
    }

    fn failed(failure: Iteration, samples: Vec<StressSample>, iterations_run: usize) -> Self {
        Self {
            passed: false,
            failed_index: Some(failure.index),
            input: failure.input,
            reference_output: failure.reference_output,
            candidate_output: failure.candidate_output,
            stderr: failure.candidate_stderr,
            complexity: ComplexityEstimate::estimate(&samples),
            samples,
            iterations_run,
        }
    }
}

/// Notification emitted during a stress run
#[derive(Debug, Clone)]
pub enum StressEvent {
    StateChanged(ExecutionState),

    /// One iteration finished (in completion order for parallel runs)
    IterationFinished {
        index: usize,
        input_size: usize,
        candidate_elapsed_ms: u64,
        matched: bool,
    },

    Finished(StressReport),
}

/// Result of one generator/reference/candidate round
#[derive(Debug)]
struct Iteration {
    index: usize,
    input: String,
    reference_output: String,
    candidate_output: String,
    candidate_stderr: String,
    sample: StressSample,
    matched: bool,
}

impl Iteration {
    fn event(&self) -> StressEvent {
        StressEvent::IterationFinished {
            index: self.index,
            input_size: self.sample.input_size,
            candidate_elapsed_ms: self.sample.candidate_elapsed_ms,
            matched: self.matched,
        }
    }
}

/// The three compiled programs sharing one root directory
#[derive(Debug, Clone)]
struct Programs {
    root: Arc<WorkDir>,
    generator: RunSnapshot,
    reference: RunSnapshot,
    candidate: RunSnapshot,
}

impl Programs {
    async fn compile(
        request: &StressRequest,
        root: Arc<WorkDir>,
        ceiling: Duration,
        cancel: &CancelFlag,
    ) -> Result<Self, StressError> {
        let (generator, reference, candidate) = tokio::join!(
            compile_role(
                ProgramRole::Generator,
                &request.generator,
                root.clone(),
                ceiling,
                cancel
            ),
            compile_role(
                ProgramRole::Reference,
                &request.reference,
                root.clone(),
                ceiling,
                cancel
            ),
            compile_role(
                ProgramRole::Candidate,
                &request.candidate,
                root.clone(),
                ceiling,
                cancel
            ),
        );

        // Report failures in role order regardless of which finished first
        let generator = generator?;
        let reference = reference?;
        let candidate = candidate?;

        Ok(Self {
            generator: RunSnapshot::new(generator, root.clone(), request.timeout),
            reference: RunSnapshot::new(reference, root.clone(), request.timeout),
            candidate: RunSnapshot::new(candidate, root.clone(), request.timeout),
            root,
        })
    }

    /// Generate an input, then run reference and candidate on it
    async fn iterate(&self, index: usize, cancel: &CancelFlag) -> Result<Iteration, StressError> {
        let dir = WorkDir::create(self.root.path(), &format!("iter-{index}-"))?;

        let generated = self.run(ProgramRole::Generator, index, dir.path(), b"", cancel).await?;
        // Feed the generator's bytes through untouched
        let input = generated.raw_stdout;

        let reference = self
            .run(ProgramRole::Reference, index, dir.path(), &input, cancel)
            .await?;
        let candidate = self
            .run(ProgramRole::Candidate, index, dir.path(), &input, cancel)
            .await?;

        let matched = outputs_equal(&candidate.stdout, &reference.stdout);
        debug!(index, matched, elapsed_ms = candidate.elapsed_ms, "iteration finished");

        Ok(Iteration {
            index,
            sample: StressSample {
                input_size: input.len(),
                candidate_elapsed_ms: candidate.elapsed_ms,
            },
            input: generated.stdout,
            reference_output: reference.stdout,
            candidate_output: candidate.stdout,
            candidate_stderr: candidate.stderr,
            matched,
        })
    }

    async fn run(
        &self,
        role: ProgramRole,
        index: usize,
        dir: &Path,
        input: &[u8],
        cancel: &CancelFlag,
    ) -> Result<RunOutcome, StressError> {
        let snapshot = match role {
            ProgramRole::Generator => &self.generator,
            ProgramRole::Reference => &self.reference,
            ProgramRole::Candidate => &self.candidate,
        };
        let outcome = snapshot.run_under(dir, input, Some(cancel)).await?;
        if !outcome.is_success() {
            warn!(%role, index, exit = %outcome.exit, "program failed");
            return Err(StressError::ProgramFailed {
                role,
                index,
                outcome,
            });
        }
        Ok(outcome)
    }
}

async fn compile_role(
    role: ProgramRole,
    program: &ProgramSource,
    root: Arc<WorkDir>,
    ceiling: Duration,
    cancel: &CancelFlag,
) -> Result<Arc<[String]>, StressError> {
    let to_error = |source: CompileError| match source {
        CompileError::Cancelled | CompileError::Sandbox(SandboxError::Cancelled) => {
            StressError::Cancelled
        }
        source => StressError::Compile { role, source },
    };

    let unit = CompileUnit::stage(program, root, role.name())
        .await
        .map_err(|e| to_error(e.into()))?;
    let compiled = unit.compile(ceiling, Some(cancel)).await.map_err(to_error)?;
    Ok(compiled.run_command().into())
}

/// Runs stress tests, one at a time per instance
#[derive(Debug)]
pub struct StressTester {
    config: Arc<Config>,
    pool: RunPool,
    lifecycle: Lifecycle,
    events: EventSink<StressEvent>,
}

impl StressTester {
    /// Create a stress tester and the stream its events are delivered on
    pub fn new(config: Arc<Config>) -> (Self, EventStream<StressEvent>) {
        let (events, stream) = event_channel();
        let tester = Self {
            pool: RunPool::new(config.parallelism()),
            config,
            lifecycle: Lifecycle::default(),
            events,
        };
        (tester, stream)
    }

    pub fn state(&self) -> ExecutionState {
        self.lifecycle.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.lifecycle.stop_handle()
    }

    /// Stop the running stress test
    ///
    /// Programs in flight are killed and no new iteration starts.
    pub fn stop(&self) -> bool {
        self.lifecycle.stop_handle().stop()
    }

    /// Compile the three programs and run `count` iterations
    ///
    /// A mismatch is not an error: it yields a report with `passed == false`.
    /// Any program crashing, timing out or failing to start ends the run with
    /// [`StressError::ProgramFailed`].
    #[instrument(skip(self, request), fields(count = request.count, mode = ?request.mode))]
    pub async fn run(&self, request: &StressRequest) -> Result<StressReport, StressError> {
        if !(1..=MAX_ITERATIONS).contains(&request.count) {
            return Err(StressError::InvalidCount(request.count));
        }

        let batch = self
            .lifecycle
            .begin(&self.events, StressEvent::StateChanged)
            .ok_or(StressError::Busy)?;
        let cancel = batch.cancel_flag().clone();

        let root = Arc::new(WorkDir::create(&self.config.work_root(), ROOT_PREFIX)?);
        let programs =
            Programs::compile(request, root, self.config.compile_timeout(), &cancel).await?;

        batch.transition(ExecutionState::Running);
        let report = match request.mode {
            StressMode::Sequential => self.run_sequential(&programs, request.count, &cancel).await,
            StressMode::Parallel => self.run_parallel(&programs, request.count, &cancel).await,
        }?;

        info!(
            passed = report.passed,
            failed_index = ?report.failed_index,
            complexity = %report.complexity,
            "stress run finished"
        );
        self.events.emit(StressEvent::Finished(report.clone()));
        Ok(report)
    }

    async fn run_sequential(
        &self,
        programs: &Programs,
        count: usize,
        cancel: &CancelFlag,
    ) -> Result<StressReport, StressError> {
        let mut samples = Vec::new();

        for index in 0..count {
            if cancel.is_cancelled() {
                return Err(StressError::Cancelled);
            }

            let iteration = programs.iterate(index, cancel).await?;
            self.events.emit(iteration.event());

            if !iteration.matched {
                return Ok(StressReport::failed(iteration, samples, index + 1));
            }
            samples.push(iteration.sample);
        }

        Ok(StressReport::passed(samples, count))
    }

    async fn run_parallel(
        &self,
        programs: &Programs,
        count: usize,
        cancel: &CancelFlag,
    ) -> Result<StressReport, StressError> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        for index in 0..count {
            let pool = self.pool.clone();
            let programs = programs.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = async {
                    let _permit = pool.acquire().await?;
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(programs.iterate(index, &cancel).await)
                }
                .await;

                drop(programs);
                if let Some(result) = result {
                    let _ = tx.send((index, result));
                }
            });
        }
        drop(tx);

        let mut slots: Vec<Option<Result<Iteration, StressError>>> =
            std::iter::repeat_with(|| None).take(count).collect();
        while let Some((index, result)) = rx.recv().await {
            if let Ok(ref iteration) = result {
                self.events.emit(iteration.event());
            }
            slots[index] = Some(result);
        }

        if cancel.is_cancelled() {
            return Err(StressError::Cancelled);
        }

        let iterations_run = slots.iter().flatten().count();
        let mut samples = Vec::new();
        let mut failure = None;

        for slot in slots {
            match slot {
                Some(Ok(iteration)) if iteration.matched => samples.push(iteration.sample),
                Some(Ok(iteration)) => {
                    if failure.is_none() {
                        failure = Some(iteration);
                    }
                }
                // The lowest-index fatal failure wins unless a mismatch came first
                Some(Err(e)) if failure.is_none() => return Err(e),
                Some(Err(_)) | None => {}
            }
        }

        Ok(match failure {
            Some(iteration) => StressReport::failed(iteration, samples, iterations_run),
            None => StressReport::passed(samples, iterations_run),
        })
    }
}
