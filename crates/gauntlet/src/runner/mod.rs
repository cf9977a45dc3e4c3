//! Code runner for Gauntlet
//!
//! Provides the high-level APIs: compiling a program once, judging test cases
//! one at a time or in parallel, and stress testing a candidate against a
//! reference.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

pub use crate::runner::compile::{CompileUnit, CompiledProgram, ProgramSource, compile};
pub use crate::runner::controller::ExecutionController;
pub use crate::runner::execute::{RunSnapshot, execute};
pub use crate::runner::lifecycle::StopHandle;
pub use crate::runner::parallel::ParallelExecutor;
pub use crate::runner::stress::{
    ProgramRole, StressError, StressEvent, StressMode, StressReport, StressRequest, StressTester,
};

mod compile;
mod controller;
mod execute;
mod lifecycle;
mod parallel;
mod stress;

use crate::config::Config;
use crate::sandbox::SandboxError;
use crate::types::{ExitKind, TestVerdict};

/// Errors that occur during compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compilation failed ({exit}):\n{output}")]
    Failed { exit: ExitKind, output: String },

    #[error("compilation timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64, output: String },

    #[error("compiler failed to start: {0}")]
    FailedToStart(String),

    #[error("compilation cancelled")]
    Cancelled,

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

impl CompileError {
    /// Text to show the user: the compiler's own output when there is one
    pub fn output(&self) -> String {
        match self {
            CompileError::Failed { output, .. } | CompileError::TimedOut { output, .. }
                if !output.is_empty() =>
            {
                output.clone()
            }
            CompileError::FailedToStart(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors that end a whole test batch
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("another batch is already running")]
    Busy,

    #[error("batch cancelled")]
    Cancelled,

    #[error("compilation error: {0}")]
    Compile(CompileError),

    #[error("sandbox error: {0}")]
    Sandbox(SandboxError),
}

impl From<CompileError> for ExecutionError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Cancelled | CompileError::Sandbox(SandboxError::Cancelled) => {
                ExecutionError::Cancelled
            }
            other => ExecutionError::Compile(other),
        }
    }
}

impl From<SandboxError> for ExecutionError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Cancelled => ExecutionError::Cancelled,
            other => ExecutionError::Sandbox(other),
        }
    }
}

/// Lifecycle state of a controller or executor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    #[default]
    Idle,
    Compiling,
    Running,
}

/// Notification emitted while a batch runs
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// The controller or executor changed state
    StateChanged(ExecutionState),

    /// Compilation failed; carries the compiler output. Emitted once per batch.
    CompileFailed(String),

    /// One test case finished (in completion order for parallel batches)
    CaseFinished(TestVerdict),

    /// Every case finished; verdicts are in input order
    BatchFinished(Vec<TestVerdict>),
}

/// Receiving end of an event channel
#[derive(Debug)]
pub struct EventStream<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> EventStream<E> {
    /// Receive the next event
    ///
    /// Returns `None` once the producer has been dropped and all events were
    /// delivered.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Receive an event if one is queued
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Take every queued event without waiting
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Sending end of an event channel; sends never fail
#[derive(Debug, Clone)]
pub(crate) struct EventSink<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> EventSink<E> {
    pub(crate) fn emit(&self, event: E) {
        // Nobody listening is fine
        let _ = self.tx.send(event);
    }
}

pub(crate) fn event_channel<E>() -> (EventSink<E>, EventStream<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx })
}

/// High-level entry point holding the engine configuration
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compile a program into a fresh working directory
    pub async fn compile(&self, program: &ProgramSource) -> Result<CompiledProgram, CompileError> {
        compile(
            program,
            &self.config.work_root(),
            self.config.compile_timeout(),
            None,
        )
        .await
    }

    /// Create a sequential controller and its event stream
    pub fn controller(&self) -> (ExecutionController, EventStream<ExecutionEvent>) {
        ExecutionController::new(self.config.clone())
    }

    /// Create a parallel executor and its event stream
    pub fn parallel_executor(&self) -> (ParallelExecutor, EventStream<ExecutionEvent>) {
        ParallelExecutor::new(self.config.clone())
    }

    /// Create a stress tester and its event stream
    pub fn stress_tester(&self) -> (StressTester, EventStream<StressEvent>) {
        StressTester::new(self.config.clone())
    }
}
