//! Parallel test execution
//!
//! Compiles once, then runs every case concurrently with at most
//! `max_parallel` programs alive at a time. Verdicts are reported as they
//! complete and returned in input order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::runner::compile::compile;
use crate::runner::execute::execute;
use crate::runner::lifecycle::Lifecycle;
use crate::runner::{
    EventSink, EventStream, ExecutionError, ExecutionEvent, ExecutionState, ProgramSource,
    StopHandle, event_channel,
};
use crate::types::{RunOutcome, TestCase, TestVerdict};

/// Bounded set of run slots
#[derive(Debug, Clone)]
pub(crate) struct RunPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl RunPool {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot
    ///
    /// Returns None only if the pool was closed, which never happens while a
    /// [`RunPool`] is alive.
    pub(crate) async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots
    pub(crate) fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Runs test batches with bounded concurrency
#[derive(Debug)]
pub struct ParallelExecutor {
    config: Arc<Config>,
    pool: RunPool,
    lifecycle: Lifecycle,
    events: EventSink<ExecutionEvent>,
}

impl ParallelExecutor {
    /// Create an executor and the stream its events are delivered on
    pub fn new(config: Arc<Config>) -> (Self, EventStream<ExecutionEvent>) {
        let (events, stream) = event_channel();
        let executor = Self {
            pool: RunPool::new(config.parallelism()),
            config,
            lifecycle: Lifecycle::default(),
            events,
        };
        (executor, stream)
    }

    pub fn state(&self) -> ExecutionState {
        self.lifecycle.state()
    }

    /// Maximum number of programs running at once
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.lifecycle.stop_handle()
    }

    /// Stop starting new cases
    ///
    /// Cases already running are allowed to finish.
    pub fn stop(&self) -> bool {
        self.lifecycle.stop_handle().stop()
    }

    /// Compile once, then run every case concurrently
    ///
    /// [`ExecutionEvent::CaseFinished`] arrives in completion order; the
    /// returned verdicts are in input order. If stopped, the batch ends with
    /// [`ExecutionError::Cancelled`] after the cases in flight finish.
    #[instrument(skip(self, program, cases), fields(language = %program.language(), cases = cases.len()))]
    pub async fn run_all(
        &self,
        program: &ProgramSource,
        cases: Vec<TestCase>,
        timeout: Duration,
    ) -> Result<Vec<TestVerdict>, ExecutionError> {
        let batch = self
            .lifecycle
            .begin(&self.events, ExecutionEvent::StateChanged)
            .ok_or(ExecutionError::Busy)?;
        let cancel = batch.cancel_flag().clone();

        let compiled = match compile(
            program,
            &self.config.work_root(),
            self.config.compile_timeout(),
            Some(&cancel),
        )
        .await
        {
            Ok(compiled) => compiled,
            Err(e) => {
                let error = ExecutionError::from(e);
                if let ExecutionError::Compile(ref e) = error {
                    warn!(error = %e, "compilation failed");
                    self.events.emit(ExecutionEvent::CompileFailed(e.output()));
                }
                return Err(error);
            }
        };

        batch.transition(ExecutionState::Running);
        debug!(free_slots = self.pool.available(), "fanning out cases");
        let snapshot = compiled.snapshot(timeout);
        let (tx, mut rx) = mpsc::unbounded_channel();

        for (position, case) in cases.iter().cloned().enumerate() {
            let pool = self.pool.clone();
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let verdict = async {
                    let _permit = pool.acquire().await?;
                    if cancel.is_cancelled() {
                        return None;
                    }
                    // In-flight cases are not interrupted by a stop
                    Some(match execute(&snapshot, &case, None).await {
                        Ok(verdict) => verdict,
                        Err(e) => TestVerdict::from_outcome(
                            &case,
                            RunOutcome::failed_to_start(e.to_string()),
                        ),
                    })
                }
                .await;

                // Release the directory before the batch can observe completion
                drop(snapshot);
                if let Some(verdict) = verdict {
                    let _ = tx.send((position, verdict));
                }
            });
        }
        drop(tx);

        let mut slots: Vec<Option<TestVerdict>> = vec![None; cases.len()];
        while let Some((position, verdict)) = rx.recv().await {
            debug!(index = verdict.index, status = %verdict.status, "case finished");
            self.events
                .emit(ExecutionEvent::CaseFinished(verdict.clone()));
            slots[position] = Some(verdict);
        }

        if batch.is_cancelled() {
            let finished = slots.iter().flatten().count();
            info!(finished, "batch stopped");
            return Err(ExecutionError::Cancelled);
        }

        let verdicts: Vec<TestVerdict> = slots
            .into_iter()
            .zip(&cases)
            .map(|(slot, case)| {
                slot.unwrap_or_else(|| {
                    warn!(index = case.index, "case produced no verdict");
                    TestVerdict::from_outcome(
                        case,
                        RunOutcome::failed_to_start("worker task ended without a verdict"),
                    )
                })
            })
            .collect();

        self.events
            .emit(ExecutionEvent::BatchFinished(verdicts.clone()));
        Ok(verdicts)
    }
}
