//! Busy/idle bookkeeping shared by the controller, executor and stress tester

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::cancel::CancelFlag;
use crate::runner::{EventSink, ExecutionState};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle that stops whatever batch its owner is running
///
/// Cloneable and usable from any task, e.g. a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    active: Arc<Mutex<Option<CancelFlag>>>,
}

impl StopHandle {
    /// Cancel the active batch
    ///
    /// Returns false if nothing was running. Stopping twice is harmless.
    pub fn stop(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: Mutex<ExecutionState>,
    stop: StopHandle,
}

impl Lifecycle {
    pub(crate) fn state(&self) -> ExecutionState {
        *lock(&self.state)
    }

    pub(crate) fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Leave Idle for Compiling, or return None if a batch is running
    pub(crate) fn begin<'a, E>(
        &'a self,
        events: &'a EventSink<E>,
        to_event: fn(ExecutionState) -> E,
    ) -> Option<ActiveBatch<'a, E>> {
        {
            let mut state = lock(&self.state);
            if *state != ExecutionState::Idle {
                debug!(state = ?*state, "rejecting batch while busy");
                return None;
            }
            *state = ExecutionState::Compiling;
        }

        let cancel = CancelFlag::new();
        *lock(&self.stop.active) = Some(cancel.clone());
        events.emit(to_event(ExecutionState::Compiling));

        Some(ActiveBatch {
            lifecycle: self,
            events,
            to_event,
            cancel,
        })
    }
}

/// A running batch; dropping it returns the owner to Idle
pub(crate) struct ActiveBatch<'a, E> {
    lifecycle: &'a Lifecycle,
    events: &'a EventSink<E>,
    to_event: fn(ExecutionState) -> E,
    cancel: CancelFlag,
}

impl<E> ActiveBatch<'_, E> {
    pub(crate) fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn transition(&self, next: ExecutionState) {
        let changed = {
            let mut state = lock(&self.lifecycle.state);
            std::mem::replace(&mut *state, next) != next
        };
        if changed {
            self.events.emit((self.to_event)(next));
        }
    }
}

impl<E> Drop for ActiveBatch<'_, E> {
    fn drop(&mut self) {
        *lock(&self.lifecycle.stop.active) = None;
        self.transition(ExecutionState::Idle);
    }
}
