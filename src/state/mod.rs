// Run state tracking
//
// A preflight run moves through a fixed sequence of phases. RunStateTracker
// holds the current phase behind Arc<RwLock<T>>, rejects out-of-order
// transitions and broadcasts every change to subscribers.

use crate::error::{PreflightError, Result};
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Phases of a single run.
///
/// `Constructed → ConfigBuilt → Invoked → Completed`. There is no way back:
/// a completed run, successful or not, has to be rebuilt from its options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Options validated, nothing written yet
    Constructed,

    /// Variable set and configuration document written to the output folder
    ConfigBuilt,

    /// External process launched
    Invoked,

    /// External process finished (or failed to launch)
    Completed,
}

impl RunState {
    /// Whether `next` directly follows this phase
    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Constructed, RunState::ConfigBuilt)
                | (RunState::ConfigBuilt, RunState::Invoked)
                | (RunState::Invoked, RunState::Completed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Constructed => "constructed",
            RunState::ConfigBuilt => "config-built",
            RunState::Invoked => "invoked",
            RunState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Events emitted when a run changes phase
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    StateChanged { from: RunState, to: RunState },

    /// The external process exited (or could not be launched)
    ProcessFinished { exit_code: i32 },
}

/// Thread-safe holder of a run's phase with change notifications
pub struct RunStateTracker {
    state: Arc<RwLock<RunState>>,
    event_tx: broadcast::Sender<RunEvent>,
}

impl RunStateTracker {
    /// New tracker in [`RunState::Constructed`] with a 16-event buffer
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            state: Arc::new(RwLock::new(RunState::Constructed)),
            event_tx,
        }
    }

    pub fn current(&self) -> RunState {
        *self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `next`, emitting [`RunEvent::StateChanged`].
    ///
    /// # Errors
    ///
    /// [`PreflightError::InvalidTransition`] if `next` does not directly follow
    /// the current phase.
    pub fn advance(&self, next: RunState) -> Result<()> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let from = *state;

        if !from.can_advance_to(next) {
            return Err(PreflightError::InvalidTransition(format!(
                "cannot go from {} to {}",
                from, next
            )));
        }

        *state = next;
        drop(state);

        tracing::debug!("Run state {} -> {}", from, next);
        self.emit(RunEvent::StateChanged { from, to: next });
        Ok(())
    }

    /// Broadcast an event. It's fine if nobody is listening.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for RunStateTracker {
    fn default() -> Self {
        Self::new()
    }
}
