//! Pause/stop signalling between the control plane and a running pipeline.
//!
//! Requests are plain state updates and never block, whether or not a
//! pipeline is currently listening. The pipeline polls the state at module
//! boundaries and only waits while a pause is in effect.

use std::sync::Arc;

use tokio::sync::watch;

/// Requested state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    PauseRequested,
    StopRequested,
}

/// Shared suspension/cancellation token for one run.
///
/// Cloning yields a handle to the same token. A task gets a fresh token every
/// time it is reset for a new run.
#[derive(Debug, Clone)]
pub struct ControlToken {
    tx: Arc<watch::Sender<ControlState>>,
}

impl Default for ControlToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state() == ControlState::StopRequested
    }

    /// Ask the run to pause at its next module boundary.
    ///
    /// Returns false unless the token was `Running`.
    pub fn request_pause(&self) -> bool {
        self.transition(|s| match s {
            ControlState::Running => Some(ControlState::PauseRequested),
            _ => None,
        })
    }

    /// Lift a pause. Returns false unless a pause was in effect.
    pub fn request_resume(&self) -> bool {
        self.transition(|s| match s {
            ControlState::PauseRequested => Some(ControlState::Running),
            _ => None,
        })
    }

    /// Ask the run to stop. Overrides a pending pause and wakes a paused run.
    pub fn request_stop(&self) -> bool {
        self.transition(|s| match s {
            ControlState::Running | ControlState::PauseRequested => {
                Some(ControlState::StopRequested)
            }
            ControlState::StopRequested => None,
        })
    }

    /// Wait until the token leaves `PauseRequested` and return the new state.
    ///
    /// Returns immediately if no pause is in effect.
    pub async fn wait_while_paused(&self) -> ControlState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|s| *s != ControlState::PauseRequested).await {
            Ok(state) => *state,
            // The sender lives as long as `self`, so this is unreachable in practice.
            Err(_) => self.state(),
        };
        state
    }

    /// Whether two handles refer to the same token.
    pub fn same_token(&self, other: &ControlToken) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    fn transition<F>(&self, next: F) -> bool
    where
        F: Fn(ControlState) -> Option<ControlState>,
    {
        self.tx.send_if_modified(|state| match next(*state) {
            Some(new_state) => {
                *state = new_state;
                true
            }
            None => false,
        })
    }
}
