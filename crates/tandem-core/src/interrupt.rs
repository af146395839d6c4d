//! Cooperative interruption of in-flight model and tool steps.
//!
//! The chat loop arms the controller around each cycle; an asynchronous
//! source (the Ctrl-C listener) calls [`InterruptController::interrupt`].
//! Cancellation only has an effect while armed, so a signal that arrives
//! while the loop waits for user input is reported back to the caller as
//! "not consumed" and can be treated as a termination request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

#[derive(Default)]
struct State {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Shared arm/disarm state. Clones refer to the same controller.
#[derive(Clone, Default)]
pub struct InterruptController {
    state: Arc<Mutex<State>>,
}

/// An armed window. Dropping it disarms the controller, unless the
/// controller has been re-armed since.
pub struct Armed {
    controller: InterruptController,
    generation: u64,
    token: CancellationToken,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm with a fresh cancellation token.
    pub fn arm(&self) -> Armed {
        let token = CancellationToken::new();
        let mut state = self.lock();
        state.generation += 1;
        state.token = Some(token.clone());
        Armed {
            controller: self.clone(),
            generation: state.generation,
            token,
        }
    }

    pub fn disarm(&self) {
        self.lock().token = None;
    }

    pub fn is_armed(&self) -> bool {
        self.lock().token.is_some()
    }

    /// Request cancellation of the armed step.
    ///
    /// Returns `false` when nothing is armed and the request was ignored.
    pub fn interrupt(&self) -> bool {
        match &self.lock().token {
            Some(token) => {
                tracing::debug!("Interrupt requested while armed");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Armed {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the armed window is interrupted.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        let mut state = self.controller.lock();
        if state.generation == self.generation {
            state.token = None;
        }
    }
}
