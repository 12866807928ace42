//! Countdown latch that runs an action exactly once when it reaches zero.

use std::sync::{Mutex, MutexGuard, PoisonError};

type Action = Box<dyn FnOnce() + Send + 'static>;

struct LatchState {
    pending: usize,
    on_zero: Option<Action>,
}

/// Counts arrivals down from `N` and fires its action on the last one.
///
/// The decrement, the zero check and the action all happen under one lock,
/// so no later arrival can observe the latch released before the action has
/// finished running.
pub struct CountdownLatch {
    state: Mutex<LatchState>,
}

impl CountdownLatch {
    pub fn new(count: usize, on_zero: impl FnOnce() + Send + 'static) -> Self {
        Self {
            state: Mutex::new(LatchState {
                pending: count,
                on_zero: Some(Box::new(on_zero)),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one arrival. Returns `true` only for the call that reached zero.
    ///
    /// Arrivals after the latch is released are ignored.
    pub fn arrive(&self) -> bool {
        let mut state = self.lock();
        if state.pending == 0 {
            return false;
        }

        state.pending -= 1;
        if state.pending > 0 {
            return false;
        }

        if let Some(action) = state.on_zero.take() {
            action();
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.lock().pending
    }

    pub fn is_released(&self) -> bool {
        self.pending() == 0
    }
}

impl std::fmt::Debug for CountdownLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownLatch")
            .field("pending", &self.pending())
            .finish()
    }
}
