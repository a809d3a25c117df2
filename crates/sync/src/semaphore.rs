//! Counting semaphore.

use std::sync::Arc;

use parking_lot::Mutex;

use ukern_core::{Kernel, WaitList};

struct State {
    value: usize,
    waiters: WaitList,
}

struct Shared {
    name: String,
    state: Mutex<State>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let state = self.state.get_mut();
        assert!(
            state.waiters.is_empty(),
            "semaphore {}: destroyed with waiting threads",
            self.name
        );
    }
}

/// Counting semaphore with a blocking decrement.
///
/// `p` waits until the value is positive and consumes one unit; `v` wakes
/// the front waiter and increments. The woken thread consumes the increment
/// when it resumes, so at quiescence the value reflects the post-rendezvous
/// count either way.
#[derive(Clone)]
pub struct Semaphore {
    kernel: Arc<Kernel>,
    shared: Arc<Shared>,
}

impl Semaphore {
    pub fn new(kernel: &Arc<Kernel>, name: impl Into<String>, initial: usize) -> Self {
        Self {
            kernel: Arc::clone(kernel),
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State {
                    value: initial,
                    waiters: WaitList::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Waits until the value is positive, then decrements it.
    pub fn p(&self) {
        let mut gate = self.kernel.enter();
        loop {
            let mut state = self.shared.state.lock();
            if state.value > 0 {
                state.value -= 1;
                log::trace!(
                    "semaphore {}: consumed, value {}",
                    self.shared.name,
                    state.value
                );
                return;
            }
            let me = gate.current_id();
            let priority = gate.current_priority();
            state.waiters.insert(me, priority);
            drop(state);
            log::trace!("semaphore {}: {me:?} waiting", self.shared.name);
            gate.sleep();
        }
    }

    /// Non-blocking variant of [`p`](Self::p); returns whether a unit was
    /// consumed.
    pub fn try_p(&self) -> bool {
        let _gate = self.kernel.enter();
        let mut state = self.shared.state.lock();
        if state.value > 0 {
            state.value -= 1;
            true
        } else {
            false
        }
    }

    /// Increments the value, waking the front waiter if one exists.
    pub fn v(&self) {
        let mut gate = self.kernel.enter();
        let mut state = self.shared.state.lock();
        let woken = state.waiters.pop_front();
        state.value += 1;
        log::trace!(
            "semaphore {}: released, value {}",
            self.shared.name,
            state.value
        );
        drop(state);
        if let Some(thread) = woken {
            gate.ready_to_run(thread);
        }
    }

    /// Current value. Meaningful only at quiescent points.
    pub fn value(&self) -> usize {
        self.shared.state.lock().value
    }

    /// Consumes this handle, asserting that no thread is waiting.
    pub fn destroy(self) {
        let state = self.shared.state.lock();
        assert!(
            state.waiters.is_empty(),
            "semaphore {}: destroyed with waiting threads",
            self.shared.name
        );
    }
}
