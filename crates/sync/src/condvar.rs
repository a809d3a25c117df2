//! Mesa-style condition variable.
//!
//! `wait` releases the named lock, suspends, and reacquires it before
//! returning. A signal makes the front waiter runnable but does not hand
//! over the lock or the CPU, so callers re-check their predicate in a loop
//! after every wakeup.

use std::sync::Arc;

use parking_lot::Mutex;

use ukern_core::{Kernel, WaitList};

use crate::lock::Lock;

struct State {
    waiters: WaitList,
    /// Identity of the lock every current waiter named; cleared when the
    /// wait list drains.
    bound_lock: Option<usize>,
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
            "condition {}: destroyed with waiting threads",
            self.name
        );
    }
}

/// Condition variable bound to a lock per wait.
#[derive(Clone)]
pub struct Condition {
    kernel: Arc<Kernel>,
    shared: Arc<Shared>,
}

impl Condition {
    pub fn new(kernel: &Arc<Kernel>, name: impl Into<String>) -> Self {
        Self {
            kernel: Arc::clone(kernel),
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State {
                    waiters: WaitList::new(),
                    bound_lock: None,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Atomically releases `lock` and suspends until signaled, then
    /// reacquires `lock` before returning.
    ///
    /// Aborts unless the running thread holds `lock`. Every concurrent
    /// waiter must name the same lock.
    pub fn wait(&self, lock: &Lock) {
        debug_assert!(
            Arc::ptr_eq(&self.kernel, lock.kernel()),
            "condition and lock belong to different kernels"
        );
        let mut gate = self.kernel.enter();
        let me = gate.current_id();
        assert!(
            lock.holds(me),
            "condition {}: wait without holding {}",
            self.shared.name,
            lock.name()
        );
        lock.release_gated(&mut gate);
        let priority = gate.current_priority();
        {
            let mut state = self.shared.state.lock();
            match state.bound_lock {
                None => state.bound_lock = Some(lock.token()),
                Some(token) => assert_eq!(
                    token,
                    lock.token(),
                    "condition {}: waiters must name a single lock",
                    self.shared.name
                ),
            }
            state.waiters.insert(me, priority);
        }
        log::trace!("condition {}: {me:?} waiting", self.shared.name);
        gate.sleep();
        lock.acquire_gated(&mut gate);
    }

    /// Wakes the front waiter.
    ///
    /// With no waiters this is a logged no-op and does not require the lock
    /// to be held.
    pub fn signal(&self, lock: &Lock) {
        let mut gate = self.kernel.enter();
        let mut state = self.shared.state.lock();
        if state.waiters.is_empty() {
            drop(state);
            drop(gate);
            log::debug!("condition {}: signal with no waiters", self.shared.name);
            return;
        }
        assert!(
            lock.holds(gate.current_id()),
            "condition {}: signal without holding {}",
            self.shared.name,
            lock.name()
        );
        let woken = state.waiters.pop_front().expect("wait list is non-empty");
        if state.waiters.is_empty() {
            state.bound_lock = None;
        }
        drop(state);
        log::trace!("condition {}: waking {woken:?}", self.shared.name);
        gate.ready_to_run(woken);
    }

    /// Wakes every waiter, front first.
    ///
    /// With no waiters this is a logged no-op, like [`signal`](Self::signal).
    pub fn broadcast(&self, lock: &Lock) {
        let mut gate = self.kernel.enter();
        let mut state = self.shared.state.lock();
        if state.waiters.is_empty() {
            drop(state);
            drop(gate);
            log::debug!("condition {}: broadcast with no waiters", self.shared.name);
            return;
        }
        assert!(
            lock.holds(gate.current_id()),
            "condition {}: broadcast without holding {}",
            self.shared.name,
            lock.name()
        );
        let mut woken = Vec::new();
        while let Some(thread) = state.waiters.pop_front() {
            woken.push(thread);
        }
        state.bound_lock = None;
        drop(state);
        log::trace!(
            "condition {}: waking all {} waiter(s)",
            self.shared.name,
            woken.len()
        );
        for thread in woken {
            gate.ready_to_run(thread);
        }
    }

    /// Consumes this handle, asserting that no thread is waiting.
    pub fn destroy(self) {
        let state = self.shared.state.lock();
        assert!(
            state.waiters.is_empty(),
            "condition {}: destroyed with waiting threads",
            self.shared.name
        );
    }
}
