//! Mutual-exclusion lock with an identified owner.

use std::sync::Arc;

use parking_lot::Mutex;

use ukern_core::{current_id, Gate, Kernel, ThreadId, WaitList};

struct State {
    held: bool,
    owner: Option<ThreadId>,
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
        assert!(!state.held, "lock {}: destroyed while held", self.name);
        assert!(
            state.waiters.is_empty(),
            "lock {}: destroyed with waiting threads",
            self.name
        );
    }
}

/// Owner-tracked mutual exclusion.
///
/// Non-reentrant by contract: the owner calling [`acquire`](Self::acquire)
/// again aborts instead of deadlocking against itself, and only the owner
/// may [`release`](Self::release).
#[derive(Clone)]
pub struct Lock {
    kernel: Arc<Kernel>,
    shared: Arc<Shared>,
}

impl Lock {
    pub fn new(kernel: &Arc<Kernel>, name: impl Into<String>) -> Self {
        Self {
            kernel: Arc::clone(kernel),
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State {
                    held: false,
                    owner: None,
                    waiters: WaitList::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Waits until the lock is free, then takes ownership.
    pub fn acquire(&self) {
        let mut gate = self.kernel.enter();
        self.acquire_gated(&mut gate);
    }

    pub(crate) fn acquire_gated(&self, gate: &mut Gate<'_>) {
        let me = gate.current_id();
        loop {
            let mut state = self.shared.state.lock();
            assert!(
                state.owner != Some(me),
                "lock {}: reacquired by its owner {me:?}",
                self.shared.name
            );
            if !state.held {
                state.held = true;
                state.owner = Some(me);
                log::trace!("lock {}: acquired by {me:?}", self.shared.name);
                return;
            }
            let priority = gate.current_priority();
            state.waiters.insert(me, priority);
            drop(state);
            log::trace!("lock {}: {me:?} waiting", self.shared.name);
            gate.sleep();
        }
    }

    /// Non-blocking variant of [`acquire`](Self::acquire); returns whether
    /// ownership was taken.
    pub fn try_acquire(&self) -> bool {
        let gate = self.kernel.enter();
        let me = gate.current_id();
        let mut state = self.shared.state.lock();
        if state.held {
            false
        } else {
            state.held = true;
            state.owner = Some(me);
            true
        }
    }

    /// Releases the lock, waking the front waiter if one exists.
    ///
    /// Aborts unless the running thread owns the lock.
    pub fn release(&self) {
        let mut gate = self.kernel.enter();
        self.release_gated(&mut gate);
    }

    pub(crate) fn release_gated(&self, gate: &mut Gate<'_>) {
        let me = gate.current_id();
        let mut state = self.shared.state.lock();
        assert!(
            state.held && state.owner == Some(me),
            "lock {}: released by {me:?} which does not hold it",
            self.shared.name
        );
        let woken = state.waiters.pop_front();
        state.owner = None;
        state.held = false;
        log::trace!("lock {}: released by {me:?}", self.shared.name);
        drop(state);
        if let Some(thread) = woken {
            gate.ready_to_run(thread);
        }
    }

    /// True when the calling thread owns this lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        let _gate = self.kernel.enter();
        let state = self.shared.state.lock();
        state.owner.is_some() && state.owner == current_id()
    }

    pub(crate) fn holds(&self, thread: ThreadId) -> bool {
        self.shared.state.lock().owner == Some(thread)
    }

    /// Stable identity for the same-lock check on condition waits.
    pub(crate) fn token(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }

    pub(crate) fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Consumes this handle, asserting that the lock is neither held nor
    /// waited on.
    pub fn destroy(self) {
        let state = self.shared.state.lock();
        assert!(
            !state.held,
            "lock {}: destroyed while held",
            self.shared.name
        );
        assert!(
            state.waiters.is_empty(),
            "lock {}: destroyed with waiting threads",
            self.shared.name
        );
    }
}
