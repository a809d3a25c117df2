//! Critical-section gate.
//!
//! On a uniprocessor the only atomic primitive is masking preemption. On this
//! hosted port the mask is one kernel-state mutex: holding the [`Gate`] guard
//! *is* holding the mask, and `Sleep` is "park the backing thread while the
//! mask is held", releasing the mutex atomically with suspension. Entering
//! saves the prior level and dropping restores exactly that level, keeping
//! the save/restore discipline of nested masking even though a nested entry
//! cannot occur on this port.

use std::thread as host;

use parking_lot::MutexGuard;

use crate::sched::{Kernel, SchedState};
use crate::thread::{self, Priority, ThreadId, ThreadState};

/// Preemption mask level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskLevel {
    /// Involuntary scheduling points may switch threads.
    Unmasked,
    /// The running thread keeps the CPU until the mask is restored.
    Masked,
}

/// Scoped preemption mask over the kernel state.
///
/// Every public operation of every synchronization primitive opens a gate for
/// its whole body. Wakeups performed under the gate take effect when the gate
/// closes: if a thread of equal or higher priority was made runnable, the
/// closing thread is preempted at that point.
pub struct Gate<'k> {
    pub(crate) kernel: &'k Kernel,
    pub(crate) guard: Option<MutexGuard<'k, SchedState>>,
    pub(crate) prior: MaskLevel,
}

impl Gate<'_> {
    pub(crate) fn state(&mut self) -> &mut SchedState {
        self.guard.as_mut().expect("gate already released")
    }

    /// Id of the running thread.
    ///
    /// Panics on the control thread; blocking operations are only legal on a
    /// kernel thread.
    pub fn current_id(&self) -> ThreadId {
        self.guard
            .as_ref()
            .expect("gate already released")
            .running
            .expect("blocking operation outside a kernel thread")
    }

    /// Priority of the running thread.
    pub fn current_priority(&mut self) -> Priority {
        let id = self.current_id();
        self.state().threads[id.index()].inner.priority()
    }

    /// Makes a blocked thread runnable, inserting it into the ready list in
    /// priority order.
    ///
    /// When the woken priority is at least the running thread's, the running
    /// thread is preempted once the gate closes.
    pub fn ready_to_run(&mut self, target: ThreadId) {
        let me = thread::current_id();
        let state = self.state();
        let record = state
            .threads
            .get(target.index())
            .expect("woken thread is not live");
        assert_eq!(
            record.state,
            ThreadState::Blocked,
            "thread {target:?} made runnable while not blocked"
        );
        state.make_ready(target);
        let priority = state.threads[target.index()].inner.priority();
        log::trace!("{target:?} made runnable at priority {priority}");
        if let Some(cur) = state.running {
            if me == Some(cur) && priority >= state.threads[cur.index()].inner.priority() {
                state.preempt_pending = true;
            }
        }
    }

    /// Suspends the running thread until another thread makes it runnable.
    ///
    /// The caller must already have linked itself on a wait queue. The mask
    /// is conceptually held across the suspension: the state mutex is
    /// released while parked and re-entered before returning, so `sleep`
    /// returns at the same mask level it was called at.
    pub fn sleep(&mut self) {
        let mut state = self.guard.take().expect("gate already released");
        let me = state.running.take().expect("sleep outside a kernel thread");
        state.threads[me.index()].state = ThreadState::Blocked;
        state.preempt_pending = false;
        log::trace!("{me:?} sleeping");
        self.kernel.dispatch_next(&mut state);
        drop(state);
        self.kernel.wait_until_scheduled(me);
        let mut state = self.kernel.lock_state();
        state.mask = MaskLevel::Masked;
        self.guard = Some(state);
    }
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        let Some(mut state) = self.guard.take() else {
            return;
        };
        state.mask = self.prior;
        if self.prior == MaskLevel::Masked || !state.preempt_pending {
            return;
        }
        state.preempt_pending = false;
        if host::panicking() {
            // The unwinding thread keeps the CPU; the failure is surfaced by
            // the thread trampoline, not by a context switch mid-unwind.
            return;
        }
        let me = thread::current_id();
        if me.is_none() || state.running != me {
            return;
        }
        let cur = me.expect("checked above");
        state.running = None;
        state.make_ready(cur);
        let next = state
            .ready
            .pop_front()
            .expect("preempted thread is on the ready list");
        if next == cur {
            state.threads[cur.index()].state = ThreadState::Running;
            state.running = Some(cur);
            return;
        }
        log::trace!("{cur:?} preempted by {next:?}");
        self.kernel.switch_to(&mut state, next);
        drop(state);
        self.kernel.wait_until_scheduled(cur);
    }
}
