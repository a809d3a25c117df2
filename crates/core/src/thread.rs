//! Thread handles.
//!
//! A [`Thread`] is a shared handle to one cooperatively scheduled kernel
//! thread. The backing execution resource is an OS thread that stays parked
//! except while it is the single running thread; see [`crate::sched`] for the
//! dispatch machinery.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::sched::Kernel;

/// Scheduling priority. Larger is more urgent; negatives are allowed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a kernel thread, unique among live threads.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub(crate) usize);

impl ThreadId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Thread execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// On the ready list, waiting to be dispatched.
    Ready,
    /// The single currently executing thread.
    Running,
    /// Suspended on some wait queue.
    Blocked,
    /// Completed execution.
    Finished,
}

pub(crate) struct ThreadInner {
    name: String,
    priority: AtomicI32,
    done: (Mutex<bool>, Condvar),
}

impl ThreadInner {
    pub(crate) fn new(name: String, priority: Priority) -> Self {
        Self {
            name,
            priority: AtomicI32::new(priority.0),
            done: (Mutex::new(false), Condvar::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn priority(&self) -> Priority {
        Priority(self.priority.load(Ordering::Relaxed))
    }

    pub(crate) fn set_priority(&self, priority: Priority) {
        self.priority.store(priority.0, Ordering::Relaxed);
    }

    pub(crate) fn mark_done(&self) {
        let (lock, cvar) = &self.done;
        *lock.lock() = true;
        cvar.notify_all();
    }

    pub(crate) fn wait_done(&self) {
        let (lock, cvar) = &self.done;
        let mut done = lock.lock();
        while !*done {
            cvar.wait(&mut done);
        }
    }
}

/// Shared handle to a kernel thread.
///
/// Handles are cheap to clone and remain valid after the thread finishes.
#[derive(Clone)]
pub struct Thread {
    id: ThreadId,
    inner: Arc<ThreadInner>,
    kernel: Arc<Kernel>,
}

impl Thread {
    pub(crate) fn new(id: ThreadId, inner: Arc<ThreadInner>, kernel: Arc<Kernel>) -> Self {
        Self { id, inner, kernel }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Debug name fixed at fork time.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority()
    }

    /// Changes the thread's priority.
    ///
    /// A queue the thread already sits on keeps the key captured when it was
    /// inserted; the new priority takes effect at the next insertion.
    pub fn set_priority(&self, priority: Priority) {
        self.inner.set_priority(priority);
    }

    pub fn state(&self) -> ThreadState {
        self.kernel.thread_state(self.id, &self.inner)
    }

    /// Blocks until this thread has finished.
    ///
    /// Called from another kernel thread, the caller is suspended through the
    /// scheduler; called from the control thread, it waits on the completion
    /// signal directly.
    pub fn join(&self) {
        self.kernel.join_thread(self.id, &self.inner);
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.inner.name())
            .field("priority", &self.inner.priority())
            .finish()
    }
}

thread_local! {
    static CURRENT: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

/// Id of the kernel thread executing on this OS thread, or `None` on the
/// control thread.
pub fn current_id() -> Option<ThreadId> {
    CURRENT.with(|cell| cell.get())
}

pub(crate) fn set_current(id: Option<ThreadId>) {
    CURRENT.with(|cell| cell.set(id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_numerically() {
        assert!(Priority(3) > Priority(1));
        assert!(Priority(0) > Priority(-2));
        assert_eq!(Priority(4).to_string(), "4");
        assert_eq!(Priority(-2).to_string(), "-2");
    }

    #[test]
    fn thread_ids_format_compactly() {
        assert_eq!(format!("{:?}", ThreadId(7)), "t7");
    }

    #[test]
    fn control_thread_has_no_current_id() {
        assert_eq!(current_id(), None);
    }
}
