//! Kernel thread table, ready list, and dispatch.
//!
//! One OS thread backs each kernel thread and stays parked except while it is
//! the single running thread. All scheduler state sits behind one mutex; a
//! context switch unparks the chosen thread and parks the current one. The
//! control thread (the one that built the kernel) is not a kernel thread: it
//! dispatches the first thread and then waits for the system to finish, go
//! idle, or abort.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread as host;

use parking_lot::{Mutex, MutexGuard};
use slab::Slab;
use thiserror::Error;

use crate::gate::{Gate, MaskLevel};
use crate::list::WaitList;
use crate::thread::{self, Priority, Thread, ThreadId, ThreadInner, ThreadState};

/// Fatal outcomes surfaced by [`Kernel::run`].
#[derive(Debug, Error)]
pub enum KernelError {
    /// A kernel thread tripped an invariant assertion.
    #[error("kernel thread `{thread}` aborted: {message}")]
    ThreadAborted { thread: String, message: String },
}

/// Outcome of one [`Kernel::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Threads that have run to completion.
    pub finished: usize,
    /// Threads still suspended on a wait queue when the ready list drained.
    pub blocked: usize,
}

enum ControlMsg {
    AllFinished { finished: usize },
    Idle { finished: usize, blocked: usize },
    Fatal { thread: String, message: String },
}

pub(crate) struct ThreadRecord {
    pub(crate) inner: Arc<ThreadInner>,
    pub(crate) state: ThreadState,
    host: Option<host::Thread>,
    pub(crate) joiners: WaitList,
}

pub(crate) struct SchedState {
    pub(crate) threads: Slab<ThreadRecord>,
    pub(crate) ready: WaitList,
    pub(crate) running: Option<ThreadId>,
    pub(crate) mask: MaskLevel,
    pub(crate) preempt_pending: bool,
    live: usize,
    finished: usize,
    control_tx: mpsc::Sender<ControlMsg>,
}

impl SchedState {
    /// Marks a thread ready and links it into the ready list at its current
    /// priority.
    pub(crate) fn make_ready(&mut self, target: ThreadId) {
        let record = &mut self.threads[target.index()];
        record.state = ThreadState::Ready;
        let priority = record.inner.priority();
        self.ready.insert(target, priority);
    }
}

/// The cooperative uniprocessor kernel.
pub struct Kernel {
    state: Mutex<SchedState>,
    control_rx: Mutex<mpsc::Receiver<ControlMsg>>,
}

impl Kernel {
    pub fn new() -> Arc<Self> {
        let (control_tx, control_rx) = mpsc::channel();
        Arc::new(Self {
            state: Mutex::new(SchedState {
                threads: Slab::new(),
                ready: WaitList::new(),
                running: None,
                mask: MaskLevel::Unmasked,
                preempt_pending: false,
                live: 0,
                finished: 0,
                control_tx,
            }),
            control_rx: Mutex::new(control_rx),
        })
    }

    /// Masks preemption for the scope of the returned guard, saving the
    /// prior level.
    pub fn enter(&self) -> Gate<'_> {
        let mut guard = self.state.lock();
        let prior = std::mem::replace(&mut guard.mask, MaskLevel::Masked);
        Gate {
            kernel: self,
            guard: Some(guard),
            prior,
        }
    }

    /// Creates a kernel thread and links it into the ready list.
    ///
    /// The thread does not run until dispatched; forking is not a wakeup and
    /// never preempts the caller.
    pub fn fork(
        self: &Arc<Self>,
        name: impl Into<String>,
        priority: Priority,
        body: impl FnOnce() + Send + 'static,
    ) -> Thread {
        let name = name.into();
        let inner = Arc::new(ThreadInner::new(name.clone(), priority));
        let mut state = self.state.lock();
        let entry = state.threads.vacant_entry();
        let id = ThreadId(entry.key());
        entry.insert(ThreadRecord {
            inner: Arc::clone(&inner),
            state: ThreadState::Ready,
            host: None,
            joiners: WaitList::new(),
        });
        state.live += 1;
        let kernel = Arc::clone(self);
        let tramp_inner = Arc::clone(&inner);
        let handle = host::Builder::new()
            .name(name.clone())
            .spawn(move || trampoline(kernel, id, tramp_inner, body))
            .expect("failed to spawn backing thread");
        // Recorded before the state lock drops so any dispatch can unpark it.
        state.threads[id.index()].host = Some(handle.thread().clone());
        state.ready.insert(id, priority);
        log::trace!("created {id:?} ({name}) at priority {priority}");
        drop(state);
        Thread::new(id, inner, Arc::clone(self))
    }

    /// Dispatches threads until the system finishes, goes idle with blocked
    /// threads remaining, or a kernel thread aborts.
    ///
    /// Must be called from the control thread.
    pub fn run(&self) -> Result<RunReport, KernelError> {
        assert!(
            thread::current_id().is_none(),
            "run may only be called from the control thread"
        );
        {
            let mut state = self.state.lock();
            if state.running.is_none() {
                self.dispatch_next(&mut state);
            }
        }
        let rx = self.control_rx.lock();
        match rx.recv().expect("kernel state dropped while running") {
            ControlMsg::AllFinished { finished } => Ok(RunReport {
                finished,
                blocked: 0,
            }),
            ControlMsg::Idle { finished, blocked } => Ok(RunReport { finished, blocked }),
            ControlMsg::Fatal { thread, message } => {
                Err(KernelError::ThreadAborted { thread, message })
            }
        }
    }

    /// Voluntarily reschedules the running thread behind equal-priority
    /// peers.
    pub fn yield_now(&self) {
        let me = thread::current_id().expect("yield outside a kernel thread");
        let mut state = self.state.lock();
        debug_assert_eq!(state.running, Some(me), "yielding thread is not running");
        log::trace!("{me:?} yielded the processor");
        state.running = None;
        state.preempt_pending = false;
        state.make_ready(me);
        let next = state
            .ready
            .pop_front()
            .expect("yielding thread is on the ready list");
        if next == me {
            state.threads[me.index()].state = ThreadState::Running;
            state.running = Some(me);
            return;
        }
        self.switch_to(&mut state, next);
        drop(state);
        self.wait_until_scheduled(me);
    }

    /// Handle to the running kernel thread, or `None` on the control thread.
    pub fn current(self: &Arc<Self>) -> Option<Thread> {
        let id = thread::current_id()?;
        let state = self.state.lock();
        let record = state.threads.get(id.index())?;
        Some(Thread::new(id, Arc::clone(&record.inner), Arc::clone(self)))
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock()
    }

    pub(crate) fn thread_state(&self, id: ThreadId, inner: &Arc<ThreadInner>) -> ThreadState {
        let state = self.state.lock();
        match state.threads.get(id.index()) {
            Some(record) if Arc::ptr_eq(&record.inner, inner) => record.state,
            _ => ThreadState::Finished,
        }
    }

    pub(crate) fn join_thread(&self, id: ThreadId, inner: &Arc<ThreadInner>) {
        match thread::current_id() {
            Some(me) => {
                assert_ne!(me, id, "thread cannot join itself");
                let mut gate = self.enter();
                let state = gate.state();
                let alive = state
                    .threads
                    .get(id.index())
                    .is_some_and(|record| Arc::ptr_eq(&record.inner, inner));
                if alive {
                    let my_priority = state.threads[me.index()].inner.priority();
                    state.threads[id.index()].joiners.insert(me, my_priority);
                    gate.sleep();
                }
            }
            None => inner.wait_done(),
        }
    }

    /// Hands the CPU to the front of the ready list, or reports completion
    /// or idleness to the control thread when nothing is runnable.
    pub(crate) fn dispatch_next(&self, state: &mut SchedState) {
        if let Some(next) = state.ready.pop_front() {
            self.switch_to(state, next);
        } else if state.live == 0 {
            let _ = state.control_tx.send(ControlMsg::AllFinished {
                finished: state.finished,
            });
        } else {
            log::trace!("idle: {} thread(s) blocked", state.live);
            let _ = state.control_tx.send(ControlMsg::Idle {
                finished: state.finished,
                blocked: state.live,
            });
        }
    }

    pub(crate) fn switch_to(&self, state: &mut SchedState, next: ThreadId) {
        state.running = Some(next);
        let record = &mut state.threads[next.index()];
        record.state = ThreadState::Running;
        log::trace!("dispatching {next:?} ({})", record.inner.name());
        if let Some(host) = &record.host {
            host.unpark();
        }
    }

    /// Parks the backing OS thread until this kernel thread is the running
    /// one. Absorbs spurious wakeups and early unpark tokens.
    pub(crate) fn wait_until_scheduled(&self, me: ThreadId) {
        loop {
            if self.state.lock().running == Some(me) {
                return;
            }
            host::park();
        }
    }

    fn finish(&self, id: ThreadId, inner: &Arc<ThreadInner>, result: Result<(), Box<dyn Any + Send>>) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.running, Some(id), "finishing thread is not running");
        state.running = None;
        state.preempt_pending = false;
        let mut record = state.threads.remove(id.index());
        while let Some(joiner) = record.joiners.pop_front() {
            state.make_ready(joiner);
        }
        state.live -= 1;
        state.finished += 1;
        match result {
            Ok(()) => {
                log::trace!("{id:?} ({}) exited", inner.name());
                self.dispatch_next(&mut state);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("{id:?} ({}) aborted: {message}", inner.name());
                // No further dispatch: the system aborts at the point of
                // detection and the control thread surfaces the failure.
                let _ = state.control_tx.send(ControlMsg::Fatal {
                    thread: inner.name().to_string(),
                    message,
                });
            }
        }
        drop(state);
        inner.mark_done();
    }
}

fn trampoline(
    kernel: Arc<Kernel>,
    id: ThreadId,
    inner: Arc<ThreadInner>,
    body: impl FnOnce() + Send + 'static,
) {
    thread::set_current(Some(id));
    kernel.wait_until_scheduled(id);
    let result = catch_unwind(AssertUnwindSafe(body));
    kernel.finish(id, &inner, result);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unrecognized panic payload".to_string()
    }
}
