//! Synchronous zero-capacity mailbox.
//!
//! A send and a receive rendezvous one-to-one: neither call returns until a
//! message has been handed over. Pairing is FIFO among senders and FIFO
//! among receivers, modulated by thread priority through the underlying
//! conditions. Composed from a lock and two conditions; the buffer holds a
//! message only transiently inside a matched pair of calls.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use ukern_core::Kernel;

use crate::condvar::Condition;
use crate::lock::Lock;

struct State<T> {
    pending: VecDeque<T>,
    senders: usize,
    receivers: usize,
}

struct Shared<T> {
    name: String,
    gate: Lock,
    send_ready: Condition,
    recv_ready: Condition,
    state: Mutex<State<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let state = self.state.get_mut();
        assert!(
            state.senders == 0 && state.receivers == 0,
            "mailbox {}: destroyed with threads inside send or receive",
            self.name
        );
    }
}

/// Unbuffered rendezvous channel for small copyable messages.
pub struct Mailbox<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Copy> Mailbox<T> {
    pub fn new(kernel: &Arc<Kernel>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            shared: Arc::new(Shared {
                gate: Lock::new(kernel, format!("{name}.lock")),
                send_ready: Condition::new(kernel, format!("{name}.send")),
                recv_ready: Condition::new(kernel, format!("{name}.recv")),
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    senders: 0,
                    receivers: 0,
                }),
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Blocks until a receiver accepts `message`.
    pub fn send(&self, message: T) {
        let shared = &*self.shared;
        shared.gate.acquire();
        let waiting_receivers = {
            let mut state = shared.state.lock();
            state.senders += 1;
            state.receivers
        };
        if waiting_receivers == 0 {
            shared.send_ready.wait(&shared.gate);
        }
        {
            let mut state = shared.state.lock();
            state.receivers -= 1;
            state.pending.push_back(message);
        }
        shared.recv_ready.signal(&shared.gate);
        shared.gate.release();
        log::trace!("mailbox {}: message delivered", shared.name);
    }

    /// Blocks until a sender offers a message, and returns it.
    pub fn receive(&self) -> T {
        let shared = &*self.shared;
        shared.gate.acquire();
        shared.state.lock().receivers += 1;
        shared.send_ready.signal(&shared.gate);
        shared.recv_ready.wait(&shared.gate);
        let message = {
            let mut state = shared.state.lock();
            state.senders -= 1;
            state
                .pending
                .pop_front()
                .expect("matched sender delivered before signaling")
        };
        shared.gate.release();
        log::trace!("mailbox {}: message consumed", shared.name);
        message
    }

    /// True when no message is buffered and no thread is inside a call.
    /// Meaningful only at quiescent points.
    pub fn is_quiescent(&self) -> bool {
        let state = self.shared.state.lock();
        state.pending.is_empty() && state.senders == 0 && state.receivers == 0
    }

    /// Consumes this handle, asserting that no thread is inside a call.
    pub fn destroy(self) {
        let state = self.shared.state.lock();
        assert!(
            state.senders == 0 && state.receivers == 0,
            "mailbox {}: destroyed with threads inside send or receive",
            self.shared.name
        );
    }
}
