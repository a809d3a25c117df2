//! # ukern-core
//!
//! The thread kernel of a small educational uniprocessor system: cooperative
//! threads, a priority-ordered ready list, and the preemption gate that every
//! synchronization primitive builds on.
//!
//! Exactly one thread runs at a time. Context switches happen only at
//! explicit yield, sleep, and exit points, or when a wakeup performed under
//! the gate readies a thread of equal or higher priority. The single atomic
//! primitive is the gate itself; see [`gate`].
//!
//! ## Module Overview
//!
//! - [`list`]   – priority wait list with stable FIFO tie-breaking
//! - [`thread`] – thread handles, priorities, join
//! - [`sched`]  – kernel, thread table, ready list, dispatch
//! - [`gate`]   – scoped preemption mask and the sleep/wakeup contract

pub mod gate;
pub mod list;
pub mod sched;
pub mod thread;

pub use gate::{Gate, MaskLevel};
pub use list::WaitList;
pub use sched::{Kernel, KernelError, RunReport};
pub use thread::{current_id, Priority, Thread, ThreadId, ThreadState};
