//! # ukern-sync
//!
//! Synchronization primitives for the ukern cooperative kernel.
//!
//! The semaphore, lock, and condition build directly on the preemption gate
//! of [`ukern_core`]: every operation masks preemption for its whole body,
//! and a thread that must block links itself on a priority wait list and
//! sleeps with the mask held. The mailbox and the three-party rendezvous are
//! composed from a lock and conditions.
//!
//! ## Module Overview
//!
//! - [`semaphore`] – counting semaphore
//! - [`lock`]      – owner-tracked mutual exclusion
//! - [`condvar`]   – Mesa-style condition variable
//! - [`mailbox`]   – synchronous zero-capacity rendezvous channel
//! - [`whale`]     – three-party rendezvous

pub mod condvar;
pub mod lock;
pub mod mailbox;
pub mod semaphore;
pub mod whale;

pub use condvar::Condition;
pub use lock::Lock;
pub use mailbox::Mailbox;
pub use semaphore::Semaphore;
pub use whale::Whale;
