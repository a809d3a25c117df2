//! Three-party rendezvous.
//!
//! One male, one female, and one matchmaker must all be present before any
//! of the three proceeds. The arrival that completes a trio does the
//! accounting for all three and wakes the other two; woken threads exit
//! without re-checking, since the initiator already consumed the match.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use ukern_core::Kernel;

use crate::condvar::Condition;
use crate::lock::Lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Male,
    Female,
    Matchmaker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => write!(f, "male"),
            Self::Female => write!(f, "female"),
            Self::Matchmaker => write!(f, "matchmaker"),
        }
    }
}

struct Counts {
    males: usize,
    females: usize,
    matchmakers: usize,
}

struct Shared {
    name: String,
    gate: Lock,
    male_ready: Condition,
    female_ready: Condition,
    matchmaker_ready: Condition,
    counts: Mutex<Counts>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let counts = self.counts.get_mut();
        assert!(
            counts.males == 0 && counts.females == 0 && counts.matchmakers == 0,
            "whale {}: destroyed with unmatched arrivals",
            self.name
        );
    }
}

/// Barrier across three role-typed threads.
#[derive(Clone)]
pub struct Whale {
    shared: Arc<Shared>,
}

impl Whale {
    pub fn new(kernel: &Arc<Kernel>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            shared: Arc::new(Shared {
                gate: Lock::new(kernel, format!("{name}.lock")),
                male_ready: Condition::new(kernel, format!("{name}.male")),
                female_ready: Condition::new(kernel, format!("{name}.female")),
                matchmaker_ready: Condition::new(kernel, format!("{name}.matchmaker")),
                counts: Mutex::new(Counts {
                    males: 0,
                    females: 0,
                    matchmakers: 0,
                }),
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Blocks until this male is matched with a female and a matchmaker.
    pub fn male(&self) {
        self.arrive(Role::Male);
    }

    /// Blocks until this female is matched with a male and a matchmaker.
    pub fn female(&self) {
        self.arrive(Role::Female);
    }

    /// Blocks until this matchmaker has paired a male with a female.
    pub fn matchmaker(&self) {
        self.arrive(Role::Matchmaker);
    }

    fn arrive(&self, role: Role) {
        let shared = &*self.shared;
        shared.gate.acquire();
        let matched = {
            let mut counts = shared.counts.lock();
            match role {
                Role::Male => counts.males += 1,
                Role::Female => counts.females += 1,
                Role::Matchmaker => counts.matchmakers += 1,
            }
            if counts.males > 0 && counts.females > 0 && counts.matchmakers > 0 {
                counts.males -= 1;
                counts.females -= 1;
                counts.matchmakers -= 1;
                true
            } else {
                false
            }
        };
        if matched {
            log::debug!("whale {}: match completed by a {role}", shared.name);
            // The initiator consumed the match; the woken parties just exit.
            match role {
                Role::Male => {
                    shared.female_ready.signal(&shared.gate);
                    shared.matchmaker_ready.signal(&shared.gate);
                }
                Role::Female => {
                    shared.male_ready.signal(&shared.gate);
                    shared.matchmaker_ready.signal(&shared.gate);
                }
                Role::Matchmaker => {
                    shared.male_ready.signal(&shared.gate);
                    shared.female_ready.signal(&shared.gate);
                }
            }
        } else {
            log::trace!("whale {}: {role} waiting", shared.name);
            self.role_condition(role).wait(&shared.gate);
        }
        shared.gate.release();
    }

    fn role_condition(&self, role: Role) -> &Condition {
        match role {
            Role::Male => &self.shared.male_ready,
            Role::Female => &self.shared.female_ready,
            Role::Matchmaker => &self.shared.matchmaker_ready,
        }
    }

    /// Unmatched arrivals per role, `(males, females, matchmakers)`.
    /// Meaningful only at quiescent points; at least one is always zero.
    pub fn counts(&self) -> (usize, usize, usize) {
        let counts = self.shared.counts.lock();
        (counts.males, counts.females, counts.matchmakers)
    }

    /// Consumes this handle, asserting that no arrival is unmatched.
    pub fn destroy(self) {
        let counts = self.shared.counts.lock();
        assert!(
            counts.males == 0 && counts.females == 0 && counts.matchmakers == 0,
            "whale {}: destroyed with unmatched arrivals",
            self.shared.name
        );
    }
}
