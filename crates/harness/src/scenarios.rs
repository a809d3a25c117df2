//! The numbered scenarios.
//!
//! Every scenario keeps its primitives local and moves clones into the
//! threads that use them. A scenario whose point is a fatal rule violation
//! runs the kernel through [`run_or_abort`], which prints the abort message
//! and exits non-zero without running destructors, the way the real machine
//! would halt.

use std::process;
use std::sync::Arc;

use ukern_core::{Kernel, Priority, RunReport};
use ukern_sync::{Condition, Lock, Mailbox, Semaphore, Whale};

pub type Scenario = fn();

pub const TABLE: &[(u32, &str, Scenario)] = &[
    (1, "yield ping-pong between two threads", yield_ping_pong),
    (2, "lock handoff across yields", lock_handoff),
    (3, "blocked acquire waits for release", lock_blocks_second),
    (4, "reacquiring a held lock aborts", reacquire_same_lock),
    (5, "releasing an unheld lock aborts", release_unheld_lock),
    (6, "destroying an idle lock succeeds", destroy_idle_lock),
    (7, "destroying a held lock aborts", destroy_held_lock),
    (8, "waiting without holding the lock aborts", wait_without_lock),
    (9, "signal wakes exactly one waiter", signal_wakes_one),
    (10, "broadcast wakes every waiter", broadcast_wakes_all),
    (11, "signal with no waiters is a no-op", signal_no_waiters),
    (12, "broadcast with no waiters is a no-op", broadcast_no_waiters),
    (13, "waiting with a foreign lock aborts", wait_with_foreign_lock),
    (14, "destroying a lock with waiters aborts", destroy_lock_with_waiters),
    (15, "destroying a condition with waiters aborts", destroy_condition_with_waiters),
    (16, "mailbox send then receive", mailbox_send_then_receive),
    (17, "mailbox receive then send", mailbox_receive_then_send),
    (18, "mailbox send with no receiver blocks", mailbox_send_blocks),
    (19, "mailbox receive with no sender blocks", mailbox_receive_blocks),
    (20, "mailbox pairs three senders with three receivers", mailbox_three_pairs),
    (21, "three-party rendezvous across six threads", whale_six_threads),
    (22, "semaphore ping-pong", semaphore_ping_pong),
    (23, "ready list dispatches in priority order", ready_list_priorities),
    (24, "priority change does not re-sort the ready list", priority_change_no_resort),
];

fn run_or_abort(kernel: &Arc<Kernel>) -> RunReport {
    match kernel.run() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("kernel aborted: {err}");
            // Destructors are skipped on purpose; the system is halting.
            process::exit(1);
        }
    }
}

fn report(report: RunReport) {
    println!(
        "--- {} thread(s) finished, {} still blocked",
        report.finished, report.blocked
    );
}

fn yield_ping_pong() {
    let kernel = Kernel::new();
    for which in 0..2 {
        let worker = Arc::clone(&kernel);
        kernel.fork(format!("simple-{which}"), Priority(0), move || {
            for num in 0..5 {
                println!("*** thread {which} looped {num} times");
                worker.yield_now();
            }
        });
    }
    report(run_or_abort(&kernel));
}

fn lock_handoff() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "handoff");
    for which in 1..=2 {
        let lock = lock.clone();
        let worker = Arc::clone(&kernel);
        kernel.fork(format!("L{which}"), Priority(0), move || {
            println!("L{which}:0");
            lock.acquire();
            println!("L{which}:1");
            worker.yield_now();
            println!("L{which}:2");
            lock.release();
            println!("L{which}:3");
        });
    }
    report(run_or_abort(&kernel));
}

fn lock_blocks_second() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "guarded");

    let lock_1 = lock.clone();
    let worker = Arc::clone(&kernel);
    kernel.fork("first", Priority(0), move || {
        lock_1.acquire();
        println!("first acquired the lock and yields");
        worker.yield_now();
        println!("first releases the lock");
        lock_1.release();
    });

    let lock_2 = lock.clone();
    kernel.fork("second", Priority(0), move || {
        println!("second tries to acquire");
        lock_2.acquire();
        println!("second acquired the lock after the release");
        lock_2.release();
    });

    report(run_or_abort(&kernel));
}

fn reacquire_same_lock() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "same");
    kernel.fork("offender", Priority(0), move || {
        println!("acquiring the lock for the first time");
        lock.acquire();
        println!("acquiring the lock a second time; this must abort");
        lock.acquire();
        println!("this line must not print");
    });
    report(run_or_abort(&kernel));
}

fn release_unheld_lock() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "unheld");
    kernel.fork("offender", Priority(0), move || {
        println!("releasing a lock that is not held; this must abort");
        lock.release();
        println!("this line must not print");
    });
    report(run_or_abort(&kernel));
}

fn destroy_idle_lock() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "idle");
    kernel.fork("worker", Priority(0), move || {
        println!("destroying an unheld lock with no waiters");
        lock.destroy();
        println!("destroyed the idle lock");
    });
    report(run_or_abort(&kernel));
}

fn destroy_held_lock() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "held");
    kernel.fork("offender", Priority(0), move || {
        lock.acquire();
        println!("destroying the lock while holding it; this must abort");
        lock.destroy();
        println!("this line must not print");
    });
    report(run_or_abort(&kernel));
}

fn wait_without_lock() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "unheld");
    let cond = Condition::new(&kernel, "cond");
    kernel.fork("offender", Priority(0), move || {
        println!("waiting on a condition without holding the lock; this must abort");
        cond.wait(&lock);
        println!("this line must not print");
    });
    report(run_or_abort(&kernel));
}

fn fork_waiter(
    kernel: &Arc<Kernel>,
    name: &str,
    priority: i32,
    lock: &Lock,
    cond: &Condition,
) {
    let lock = lock.clone();
    let cond = cond.clone();
    let label = name.to_string();
    kernel.fork(name, Priority(priority), move || {
        lock.acquire();
        println!("{label} acquired the lock and waits");
        cond.wait(&lock);
        println!("{label} woke up");
        lock.release();
    });
}

fn signal_wakes_one() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "guard");
    let cond = Condition::new(&kernel, "cond");
    fork_waiter(&kernel, "one", 3, &lock, &cond);
    fork_waiter(&kernel, "two", 2, &lock, &cond);

    kernel.fork("three", Priority(1), move || {
        lock.acquire();
        println!("three signals; only thread one should wake");
        cond.signal(&lock);
        lock.release();
    });

    report(run_or_abort(&kernel));
}

fn broadcast_wakes_all() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "guard");
    let cond = Condition::new(&kernel, "cond");
    fork_waiter(&kernel, "one", 3, &lock, &cond);
    fork_waiter(&kernel, "two", 2, &lock, &cond);

    kernel.fork("three", Priority(1), move || {
        lock.acquire();
        println!("three broadcasts; both waiters should wake");
        cond.broadcast(&lock);
        lock.release();
    });

    report(run_or_abort(&kernel));
}

fn signal_no_waiters() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "guard");
    let cond = Condition::new(&kernel, "empty");
    kernel.fork("signaler", Priority(0), move || {
        lock.acquire();
        println!("signaling a condition nobody waits on");
        cond.signal(&lock);
        println!("signal returned as a no-op");
        lock.release();
    });
    report(run_or_abort(&kernel));
}

fn broadcast_no_waiters() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "guard");
    let cond = Condition::new(&kernel, "empty");
    kernel.fork("broadcaster", Priority(0), move || {
        lock.acquire();
        println!("broadcasting a condition nobody waits on");
        cond.broadcast(&lock);
        println!("broadcast returned as a no-op");
        lock.release();
    });
    report(run_or_abort(&kernel));
}

fn wait_with_foreign_lock() {
    let kernel = Kernel::new();
    let main_lock = Lock::new(&kernel, "main");
    let other_lock = Lock::new(&kernel, "other");
    let cond = Condition::new(&kernel, "cond");

    fork_waiter(&kernel, "waiter", 2, &main_lock, &cond);

    kernel.fork("offender", Priority(1), move || {
        other_lock.acquire();
        println!("waiting on the condition while holding a different lock; this must abort");
        cond.wait(&main_lock);
        println!("this line must not print");
    });

    report(run_or_abort(&kernel));
}

fn destroy_lock_with_waiters() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "crowded");

    let lock_holder = lock.clone();
    let worker = Arc::clone(&kernel);
    kernel.fork("holder", Priority(1), move || {
        lock_holder.acquire();
        println!("holder acquired the lock and yields");
        worker.yield_now();
        lock_holder.release();
    });

    let lock_blocker = lock.clone();
    kernel.fork("blocker", Priority(1), move || {
        println!("blocker queues up on the lock");
        lock_blocker.acquire();
        lock_blocker.release();
    });

    kernel.fork("destroyer", Priority(1), move || {
        println!("destroying the lock while a thread waits; this must abort");
        lock.destroy();
        println!("this line must not print");
    });

    report(run_or_abort(&kernel));
}

fn destroy_condition_with_waiters() {
    let kernel = Kernel::new();
    let lock = Lock::new(&kernel, "guard");
    let cond = Condition::new(&kernel, "crowded");

    fork_waiter(&kernel, "waiter", 2, &lock, &cond);

    let lock_2 = lock.clone();
    kernel.fork("destroyer", Priority(1), move || {
        lock_2.acquire();
        println!("destroying the condition while a thread waits; this must abort");
        cond.destroy();
        println!("this line must not print");
    });

    report(run_or_abort(&kernel));
}

fn mailbox_send_then_receive() {
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "mbox");

    let sender = mailbox.clone();
    kernel.fork("sender", Priority(2), move || {
        println!("sending 12");
        sender.send(12);
        println!("send returned");
    });

    kernel.fork("receiver", Priority(1), move || {
        println!("receiving");
        let message = mailbox.receive();
        println!("received {message}");
    });

    report(run_or_abort(&kernel));
}

fn mailbox_receive_then_send() {
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "mbox");

    let receiver = mailbox.clone();
    kernel.fork("receiver", Priority(2), move || {
        println!("receiving before any send");
        let message = receiver.receive();
        println!("received {message}");
    });

    kernel.fork("sender", Priority(1), move || {
        println!("sending 24");
        mailbox.send(24);
        println!("send returned");
    });

    report(run_or_abort(&kernel));
}

fn mailbox_send_blocks() {
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "lonely");
    kernel.fork("sender", Priority(0), move || {
        println!("sending with no receiver; this call must not return");
        mailbox.send(12);
        println!("this line must not print");
    });
    report(run_or_abort(&kernel));
}

fn mailbox_receive_blocks() {
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "lonely");
    kernel.fork("receiver", Priority(0), move || {
        println!("receiving with no sender; this call must not return");
        mailbox.receive();
        println!("this line must not print");
    });
    report(run_or_abort(&kernel));
}

fn mailbox_three_pairs() {
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "busy");

    for (which, value) in [(1, 11), (2, 12), (3, 13)] {
        let sender = mailbox.clone();
        kernel.fork(format!("sender-{which}"), Priority(0), move || {
            println!("sender {which} sends {value}");
            sender.send(value);
            println!("sender {which} finished");
        });
    }
    for which in 1..=3 {
        let receiver = mailbox.clone();
        kernel.fork(format!("receiver-{which}"), Priority(0), move || {
            let message = receiver.receive();
            println!("receiver {which} got {message}");
        });
    }

    report(run_or_abort(&kernel));
}

fn whale_six_threads() {
    let kernel = Kernel::new();
    let whale = Whale::new(&kernel, "pod");

    let roles: [(&str, fn(&Whale)); 6] = [
        ("male-1", Whale::male),
        ("matchmaker-1", Whale::matchmaker),
        ("matchmaker-2", Whale::matchmaker),
        ("female-1", Whale::female),
        ("male-2", Whale::male),
        ("female-2", Whale::female),
    ];
    for (name, role) in roles {
        let whale = whale.clone();
        let label = name;
        kernel.fork(name, Priority(0), move || {
            println!("{label} arrives");
            role(&whale);
            println!("{label} passed the barrier");
        });
    }

    report(run_or_abort(&kernel));
    let (males, females, matchmakers) = whale.counts();
    println!("unmatched: {males} male(s), {females} female(s), {matchmakers} matchmaker(s)");
    assert!(males == 0 || females == 0 || matchmakers == 0);
}

fn semaphore_ping_pong() {
    let kernel = Kernel::new();
    let sem = Semaphore::new(&kernel, "pingpong", 0);

    let sem_a = sem.clone();
    kernel.fork("a", Priority(2), move || {
        println!("a waits on the semaphore");
        sem_a.p();
        println!("a resumed");
    });

    let sem_b = sem.clone();
    kernel.fork("b", Priority(1), move || {
        println!("b releases the semaphore");
        sem_b.v();
    });

    report(run_or_abort(&kernel));
    println!("final semaphore value: {}", sem.value());
}

fn ready_list_priorities() {
    let kernel = Kernel::new();
    for (index, priority) in [3, -2, 1, 1, 4].into_iter().enumerate() {
        kernel.fork(format!("worker-{index}"), Priority(priority), move || {
            println!("running at priority {priority}");
        });
    }
    report(run_or_abort(&kernel));
}

fn priority_change_no_resort() {
    let kernel = Kernel::new();
    kernel.fork("low", Priority(1), || {
        println!("low runs");
    });
    let high = kernel.fork("high", Priority(5), || {
        println!("high runs first despite the demotion");
    });
    // Already on the ready list with key 5; the demotion only affects the
    // next insertion.
    high.set_priority(Priority(0));
    report(run_or_abort(&kernel));
}
