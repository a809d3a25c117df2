//! Integration tests for the mailbox and the three-party rendezvous.

use std::sync::{Arc, Mutex};

use ukern_core::{Kernel, Priority};
use ukern_sync::{Mailbox, Whale};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn mailbox_send_then_receive() {
    init_logging();
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "mbox");
    let received = Arc::new(Mutex::new(None));

    let sender = mailbox.clone();
    kernel.fork("sender", Priority(2), move || {
        sender.send(12);
    });

    let receiver = mailbox.clone();
    let slot = Arc::clone(&received);
    kernel.fork("receiver", Priority(1), move || {
        *slot.lock().unwrap() = Some(receiver.receive());
    });

    let report = kernel.run().expect("clean run");
    assert_eq!(report.finished, 2);
    assert_eq!(report.blocked, 0);
    assert_eq!(*received.lock().unwrap(), Some(12));
    assert!(mailbox.is_quiescent());
}

#[test]
fn mailbox_receive_then_send() {
    init_logging();
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "mbox");
    let received = Arc::new(Mutex::new(None));

    let receiver = mailbox.clone();
    let slot = Arc::clone(&received);
    kernel.fork("receiver", Priority(2), move || {
        *slot.lock().unwrap() = Some(receiver.receive());
    });

    let sender = mailbox.clone();
    kernel.fork("sender", Priority(1), move || {
        sender.send(24);
    });

    let report = kernel.run().expect("clean run");
    assert_eq!(report.finished, 2);
    assert_eq!(report.blocked, 0);
    assert_eq!(*received.lock().unwrap(), Some(24));
    assert!(mailbox.is_quiescent());
}

#[test]
fn mailbox_pairs_fifo_across_many_threads() {
    init_logging();
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "mbox");
    let received = Arc::new(Mutex::new(Vec::new()));

    for (name, value) in [("s1", 11), ("s2", 12), ("s3", 13)] {
        let sender = mailbox.clone();
        kernel.fork(name, Priority(1), move || {
            sender.send(value);
        });
    }
    for name in ["r1", "r2", "r3"] {
        let receiver = mailbox.clone();
        let sink = Arc::clone(&received);
        kernel.fork(name, Priority(1), move || {
            let value = receiver.receive();
            sink.lock().unwrap().push(value);
        });
    }

    let report = kernel.run().expect("clean run");
    assert_eq!(report.finished, 6);
    assert_eq!(report.blocked, 0);
    // FIFO among senders and among receivers: values arrive in send order.
    assert_eq!(*received.lock().unwrap(), vec![11, 12, 13]);
    assert!(mailbox.is_quiescent());
}

#[test]
fn mailbox_send_blocks_without_a_receiver() {
    init_logging();
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "lonely");

    let sender = mailbox.clone();
    kernel.fork("sender", Priority(0), move || {
        sender.send(9);
    });

    let report = kernel.run().expect("clean run");
    assert_eq!(report.finished, 0);
    assert_eq!(report.blocked, 1);
    assert!(!mailbox.is_quiescent());
}

#[test]
fn mailbox_receive_blocks_without_a_sender() {
    init_logging();
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "lonely");

    let receiver = mailbox.clone();
    kernel.fork("receiver", Priority(0), move || {
        receiver.receive();
    });

    let report = kernel.run().expect("clean run");
    assert_eq!(report.finished, 0);
    assert_eq!(report.blocked, 1);
    assert!(!mailbox.is_quiescent());
}

#[test]
#[should_panic(expected = "inside send or receive")]
fn mailbox_destroy_with_resident_aborts() {
    init_logging();
    let kernel = Kernel::new();
    let mailbox: Mailbox<i32> = Mailbox::new(&kernel, "doomed");

    let sender = mailbox.clone();
    kernel.fork("sender", Priority(0), move || {
        sender.send(1);
    });

    let report = kernel.run().expect("clean run");
    assert_eq!(report.blocked, 1);
    mailbox.destroy();
}

#[test]
fn whale_matches_two_complete_trios() {
    init_logging();
    let kernel = Kernel::new();
    let whale = Whale::new(&kernel, "pod");

    // One arrival per role twice over; every thread passes the barrier.
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
        kernel.fork(name, Priority(0), move || {
            role(&whale);
        });
    }

    let report = kernel.run().expect("clean run");
    assert_eq!(report.finished, 6);
    assert_eq!(report.blocked, 0);
    assert_eq!(whale.counts(), (0, 0, 0));
}

#[test]
fn whale_extra_arrival_stays_blocked() {
    init_logging();
    let kernel = Kernel::new();
    let whale = Whale::new(&kernel, "pod");

    let roles: [(&str, fn(&Whale)); 4] = [
        ("male-1", Whale::male),
        ("matchmaker-1", Whale::matchmaker),
        ("female-1", Whale::female),
        ("male-2", Whale::male),
    ];
    for (name, role) in roles {
        let whale = whale.clone();
        kernel.fork(name, Priority(0), move || {
            role(&whale);
        });
    }

    let report = kernel.run().expect("clean run");
    assert_eq!(report.finished, 3);
    assert_eq!(report.blocked, 1);

    // One unmatched male; at least one count is always zero.
    let (males, females, matchmakers) = whale.counts();
    assert_eq!((males, females, matchmakers), (1, 0, 0));
    assert!(males == 0 || females == 0 || matchmakers == 0);
}

#[test]
#[should_panic(expected = "unmatched arrivals")]
fn whale_destroy_with_unmatched_arrival_aborts() {
    init_logging();
    let kernel = Kernel::new();
    let whale = Whale::new(&kernel, "doomed");

    let lone = whale.clone();
    kernel.fork("male", Priority(0), move || {
        lone.male();
    });

    let report = kernel.run().expect("clean run");
    assert_eq!(report.blocked, 1);
    whale.destroy();
}
