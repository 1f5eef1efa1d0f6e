use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::*;
use crate::semaphore::Timeout;

#[test]
fn balanced_group_reports_zero_outstanding() {
    let group = Group::new();
    assert!(group.is_balanced());
    group.enter();
    assert_eq!(group.outstanding(), 1);
    group.leave();
    assert!(group.is_balanced());
}

#[test]
fn notify_fires_once_at_the_balance_point() {
    let group = Group::new();
    let fired = Arc::new(AtomicUsize::new(0));

    group.enter();
    group.enter();
    group.enter();
    {
        let fired = Arc::clone(&fired);
        group.notify(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    group.leave();
    group.leave();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    group.leave();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // the queue was drained; a later balance crossing does not re-run it
    group.enter();
    group.leave();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn notify_on_an_already_balanced_group_runs_immediately() {
    let group = Group::new();
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        group.notify(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn notify_closures_run_in_fifo_order() {
    let group = Group::new();
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    group.enter();
    for tag in 1..=3 {
        let log = Arc::clone(&log);
        group.notify(move || log.lock().push(tag));
    }
    group.leave();
    assert_eq!(*log.lock(), vec![1, 2, 3]);
}

#[test]
fn wait_blocks_until_the_last_leave() {
    let group = Arc::new(Group::new());
    group.enter();
    let waiter = {
        let group = Arc::clone(&group);
        thread::spawn(move || group.wait(Timeout::Forever))
    };
    thread::sleep(Duration::from_millis(50));
    group.leave();
    assert!(waiter.join().unwrap());
}

#[test]
fn wait_now_times_out_until_balanced() {
    let group = Group::new();
    group.enter();
    group.enter();
    group.enter();
    group.leave();
    group.leave();
    assert!(!group.wait(Timeout::Now));
    group.leave();
    assert!(group.wait(Timeout::Forever));
}

#[test]
fn bounded_wait_times_out_on_an_unbalanced_group() {
    let group = Group::new();
    group.enter();
    assert!(!group.wait(Timeout::After(Duration::from_millis(50))));
    group.leave();
    assert!(group.wait(Timeout::Now));
}

#[test]
fn multiple_waiters_all_released_at_balance() {
    let group = Arc::new(Group::new());
    group.enter();
    let mut waiters = Vec::new();
    for _ in 0..3 {
        let group = Arc::clone(&group);
        waiters.push(thread::spawn(move || group.wait(Timeout::Forever)));
    }
    thread::sleep(Duration::from_millis(50));
    group.leave();
    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
}

#[test]
#[should_panic(expected = "unbalanced call to Group::leave")]
fn leave_without_enter_panics() {
    let group = Group::new();
    group.leave();
}
