use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use super::*;

#[test]
fn send_then_wait_delivers_the_message() {
    let port = Port::new(4);
    let set = PortSet::new();
    set.insert(&port);

    port.send(PortMessage::new(json!({"k": 1}))).unwrap();
    match set.wait(Some(Duration::from_millis(100))) {
        PortWait::Ready { port: id, message } => {
            assert_eq!(id, port.id());
            assert_eq!(message.payload, json!({"k": 1}));
        }
        PortWait::TimedOut => panic!("message was pending"),
    }
}

#[test]
fn full_queue_rejects_the_send() {
    let port = Port::new(1);
    port.send(PortMessage::default()).unwrap();
    assert_eq!(
        port.send(PortMessage::default()),
        Err(PortError::QueueFull)
    );
}

#[test]
fn wait_times_out_when_nothing_is_ready() {
    let set = PortSet::new();
    set.insert(&Port::new(1));
    let start = Instant::now();
    assert!(matches!(
        set.wait(Some(Duration::from_millis(50))),
        PortWait::TimedOut
    ));
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn poll_returns_immediately() {
    let set = PortSet::new();
    set.insert(&Port::new(1));
    let start = Instant::now();
    assert!(matches!(set.wait(Some(Duration::ZERO)), PortWait::TimedOut));
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn message_queued_before_insert_counts_as_ready() {
    let port = Port::new(2);
    port.send(PortMessage::new(json!("early"))).unwrap();
    let set = PortSet::new();
    set.insert(&port);
    assert!(matches!(
        set.wait(Some(Duration::ZERO)),
        PortWait::Ready { .. }
    ));
}

#[test]
fn removed_port_no_longer_wakes_the_set() {
    let port = Port::new(2);
    let set = PortSet::new();
    set.insert(&port);
    set.remove(&port);
    port.send(PortMessage::default()).unwrap();
    assert!(matches!(
        set.wait(Some(Duration::from_millis(50))),
        PortWait::TimedOut
    ));
}

#[test]
fn two_ports_in_one_set_both_deliver() {
    let a = Port::new(2);
    let b = Port::new(2);
    let set = PortSet::new();
    set.insert(&a);
    set.insert(&b);

    a.send(PortMessage::new(json!("a"))).unwrap();
    b.send(PortMessage::new(json!("b"))).unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        match set.wait(Some(Duration::from_millis(100))) {
            PortWait::Ready { port, .. } => seen.push(port),
            PortWait::TimedOut => panic!("both ports had messages"),
        }
    }
    seen.sort();
    let mut expected = vec![a.id(), b.id()];
    expected.sort();
    assert_eq!(seen, expected);
}

#[test]
fn cross_thread_send_wakes_a_blocked_wait() {
    let port = Port::new(1);
    let set = PortSet::new();
    set.insert(&port);

    let sender = {
        let port = port.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            port.send(PortMessage::new(json!("wake"))).unwrap();
        })
    };
    let start = Instant::now();
    assert!(matches!(
        set.wait(Some(Duration::from_secs(5))),
        PortWait::Ready { .. }
    ));
    assert!(start.elapsed() < Duration::from_secs(1));
    sender.join().unwrap();
}

#[test]
fn draining_elsewhere_leaves_a_stale_note() {
    let port = Port::new(2);
    let set = PortSet::new();
    set.insert(&port);
    port.send(PortMessage::default()).unwrap();
    // consumed out-of-band, the set's readiness note goes stale
    assert!(port.try_recv().is_some());
    assert!(matches!(set.wait(Some(Duration::ZERO)), PortWait::TimedOut));
}
