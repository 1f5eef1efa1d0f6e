use std::time::{Duration, Instant};

use super::*;
use crate::port::{PortSet, PortWait};

#[test]
fn zero_leeway_window_fires_at_its_deadline() {
    let port = Port::new(1);
    let set = PortSet::new();
    set.insert(&port);

    let at = Instant::now() + Duration::from_millis(40);
    timer_service().arm(TimerKey::next(), port.clone(), at, at);

    match set.wait(Some(Duration::from_secs(2))) {
        PortWait::Ready { port: id, .. } => assert_eq!(id, port.id()),
        PortWait::TimedOut => panic!("window never fired"),
    }
    assert!(Instant::now() >= at);
}

#[test]
fn disarmed_window_does_not_fire() {
    let port = Port::new(1);
    let set = PortSet::new();
    set.insert(&port);

    let key = TimerKey::next();
    let at = Instant::now() + Duration::from_millis(60);
    timer_service().arm(key, port.clone(), at, at);
    timer_service().disarm(key);

    assert!(matches!(
        set.wait(Some(Duration::from_millis(150))),
        PortWait::TimedOut
    ));
}

#[test]
fn rearming_replaces_the_window() {
    let port = Port::new(1);
    let set = PortSet::new();
    set.insert(&port);

    let key = TimerKey::next();
    let far = Instant::now() + Duration::from_secs(60);
    timer_service().arm(key, port.clone(), far, far);
    let near = Instant::now() + Duration::from_millis(30);
    timer_service().arm(key, port.clone(), near, near);

    let start = Instant::now();
    assert!(matches!(
        set.wait(Some(Duration::from_secs(2))),
        PortWait::Ready { .. }
    ));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn tolerant_window_coalesces_onto_an_earlier_wake() {
    let precise = Port::new(1);
    let tolerant = Port::new(1);
    let set = PortSet::new();
    set.insert(&precise);
    set.insert(&tolerant);

    let now = Instant::now();
    // the tolerant window opens before the precise deadline, so the
    // precise wake should carry it along
    timer_service().arm(
        TimerKey::next(),
        tolerant.clone(),
        now + Duration::from_millis(20),
        now + Duration::from_secs(10),
    );
    timer_service().arm(
        TimerKey::next(),
        precise.clone(),
        now + Duration::from_millis(50),
        now + Duration::from_millis(50),
    );

    let mut fired = Vec::new();
    for _ in 0..2 {
        match set.wait(Some(Duration::from_secs(2))) {
            PortWait::Ready { port, .. } => fired.push(port),
            PortWait::TimedOut => break,
        }
    }
    assert!(fired.contains(&precise.id()));
    assert!(fired.contains(&tolerant.id()));
    assert!(now.elapsed() < Duration::from_secs(5));
}

#[test]
fn instant_add_saturates_absurd_spans() {
    let now = Instant::now();
    let capped = instant_add(now, Duration::MAX);
    assert!(capped <= now + TIMER_INTERVAL_LIMIT);
    assert_eq!(
        instant_add(now, Duration::from_secs(1)),
        now + Duration::from_secs(1)
    );
}
