use std::time::{Duration, Instant};

use chrono::Utc;

use super::*;

#[test]
fn builder_defaults_make_a_one_shot_timer() {
    let timer = TimerBuilder::new().build(|_| {});
    assert!(timer.interval().is_zero());
    assert_eq!(timer.tolerance(), Duration::ZERO);
    assert_eq!(timer.order(), 0);
    assert!(timer.is_valid());
}

#[test]
fn delay_sets_the_monotonic_fire_time() {
    let before = Instant::now();
    let timer = TimerBuilder::new()
        .delay(Duration::from_millis(500))
        .build(|_| {});
    let at = timer.fire_instant();
    assert!(at >= before + Duration::from_millis(500));
    assert!(at <= Instant::now() + Duration::from_millis(600));
}

#[test]
fn tolerance_clamps_to_half_the_interval() {
    let timer = TimerBuilder::new()
        .interval(Duration::from_millis(100))
        .tolerance(Duration::from_millis(80))
        .build(|_| {});
    assert_eq!(timer.tolerance(), Duration::from_millis(50));

    timer.set_tolerance(Duration::from_millis(10));
    assert_eq!(timer.tolerance(), Duration::from_millis(10));
    timer.set_tolerance(Duration::from_secs(60));
    assert_eq!(timer.tolerance(), Duration::from_millis(50));
}

#[test]
fn one_shot_timer_keeps_the_requested_tolerance() {
    let timer = TimerBuilder::new()
        .tolerance(Duration::from_millis(80))
        .build(|_| {});
    assert_eq!(timer.tolerance(), Duration::from_millis(80));
}

#[test]
fn set_next_fire_date_updates_both_domains() {
    let timer = TimerBuilder::new().build(|_| {});
    let target = Utc::now() + chrono::Duration::seconds(5);
    timer.set_next_fire_date(target);

    assert_eq!(timer.next_fire_date(), target);
    let ahead = timer
        .fire_instant()
        .saturating_duration_since(Instant::now());
    assert!(ahead > Duration::from_millis(4500));
    assert!(ahead <= Duration::from_millis(5100));
}

#[test]
fn past_fire_dates_clamp_to_now() {
    let timer = TimerBuilder::new()
        .fire_date(Utc::now() - chrono::Duration::seconds(30))
        .build(|_| {});
    assert!(timer.fire_instant() <= Instant::now());
}

#[test]
fn absurd_intervals_saturate() {
    let timer = TimerBuilder::new().interval(Duration::MAX).build(|_| {});
    assert_eq!(timer.interval(), crate::timer_service::TIMER_INTERVAL_LIMIT);
}

#[test]
fn invalidation_is_permanent() {
    let timer = TimerBuilder::new().build(|_| {});
    timer.invalidate();
    assert!(!timer.is_valid());
}
