use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::port::Port;
use crate::timer::TimerBuilder;

#[test]
fn named_canonicalizes_reserved_names() {
    assert_eq!(RunLoopMode::named("default"), RunLoopMode::Default);
    assert_eq!(RunLoopMode::named("common"), RunLoopMode::Common);
    assert_eq!(
        RunLoopMode::named("tracking"),
        RunLoopMode::Custom("tracking".into())
    );
}

#[test]
fn mode_identity_is_by_name() {
    assert_eq!(RunLoopMode::Custom("default".into()), RunLoopMode::Default);
    assert_ne!(RunLoopMode::Custom("other".into()), RunLoopMode::Default);

    let mut set = std::collections::HashSet::new();
    set.insert(RunLoopMode::Default);
    assert!(set.contains(&RunLoopMode::Custom("default".into())));
}

#[test]
fn display_uses_the_bare_name() {
    assert_eq!(RunLoopMode::Default.to_string(), "default");
    assert_eq!(RunLoopMode::Common.to_string(), "common");
    assert_eq!(RunLoopMode::Custom("io".into()).to_string(), "io");
}

#[test]
fn phase_mask_matching() {
    let mask = RunLoopPhase::Entry as u32 | RunLoopPhase::BeforeWaiting as u32;
    assert!(RunLoopPhase::Entry.matches(mask));
    assert!(RunLoopPhase::BeforeWaiting.matches(mask));
    assert!(!RunLoopPhase::Exit.matches(mask));
    for phase in [
        RunLoopPhase::Entry,
        RunLoopPhase::BeforeTimers,
        RunLoopPhase::BeforeSources,
        RunLoopPhase::BeforeWaiting,
        RunLoopPhase::AfterWaiting,
        RunLoopPhase::Exit,
    ] {
        assert!(phase.matches(RunLoopPhase::ALL));
    }
}

#[test]
fn repositioned_timers_stay_sorted() {
    let wake = Port::new(1);
    let state = ModeState::new(RunLoopMode::Default, &wake);

    let delays = [300u64, 100, 500, 200, 400];
    let timers: Vec<_> = delays
        .iter()
        .map(|ms| {
            TimerBuilder::new()
                .delay(Duration::from_millis(*ms))
                .build(|_| {})
        })
        .collect();

    {
        let mut inner = state.inner.lock();
        for timer in &timers {
            state.reposition_timer(&mut inner, timer, false);
        }
        let instants: Vec<_> = inner.timers.iter().map(|t| t.fire_instant()).collect();
        let mut sorted = instants.clone();
        sorted.sort();
        assert_eq!(instants, sorted);
        assert_eq!(inner.timers.len(), timers.len());
    }

    // moving one timer re-sorts it instead of duplicating it
    timers[0].set_next_fire_date(chrono::Utc::now() + chrono::Duration::seconds(10));
    {
        let mut inner = state.inner.lock();
        state.reposition_timer(&mut inner, &timers[0], true);
        assert_eq!(inner.timers.len(), timers.len());
        assert!(Arc::ptr_eq(inner.timers.last().unwrap(), &timers[0]));
    }
}

#[test]
fn withdraw_removes_exactly_one_timer() {
    let wake = Port::new(1);
    let state = ModeState::new(RunLoopMode::Default, &wake);
    let a = TimerBuilder::new().delay(Duration::from_secs(1)).build(|_| {});
    let b = TimerBuilder::new().delay(Duration::from_secs(2)).build(|_| {});

    let mut inner = state.inner.lock();
    state.reposition_timer(&mut inner, &a, false);
    state.reposition_timer(&mut inner, &b, false);
    assert!(state.withdraw_timer(&mut inner, &a));
    assert!(!state.withdraw_timer(&mut inner, &a));
    assert_eq!(inner.timers.len(), 1);
    assert!(Arc::ptr_eq(&inner.timers[0], &b));
}
