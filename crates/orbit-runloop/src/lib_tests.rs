use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;

#[test]
fn public_surface_round_trip() {
    let run_loop = RunLoop::current();
    let counter = Arc::new(AtomicUsize::new(0));
    let source = {
        let counter = Arc::clone(&counter);
        RunLoopSource::custom(0, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    };
    run_loop.add_source(&source, RunLoopMode::Default);
    source.signal();
    run_loop.wake_up();

    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(1), true),
        RunLoopRunResult::HandledSource
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    run_loop.remove_source(&source, RunLoopMode::Default);
}

#[test]
fn mode_vocabulary_serializes() {
    let json = serde_json::to_string(&RunLoopMode::Custom("io".into())).unwrap();
    let back: RunLoopMode = serde_json::from_str(&json).unwrap();
    assert_eq!(back, RunLoopMode::named("io"));

    let result = serde_json::to_value(RunLoopRunResult::TimedOut).unwrap();
    assert_eq!(result, serde_json::json!("TimedOut"));
}
