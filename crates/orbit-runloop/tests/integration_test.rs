//! Cross-thread end-to-end flows through the public API.
//!
//! Each Rust test runs on its own thread, so `RunLoop::current()`
//! hands every test an isolated loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use orbit_runloop::{
    Port, PortMessage, PortSet, PortWait, RunLoop, RunLoopMode, RunLoopObserver, RunLoopPhase,
    RunLoopRunResult, RunLoopSource, TimerBuilder,
};

#[test]
fn cross_thread_signal_and_wakeup_fires_the_source() {
    let run_loop = RunLoop::current();
    let counter = Arc::new(AtomicUsize::new(0));
    let source = {
        let counter = Arc::clone(&counter);
        RunLoopSource::custom(0, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    };
    run_loop.add_source(&source, RunLoopMode::Default);

    let signaler = {
        let run_loop = Arc::clone(&run_loop);
        let source = Arc::clone(&source);
        thread::spawn(move || {
            // wait until the loop is actually asleep
            while !run_loop.is_waiting() {
                thread::sleep(Duration::from_millis(1));
            }
            source.signal();
            run_loop.wake_up();
        })
    };

    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(5), true),
        RunLoopRunResult::HandledSource
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    signaler.join().unwrap();
}

#[test]
fn wakeup_without_work_returns_to_sleep_until_stopped() {
    let run_loop = RunLoop::current();
    let source = RunLoopSource::custom(0, || {});
    run_loop.add_source(&source, RunLoopMode::Default);

    let woken_at = Arc::new(parking_lot::Mutex::new(None::<Instant>));
    let observer = {
        let run_loop = Arc::clone(&run_loop);
        let woken_at = Arc::clone(&woken_at);
        RunLoopObserver::new(RunLoopPhase::AfterWaiting as u32, true, 0, move |_| {
            *woken_at.lock() = Some(Instant::now());
            run_loop.stop();
        })
    };
    run_loop.add_observer(&observer, RunLoopMode::Default);

    let waker = {
        let run_loop = Arc::clone(&run_loop);
        thread::spawn(move || {
            while !run_loop.is_waiting() {
                thread::sleep(Duration::from_millis(1));
            }
            let at = Instant::now();
            run_loop.wake_up();
            at
        })
    };

    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(10), false),
        RunLoopRunResult::Stopped
    );
    let sent_at = waker.join().unwrap();
    let woken = (*woken_at.lock()).expect("observer saw the wakeup");
    let latency = woken.saturating_duration_since(sent_at);
    assert!(latency < Duration::from_millis(500), "latency {latency:?}");
}

#[test]
fn port_backed_source_replies_to_the_sender() {
    let run_loop = RunLoop::current();
    let request_port = Port::new(8);
    let source = RunLoopSource::port_backed(0, request_port.clone(), |message| {
        let n = message.payload["n"].as_u64().unwrap_or(0);
        Ok(Some(PortMessage::new(json!({ "doubled": n * 2 }))))
    });
    run_loop.add_source(&source, RunLoopMode::Default);

    let reply_port = Port::new(1);
    let sender = {
        let run_loop = Arc::clone(&run_loop);
        let request_port = request_port.clone();
        let reply_port = reply_port.clone();
        thread::spawn(move || {
            while !run_loop.is_waiting() {
                thread::sleep(Duration::from_millis(1));
            }
            request_port
                .send(PortMessage::with_reply(json!({ "n": 21 }), reply_port))
                .unwrap();
        })
    };

    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(5), true),
        RunLoopRunResult::HandledSource
    );
    sender.join().unwrap();

    let replies = PortSet::new();
    replies.insert(&reply_port);
    match replies.wait(Some(Duration::from_secs(1))) {
        PortWait::Ready { message, .. } => {
            assert_eq!(message.payload, json!({ "doubled": 42 }));
        }
        PortWait::TimedOut => panic!("no reply delivered"),
    }
}

#[test]
fn run_drains_the_default_mode_until_stopped() {
    let run_loop = RunLoop::current();
    let fires = Arc::new(AtomicUsize::new(0));
    let timer = {
        let fires = Arc::clone(&fires);
        let run_loop = Arc::clone(&run_loop);
        TimerBuilder::new()
            .delay(Duration::from_millis(20))
            .interval(Duration::from_millis(20))
            .build(move |_| {
                if fires.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                    run_loop.stop();
                }
            })
    };
    run_loop.add_timer(&timer, RunLoopMode::Default);

    run_loop.run();
    assert_eq!(fires.load(Ordering::SeqCst), 5);
    // run() consumed the stop; the loop can run again
    timer.invalidate();
    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(1), false),
        RunLoopRunResult::Finished
    );
}

#[test]
fn timer_in_two_modes_fires_in_whichever_runs() {
    let run_loop = RunLoop::current();
    let fires = Arc::new(AtomicUsize::new(0));
    let timer = {
        let fires = Arc::clone(&fires);
        TimerBuilder::new()
            .delay(Duration::from_millis(30))
            .build(move |_| {
                fires.fetch_add(1, Ordering::SeqCst);
            })
    };
    run_loop.add_timer(&timer, RunLoopMode::Default);
    run_loop.add_timer(&timer, RunLoopMode::named("modal"));

    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::named("modal"), Duration::from_secs(2), false),
        RunLoopRunResult::Finished
    );
    assert_eq!(fires.load(Ordering::SeqCst), 1);
    // the one-shot invalidated itself out of the other mode too
    assert!(!run_loop.contains_timer(&timer, &RunLoopMode::Default));
}

#[test]
fn group_notify_stops_the_loop_when_workers_finish() {
    let run_loop = RunLoop::current();
    let fired = Arc::new(AtomicUsize::new(0));
    let source = {
        let fired = Arc::clone(&fired);
        RunLoopSource::custom(0, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };
    run_loop.add_source(&source, RunLoopMode::Default);

    let group = Arc::new(orbit_sync::Group::new());
    let mut workers = Vec::new();
    for _ in 0..3 {
        group.enter();
        let group = Arc::clone(&group);
        let run_loop = Arc::clone(&run_loop);
        let source = Arc::clone(&source);
        workers.push(thread::spawn(move || {
            source.signal();
            run_loop.wake_up();
            // leave only once the loop is inside an activation, so the
            // notify's stop() lands on a live run
            while !run_loop.is_waiting() {
                thread::sleep(Duration::from_millis(1));
            }
            group.leave();
        }));
    }
    {
        let run_loop = Arc::clone(&run_loop);
        group.notify(move || run_loop.stop());
    }

    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(10), false),
        RunLoopRunResult::Stopped
    );
    // signals coalesce, so three workers produce between one and three fires
    let fired = fired.load(Ordering::SeqCst);
    assert!((1..=3).contains(&fired), "fired {fired} times");
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn dispatch_queue_hook_drains_on_the_main_loop() {
    let run_loop = RunLoop::current();
    if !Arc::ptr_eq(&run_loop, &RunLoop::main()) {
        // another test thread claimed the main loop first; the hook is
        // only eligible there
        return;
    }
    let drained = Arc::new(AtomicUsize::new(0));
    let queue_port = Port::new(8);
    {
        let drained = Arc::clone(&drained);
        run_loop.set_dispatch_queue(queue_port.clone(), move |_| {
            drained.fetch_add(1, Ordering::SeqCst);
        });
    }
    queue_port.send(PortMessage::default()).unwrap();

    assert_eq!(
        run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(2), true),
        RunLoopRunResult::HandledSource
    );
    assert_eq!(drained.load(Ordering::SeqCst), 1);
}
