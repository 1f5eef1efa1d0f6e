use std::sync::Arc;
use std::thread;

use super::*;

#[test]
fn current_is_stable_per_thread() {
    let first = current();
    let second = current();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn each_thread_gets_its_own_loop() {
    // pin the main loop first so neither thread below can claim it
    let _ = main();
    let mine = current();
    let theirs = thread::spawn(current).join().unwrap();
    assert!(!Arc::ptr_eq(&mine, &theirs));
}

#[test]
fn main_is_stable_across_threads() {
    let a = main();
    let b = thread::spawn(main).join().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(is_main(&a));
}

#[test]
fn worker_loops_are_not_main() {
    let _ = main();
    let worker = thread::spawn(current).join().unwrap();
    assert!(!is_main(&worker));
}
