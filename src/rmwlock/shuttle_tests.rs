//! Shuttle schedule-exploration tests for the real lock.
//!
//! With `--features shuttle` the sync facade backs [`RmwLock`] with
//! `shuttle::sync` primitives, so these tests explore randomized schedules
//! of the actual queueing, coalescing, and upgrade code.
//!
//! Run with: `cargo test --features shuttle --lib`
//!
//! [`RmwLock`]: super::RmwLock

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use shuttle::thread;

use super::RmwLock;

const ITERATIONS: usize = 2000;

/// Writers are mutually exclusive: a held-counter mutated only under WRITE
/// never observes a second holder.
#[test]
fn writers_are_exclusive() {
    shuttle::check_random(
        || {
            let lock = Arc::new(RmwLock::new());
            let inside = Arc::new(AtomicU32::new(0));

            let workers: Vec<_> = (0..3)
                .map(|_| {
                    let lock = Arc::clone(&lock);
                    let inside = Arc::clone(&inside);
                    thread::spawn(move || {
                        lock.lock_write();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.unlock_exclusive();
                    })
                })
                .collect();

            for w in workers {
                w.join().unwrap();
            }
        },
        ITERATIONS,
    );
}

/// A writer never overlaps a reader, while readers may overlap each other.
#[test]
fn writer_excludes_readers() {
    shuttle::check_random(
        || {
            let lock = Arc::new(RmwLock::new());
            let readers_inside = Arc::new(AtomicU32::new(0));

            let l_w = Arc::clone(&lock);
            let r_w = Arc::clone(&readers_inside);
            let writer = thread::spawn(move || {
                l_w.lock_write();
                assert_eq!(r_w.load(Ordering::SeqCst), 0);
                l_w.unlock_exclusive();
            });

            let readers: Vec<_> = (0..2)
                .map(|_| {
                    let lock = Arc::clone(&lock);
                    let inside = Arc::clone(&readers_inside);
                    thread::spawn(move || {
                        lock.lock_read();
                        inside.fetch_add(1, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.unlock_shared();
                    })
                })
                .collect();

            writer.join().unwrap();
            for r in readers {
                r.join().unwrap();
            }
        },
        ITERATIONS,
    );
}

/// The upgrade path is exclusive by the time it returns, under every
/// schedule of a competing reader and writer.
#[test]
fn upgrade_is_exclusive() {
    shuttle::check_random(
        || {
            let lock = Arc::new(RmwLock::new());
            let inside = Arc::new(AtomicU32::new(0));

            let l_up = Arc::clone(&lock);
            let i_up = Arc::clone(&inside);
            let upgrader = thread::spawn(move || {
                l_up.lock_may_write();
                l_up.upgrade();
                assert_eq!(i_up.fetch_add(1, Ordering::SeqCst), 0);
                i_up.fetch_sub(1, Ordering::SeqCst);
                l_up.unlock_exclusive();
            });

            let l_r = Arc::clone(&lock);
            let reader = thread::spawn(move || {
                l_r.lock_read();
                l_r.unlock_shared();
            });

            let l_w = Arc::clone(&lock);
            let i_w = Arc::clone(&inside);
            let writer = thread::spawn(move || {
                l_w.lock_write();
                assert_eq!(i_w.fetch_add(1, Ordering::SeqCst), 0);
                i_w.fetch_sub(1, Ordering::SeqCst);
                l_w.unlock_exclusive();
            });

            upgrader.join().unwrap();
            reader.join().unwrap();
            writer.join().unwrap();
        },
        ITERATIONS,
    );
}

/// Two may-writers can never hold together; one always queues behind the
/// other, whatever the schedule.
#[test]
fn may_writers_are_mutually_exclusive() {
    shuttle::check_random(
        || {
            let lock = Arc::new(RmwLock::new());
            let inside = Arc::new(AtomicU32::new(0));

            let workers: Vec<_> = (0..2)
                .map(|_| {
                    let lock = Arc::clone(&lock);
                    let inside = Arc::clone(&inside);
                    thread::spawn(move || {
                        lock.lock_may_write();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.unlock_shared();
                    })
                })
                .collect();

            for w in workers {
                w.join().unwrap();
            }
        },
        ITERATIONS,
    );
}
