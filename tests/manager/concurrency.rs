//! Concurrency Tests
//!
//! One manager shared by many threads. Each thread's context carries its own
//! transaction; nothing is thread-local.

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

#[test]
fn threads_commit_independently() {
    let env = TestEnv::new();

    thread::scope(|s| {
        for t in 0..THREADS {
            let manager = &env.manager;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    manager
                        .run(&Context::background(), |scope| {
                            session_from(scope)
                                .unwrap()
                                .insert(format!("t{}:k{}", t, i), "v")
                        })
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(env.store.len(), THREADS * PER_THREAD);
    let metrics = env.manager.metrics();
    assert_eq!(metrics.committed, (THREADS * PER_THREAD) as u64);
    assert_eq!(metrics.active, 0);
}

#[test]
fn contexts_do_not_leak_between_threads() {
    let env = TestEnv::new();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            let (manager, barrier) = (&env.manager, &barrier);
            s.spawn(move || {
                manager
                    .run(&Context::background(), |scope| {
                        let mine = current_id(scope).unwrap();
                        barrier.wait();
                        // everyone is inside a transaction now
                        assert!(current_transaction(&Context::background()).is_none());
                        assert_eq!(current_id(scope), Some(mine));
                        Ok::<_, TestError>(())
                    })
                    .unwrap();
            });
        }
    });

    assert_eq!(env.store.stats().begun, THREADS as u64);
}

#[test]
fn competing_inserts_commit_exactly_once() {
    let env = TestEnv::new();
    let barrier = Barrier::new(THREADS);
    let won = AtomicUsize::new(0);
    let lost = AtomicUsize::new(0);

    thread::scope(|s| {
        for t in 0..THREADS {
            let (manager, barrier, won, lost) = (&env.manager, &barrier, &won, &lost);
            s.spawn(move || {
                let result = manager.run(&Context::background(), |scope| {
                    session_from(scope).unwrap().insert("leader", format!("t{}", t))?;
                    barrier.wait();
                    Ok::<_, MemoryError>(())
                });
                match result {
                    Ok(()) => won.fetch_add(1, Ordering::SeqCst),
                    Err(e) => {
                        assert_eq!(e.kind(), ErrorKind::CommitFailure);
                        assert!(matches!(
                            e.find::<MemoryError>(),
                            Some(MemoryError::DuplicateKey(_))
                        ));
                        lost.fetch_add(1, Ordering::SeqCst)
                    }
                };
            });
        }
    });

    assert_eq!(won.load(Ordering::SeqCst), 1);
    assert_eq!(lost.load(Ordering::SeqCst), THREADS - 1);
    assert_eq!(env.store.len(), 1);
}

#[test]
fn shared_manager_via_arc() {
    let env = TestEnv::new();
    let manager = Arc::new(env.manager);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager.run(&Context::background(), |scope| {
                    session_from(scope).unwrap().put(format!("k{}", t), "v")
                })
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert_eq!(env.store.len(), 4);
}
