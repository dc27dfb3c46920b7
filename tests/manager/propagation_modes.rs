//! Propagation Mode Tests
//!
//! One section per mode, each with and without an outer transaction.

use crate::common::*;

// ============================================================================
// Required
// ============================================================================

#[test]
fn required_without_existing_begins_and_commits() {
    let env = TestEnv::new();
    env.manager
        .run(&Context::background(), |scope| {
            session_from(scope).unwrap().put("k", "v")?;
            Ok::<_, MemoryError>(())
        })
        .unwrap();

    assert_eq!(env.store.get("k").as_deref(), Some("v"));
    assert_eq!(env.store.stats().committed, 1);
    assert_eq!(env.event_kinds(), vec![EventKind::Begin, EventKind::Commit]);
}

#[test]
fn required_joins_same_instance_and_only_outermost_finalizes() {
    let env = TestEnv::new();
    env.manager
        .run(&Context::background(), |outer| {
            let outer_handle = current_transaction(outer).unwrap();
            env.manager.run(outer, |inner| {
                let inner_handle = current_transaction(inner).unwrap();
                assert!(inner_handle.same_as(&outer_handle));
                session_from(inner).unwrap().put("joined", "1")?;
                Ok::<_, MemoryError>(())
            })?;
            assert!(outer_handle.is_active());
            assert!(env.store.is_empty());
            Ok::<_, Error>(())
        })
        .unwrap();

    assert!(env.store.contains("joined"));
    assert_eq!(env.store.stats().begun, 1);
    assert_eq!(env.manager.metrics().joined, 1);
}

#[test]
fn required_joined_error_is_returned_unchanged() {
    let env = TestEnv::new();
    let err = env
        .manager
        .run(&Context::background(), |outer| {
            let inner = env
                .manager
                .run(outer, |_| Err::<(), _>(TestError("inner")))
                .unwrap_err();
            assert_eq!(inner.kind(), ErrorKind::Work);
            assert_eq!(inner.find::<TestError>(), Some(&TestError("inner")));
            Err::<(), _>(inner)
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RolledBack);
    assert!(err.contains::<TestError>());
    assert_eq!(env.store.stats().aborted, 1);
}

// ============================================================================
// RequiresNew
// ============================================================================

#[test]
fn requires_new_shadows_outer_and_commits_independently() {
    let env = TestEnv::new();
    let _ = env.manager.run(&Context::background(), |outer| {
        let outer_handle = current_transaction(outer).unwrap();
        env.manager
            .run_with(outer, &settings(Propagation::RequiresNew), |inner| {
                let inner_handle = current_transaction(inner).unwrap();
                assert!(!inner_handle.same_as(&outer_handle));
                assert!(!inner_handle.is_nested());
                session_from(inner).unwrap().put("independent", "1")?;
                Ok::<_, MemoryError>(())
            })
            .unwrap();
        assert!(outer_handle.is_active());
        assert!(current_transaction(outer).unwrap().same_as(&outer_handle));
        Err::<(), _>(TestError("outer fails"))
    });

    assert!(env.store.contains("independent"));
    let stats = env.store.stats();
    assert_eq!((stats.begun, stats.committed, stats.aborted), (2, 1, 1));
}

// ============================================================================
// Nested
// ============================================================================

#[test]
fn nested_without_existing_begins_root() {
    let env = TestEnv::with_propagation(Propagation::Nested);
    env.manager
        .run(&Context::background(), |scope| {
            let handle = current_transaction(scope).unwrap();
            assert!(!handle.is_nested());
            assert_eq!(
                handle.downcast_ref::<MemoryTransaction>().unwrap().nesting(),
                NestingKind::Root
            );
            Ok::<_, TestError>(())
        })
        .unwrap();
}

#[test]
fn nested_rollback_uses_savepoint() {
    let env = TestEnv::with_propagation(Propagation::Nested);
    env.manager
        .run(&Context::background(), |outer| {
            session_from(outer).unwrap().put("outer", "1")?;
            let err = env
                .manager
                .run(outer, |inner| {
                    let handle = current_transaction(inner).unwrap();
                    assert_eq!(handle.depth(), 1);
                    session_from(inner).unwrap().put("inner", "2")?;
                    Err::<(), BoxError>(Box::new(TestError("undo inner")))
                })
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RolledBack);
            Ok::<_, BoxError>(())
        })
        .unwrap();

    assert!(env.store.contains("outer"));
    assert!(!env.store.contains("inner"));
    assert_eq!(env.store.stats().committed, 1);
}

#[test]
fn nested_commit_keeps_writes_for_parent() {
    let env = TestEnv::with_propagation(Propagation::Nested);
    env.manager
        .run(&Context::background(), |outer| {
            env.manager.run(outer, |inner| {
                session_from(inner).unwrap().put("inner", "2")?;
                Ok::<_, MemoryError>(())
            })?;
            assert!(env.store.is_empty());
            Ok::<_, Error>(())
        })
        .unwrap();

    assert!(env.store.contains("inner"));
    assert_eq!(
        env.events.lock().clone(),
        vec![
            (EventKind::Begin, 0),
            (EventKind::Begin, 1),
            (EventKind::Commit, 1),
            (EventKind::Commit, 0),
        ]
    );
}

// ============================================================================
// Mandatory
// ============================================================================

#[test]
fn mandatory_without_existing_fails_before_work() {
    let env = TestEnv::with_propagation(Propagation::Mandatory);
    let mut called = false;
    let err = env
        .manager
        .run(&Context::background(), |_| {
            called = true;
            Ok::<_, TestError>(())
        })
        .unwrap_err();

    assert!(!called);
    assert_eq!(err.kind(), ErrorKind::PropagationViolation);
    assert_eq!(env.store.stats().begun, 0);
}

#[test]
fn mandatory_with_existing_joins() {
    let env = TestEnv::new();
    within_transaction(&env, |outer| {
        let outer_handle = current_transaction(outer).unwrap();
        env.manager
            .run_with(outer, &settings(Propagation::Mandatory), |inner| {
                assert!(current_transaction(inner).unwrap().same_as(&outer_handle));
                Ok::<_, TestError>(())
            })
            .unwrap();
    });
    assert_eq!(env.store.stats().begun, 1);
}

// ============================================================================
// Never
// ============================================================================

#[test]
fn never_without_existing_runs_bare() {
    let env = TestEnv::with_propagation(Propagation::Never);
    let out = env
        .manager
        .run(&Context::background(), |scope| {
            assert!(current_transaction(scope).is_none());
            Ok::<_, TestError>(5)
        })
        .unwrap();
    assert_eq!(out, 5);
    assert_eq!(env.store.stats().begun, 0);
}

#[test]
fn never_with_existing_fails() {
    let env = TestEnv::new();
    within_transaction(&env, |outer| {
        let err = env
            .manager
            .run_with(outer, &settings(Propagation::Never), |_| Ok::<_, TestError>(()))
            .unwrap_err();
        match err {
            Error::PropagationViolation {
                propagation,
                existing,
            } => {
                assert_eq!(propagation, Propagation::Never);
                assert!(existing);
            }
            other => panic!("unexpected {:?}", other),
        }
    });
}

// ============================================================================
// NotSupported
// ============================================================================

#[test]
fn not_supported_hides_existing_without_finalizing_it() {
    let env = TestEnv::new();
    within_transaction(&env, |outer| {
        let outer_handle = current_transaction(outer).unwrap();
        let err = env
            .manager
            .run_with(outer, &settings(Propagation::NotSupported), |inner| {
                assert!(current_transaction(inner).is_none());
                assert!(session_from(inner).is_none());
                Err::<(), _>(TestError("bare failure"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Work);
        assert!(outer_handle.is_active());
    });
    assert_eq!(env.store.stats().committed, 1);
}

// ============================================================================
// Supports
// ============================================================================

#[test]
fn supports_joins_or_runs_bare() {
    let env = TestEnv::with_propagation(Propagation::Supports);
    env.manager
        .run(&Context::background(), |scope| {
            assert!(current_transaction(scope).is_none());
            Ok::<_, TestError>(())
        })
        .unwrap();
    assert_eq!(env.store.stats().begun, 0);

    within_transaction(&env, |outer| {
        let outer_handle = current_transaction(outer).unwrap();
        env.manager
            .run(outer, |inner| {
                assert!(current_transaction(inner).unwrap().same_as(&outer_handle));
                Ok::<_, TestError>(())
            })
            .unwrap();
    });
    let metrics = env.manager.metrics();
    assert_eq!(metrics.suppressed, 1);
    assert_eq!(metrics.joined, 1);
}
