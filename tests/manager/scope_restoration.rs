//! Scope Restoration Tests
//!
//! Whatever a `run` call does, the caller's context keeps showing the
//! transaction it showed before, and no owned transaction is left open.

use crate::common::*;
use proptest::prelude::*;

fn run_chain(env: &TestEnv, ctx: &Context, modes: &[Propagation], fail_at: usize) -> Result<(), Error> {
    let Some((mode, rest)) = modes.split_first() else {
        return if fail_at == 0 {
            Err(Error::Work(Box::new(TestError("innermost"))))
        } else {
            Ok(())
        };
    };

    let before = current_id(ctx);
    let result = env.manager.run_with(ctx, &settings(*mode), |scope| {
        run_chain(env, scope, rest, fail_at.saturating_sub(1))
    });
    assert_eq!(current_id(ctx), before, "scope leaked after {}", mode);
    result
}

#[test]
fn every_mode_restores_empty_context() {
    let env = TestEnv::new();
    let ctx = Context::background();
    for mode in Propagation::ALL {
        let _ = env
            .manager
            .run_with(&ctx, &settings(mode), |_| Ok::<_, TestError>(()));
        assert!(current_transaction(&ctx).is_none(), "{}", mode);
    }
}

#[test]
fn every_mode_restores_outer_transaction() {
    let env = TestEnv::new();
    within_transaction(&env, |outer| {
        let outer_handle = current_transaction(outer).unwrap();
        for mode in Propagation::ALL {
            let _ = env
                .manager
                .run_with(outer, &settings(mode), |_| Ok::<_, TestError>(()));
            assert!(current_transaction(outer).unwrap().same_as(&outer_handle), "{}", mode);
            assert!(outer_handle.is_active(), "{}", mode);
        }
    });
}

#[test]
fn owned_transaction_inactive_after_success_and_failure() {
    let env = TestEnv::new();
    let mut seen = Vec::new();
    env.manager
        .run(&Context::background(), |scope| {
            let handle = current_transaction(scope).unwrap();
            assert!(handle.is_active());
            seen.push(handle);
            Ok::<_, TestError>(())
        })
        .unwrap();
    let _ = env.manager.run(&Context::background(), |scope| {
        seen.push(current_transaction(scope).unwrap());
        Err::<(), _>(TestError("fail"))
    });

    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|h| !h.is_active()));
}

#[test]
fn sibling_scopes_do_not_see_each_other() {
    let env = TestEnv::new();
    let root = Context::background();
    let mut ids = Vec::new();
    for _ in 0..2 {
        env.manager
            .run(&root, |scope| {
                ids.push(current_id(scope).unwrap());
                Ok::<_, TestError>(())
            })
            .unwrap();
    }
    assert_ne!(ids[0], ids[1]);
}

fn any_mode() -> impl Strategy<Value = Propagation> {
    prop::sample::select(Propagation::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn nested_chains_restore_scope_and_close_sessions(
        modes in prop::collection::vec(any_mode(), 1..6),
        fail_at in 0usize..8,
    ) {
        let env = TestEnv::new();
        let ctx = Context::background();
        let _ = run_chain(&env, &ctx, &modes, fail_at);

        prop_assert!(current_transaction(&ctx).is_none());
        let stats = env.store.stats();
        prop_assert_eq!(stats.begun, stats.committed + stats.aborted);
        prop_assert_eq!(env.manager.metrics().active, 0);
    }
}
