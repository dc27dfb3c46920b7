//! Chained Manager Tests
//!
//! Two stores, two keys, one unit of work.

use crate::common::*;
use std::sync::Arc;
use txscope::ChainedManager;

struct Pair {
    orders: MemoryStore,
    billing: MemoryStore,
    orders_key: ContextKey,
    billing_key: ContextKey,
    chain: ChainedManager,
}

fn pair() -> Pair {
    init_tracing();
    let (orders, billing) = (MemoryStore::new(), MemoryStore::new());
    let (orders_key, billing_key) = (ContextKey::new(), ContextKey::new());
    let chain = ChainedManager::new(vec![
        Arc::new(
            Manager::builder(MemoryFactory::new(orders.clone()))
                .ctx_key(orders_key)
                .build(),
        ),
        Arc::new(
            Manager::builder(MemoryFactory::new(billing.clone()))
                .ctx_key(billing_key)
                .build(),
        ),
    ]);
    Pair {
        orders,
        billing,
        orders_key,
        billing_key,
        chain,
    }
}

#[test]
fn chain_commits_both_resources() {
    let p = pair();
    p.chain
        .run(&Context::background(), |scope| {
            session_from_key(scope, p.orders_key).unwrap().insert("order:1", "open")?;
            session_from_key(scope, p.billing_key).unwrap().insert("invoice:1", "due")?;
            let billing = current_transaction_by_key(scope, p.billing_key).unwrap();
            assert_eq!(billing.key(), p.billing_key);
            assert_eq!(billing.depth(), 0);
            assert!(current_transaction(scope).is_none());
            Ok::<_, MemoryError>(())
        })
        .unwrap();

    assert!(p.orders.contains("order:1"));
    assert!(p.billing.contains("invoice:1"));
}

#[test]
fn chain_rolls_back_both_on_work_error() {
    let p = pair();
    let err = p
        .chain
        .run(&Context::background(), |scope| {
            session_from_key(scope, p.orders_key).unwrap().insert("order:1", "open")?;
            session_from_key(scope, p.billing_key).unwrap().insert("invoice:1", "due")?;
            Err::<(), BoxError>(Box::new(TestError("card declined")))
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RolledBack);
    assert!(err.contains::<TestError>());
    assert!(p.orders.is_empty());
    assert!(p.billing.is_empty());
    assert_eq!(p.orders.stats().aborted, 1);
    assert_eq!(p.billing.stats().aborted, 1);
}

#[test]
fn inner_commit_failure_rolls_back_outer() {
    let p = pair();
    p.billing.fail_next_commit();
    let err = p
        .chain
        .run(&Context::background(), |scope| {
            session_from_key(scope, p.orders_key).unwrap().insert("order:1", "open")?;
            session_from_key(scope, p.billing_key).unwrap().insert("invoice:1", "due")
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RolledBack);
    assert!(err.is(ErrorKind::CommitFailure));
    assert!(p.orders.is_empty());
    assert!(p.billing.is_empty());
}

#[test]
fn outer_commit_failure_does_not_undo_inner() {
    let p = pair();
    p.orders.fail_next_commit();
    let err = p
        .chain
        .run(&Context::background(), |scope| {
            session_from_key(scope, p.orders_key).unwrap().insert("order:1", "open")?;
            session_from_key(scope, p.billing_key).unwrap().insert("invoice:1", "due")
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommitFailure);
    assert!(p.orders.is_empty());
    assert!(p.billing.contains("invoice:1"));
}
