//! Property tests for the per-function worker pool (spec §8, properties
//! 1-3: capacity bound, no slot leak, self-healing after eviction).
//! Grounded on the unit tests already living in `gateway::pool`, scaled up
//! to randomized operation sequences via `proptest`.

use std::time::Duration;

use faasd::driver::Worker;
use faasd::error::GatewayError;
use faasd::gateway::pool::PoolRegistry;

fn fresh_worker(id: usize) -> Worker {
    Worker {
        id: format!("worker-{id}"),
        name: format!("worker-{id}"),
        ip: "127.0.0.1".to_string(),
        port: 9000,
        created_ts: chrono::Utc::now(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Acquire,
    Release,
    Evict,
}

fn op_strategy() -> impl proptest::strategy::Strategy<Value = Op> {
    use proptest::prelude::*;
    prop_oneof![Just(Op::Acquire), Just(Op::Release), Just(Op::Evict)]
}

proptest::proptest! {
    /// Busy workers never exceed `max_capacity`: once every permit is held,
    /// the next acquire times out rather than handing out an over-limit
    /// worker; releasing or evicting always frees exactly one slot for the
    /// next caller. No operation ever leaks or double-frees a permit.
    #[test]
    fn pool_never_leaks_or_exceeds_capacity(
        max_capacity in 1usize..6,
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let registry = PoolRegistry::new();
            let pool = registry.get_or_create("echo", max_capacity).await;

            let mut held: Vec<Worker> = Vec::new();
            let mut next_id = 0usize;

            for op in ops {
                match op {
                    Op::Acquire => {
                        let was_saturated = held.len() == max_capacity;
                        let result = pool
                            .acquire(Duration::from_millis(5), |_name| {
                                let w = fresh_worker(next_id);
                                next_id += 1;
                                async move { Ok(w) }
                            })
                            .await;

                        if was_saturated {
                            proptest::prop_assert!(matches!(result, Err(GatewayError::AcquireTimeout(_))));
                        } else {
                            let worker = result.map_err(|e| {
                                proptest::test_runner::TestCaseError::fail(format!("unexpected acquire failure: {e}"))
                            })?;
                            held.push(worker);
                        }
                    }
                    Op::Release => {
                        if let Some(worker) = held.pop() {
                            pool.release(worker);
                        }
                    }
                    Op::Evict => {
                        if let Some(worker) = held.pop() {
                            pool.evict(&worker);
                        }
                    }
                }

                proptest::prop_assert!(held.len() <= max_capacity);
            }

            Ok(())
        })?;
    }

    /// After an eviction, a subsequent acquire must provision a fresh worker
    /// rather than seeing a phantom idle entry — self-healing (spec §4.4.4
    /// step 4: evict on transport failure, next caller gets a clean worker).
    #[test]
    fn evicted_worker_is_never_handed_out_again(max_capacity in 1usize..4) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let registry = PoolRegistry::new();
            let pool = registry.get_or_create("echo", max_capacity).await;

            let w1 = pool
                .acquire(Duration::from_millis(50), |_name| async { Ok(fresh_worker(1)) })
                .await
                .unwrap();
            let evicted_id = w1.id.clone();
            pool.evict(&w1);

            let w2 = pool
                .acquire(Duration::from_millis(50), |_name| async { Ok(fresh_worker(2)) })
                .await
                .unwrap();

            proptest::prop_assert_ne!(w2.id, evicted_id);
            Ok(())
        })?;
    }
}
