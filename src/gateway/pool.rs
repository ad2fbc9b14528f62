//! Per-Function Worker Pool — the core algorithm (spec §4.4.3)
//!
//! Each function owns a pool of at most `max_capacity` workers, lazily
//! created on first use under a per-function mutex (double-checked
//! locking), grounded on the teacher's `server/manager.rs` (a
//! `DashMap`-keyed registry of lazily-initialised entries) and
//! `system/locker.rs` (the mutex itself).
//!
//! The capacity bound is a `tokio::sync::Semaphore`; permits are taken with
//! `forget()` on acquire and handed back explicitly by `release`/`evict` so
//! the slot's lifetime matches "worker is credited to this pool", not the
//! lifetime of any one async stack frame.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::driver::Worker;
use crate::error::{GatewayError, GatewayResult};
use crate::system::Locker;

pub struct Pool {
    function_name: String,
    max_capacity: usize,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<Worker>>,
    ledger: Mutex<HashMap<String, Worker>>,
}

impl Pool {
    fn new(function_name: String, max_capacity: usize) -> Self {
        Self {
            function_name,
            max_capacity,
            semaphore: Arc::new(Semaphore::new(max_capacity)),
            idle: Mutex::new(VecDeque::new()),
            ledger: Mutex::new(HashMap::new()),
        }
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// 1. wait on the capacity semaphore with timeout; 2. try idle dequeue;
    /// 3. otherwise call `provision` and enroll the result in the ledger.
    /// On any error path the semaphore slot is released exactly once (spec
    /// §4.4.3 "no operation ever leaks a semaphore slot").
    pub async fn acquire<F, Fut>(
        &self,
        acquire_timeout: Duration,
        provision: F,
    ) -> GatewayResult<Worker>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = GatewayResult<Worker>>,
    {
        let permit = tokio::time::timeout(acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| GatewayError::AcquireTimeout(acquire_timeout))?
            .expect("pool semaphore is never closed");
        // Slot is now consumed; release()/evict() hand it back explicitly.
        permit.forget();

        if let Some(worker) = self.idle.lock().pop_front() {
            return Ok(worker);
        }

        match provision(self.function_name.clone()).await {
            Ok(worker) => {
                self.ledger.lock().insert(worker.id.clone(), worker.clone());
                Ok(worker)
            }
            Err(e) => {
                self.semaphore.add_permits(1);
                Err(e)
            }
        }
    }

    /// Enqueue into the idle queue; release the semaphore slot. The worker
    /// stays in the ledger.
    pub fn release(&self, worker: Worker) {
        self.idle.lock().push_back(worker);
        self.semaphore.add_permits(1);
    }

    /// Remove from the ledger; release the semaphore slot without
    /// re-queuing. A subsequent acquirer sees no idle worker and provisions
    /// a fresh one — the self-healing step after a transport failure.
    pub fn evict(&self, worker: &Worker) {
        self.ledger.lock().remove(&worker.id);
        self.semaphore.add_permits(1);
    }

    /// Every worker currently credited to the pool, busy or idle. Used by
    /// the heartbeat janitor.
    pub fn all_names(&self) -> Vec<String> {
        self.ledger.lock().values().map(|w| w.name.clone()).collect()
    }

    #[cfg(test)]
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().len()
    }

    #[cfg(test)]
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Registry of one [`Pool`] per function, lazily created under a per-name
/// mutex (double-checked).
pub struct PoolRegistry {
    pools: DashMap<String, Arc<Pool>>,
    creation_lockers: DashMap<String, Arc<Locker>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            creation_lockers: DashMap::new(),
        }
    }

    pub async fn get_or_create(&self, function_name: &str, max_capacity: usize) -> Arc<Pool> {
        if let Some(pool) = self.pools.get(function_name) {
            return pool.clone();
        }

        let locker = self
            .creation_lockers
            .entry(function_name.to_string())
            .or_insert_with(|| Arc::new(Locker::new()))
            .clone();

        let _guard = locker.acquire().await.expect("creation locker is never cancelled");

        // Double-checked: another task may have created it while we waited.
        if let Some(pool) = self.pools.get(function_name) {
            return pool.clone();
        }

        let pool = Arc::new(Pool::new(function_name.to_string(), max_capacity));
        self.pools.insert(function_name.to_string(), pool.clone());
        pool
    }

    /// `function_name -> [worker_name...]` across every pool with at least
    /// one credited worker (spec §4.4.5).
    pub fn all_names_by_function(&self) -> HashMap<String, Vec<String>> {
        self.pools
            .iter()
            .filter_map(|entry| {
                let names = entry.value().all_names();
                if names.is_empty() {
                    None
                } else {
                    Some((entry.key().clone(), names))
                }
            })
            .collect()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn worker(id: &str) -> Worker {
        Worker {
            id: id.to_string(),
            name: format!("worker-{id}"),
            ip: "127.0.0.1".to_string(),
            port: 8081,
            created_ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn acquire_provisions_then_reuses_released_worker() {
        let pool = Pool::new("echo".to_string(), 1);

        let w1 = pool
            .acquire(Duration::from_secs(1), |_name| async { Ok(worker("a")) })
            .await
            .unwrap();
        assert_eq!(pool.ledger_len(), 1);
        assert_eq!(pool.available_permits(), 0);

        pool.release(w1.clone());
        assert_eq!(pool.idle_len(), 1);
        assert_eq!(pool.available_permits(), 1);

        let w2 = pool
            .acquire(Duration::from_secs(1), |_name| async {
                panic!("should not provision: an idle worker is available")
            })
            .await
            .unwrap();
        assert_eq!(w2.id, w1.id);
        assert_eq!(pool.idle_len(), 0);
    }

    #[tokio::test]
    async fn acquire_times_out_when_saturated() {
        let pool = Pool::new("echo".to_string(), 1);
        let _w1 = pool
            .acquire(Duration::from_secs(1), |_name| async { Ok(worker("a")) })
            .await
            .unwrap();

        let result = pool
            .acquire(Duration::from_millis(20), |_name| async { Ok(worker("b")) })
            .await;
        assert!(matches!(result, Err(GatewayError::AcquireTimeout(_))));
    }

    #[tokio::test]
    async fn evict_frees_slot_without_requeue() {
        let pool = Pool::new("echo".to_string(), 1);
        let w1 = pool
            .acquire(Duration::from_secs(1), |_name| async { Ok(worker("a")) })
            .await
            .unwrap();

        pool.evict(&w1);
        assert_eq!(pool.ledger_len(), 0);
        assert_eq!(pool.idle_len(), 0);
        assert_eq!(pool.available_permits(), 1);

        let w2 = pool
            .acquire(Duration::from_secs(1), |_name| async { Ok(worker("b")) })
            .await
            .unwrap();
        assert_eq!(w2.id, "b");
    }

    #[tokio::test]
    async fn provision_failure_releases_the_slot() {
        let pool = Pool::new("echo".to_string(), 1);
        let result = pool
            .acquire(Duration::from_secs(1), |_name| async {
                Err(GatewayError::Internal("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(pool.available_permits(), 1);
        assert_eq!(pool.ledger_len(), 0);
    }
}
