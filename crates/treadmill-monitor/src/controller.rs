//! The App-Monitor Controller: keeps each monitored app's instance count
//! at its configured target, subject to a per-monitor token bucket that
//! bounds how fast new instances can be created.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use treadmill_backend::namespace::path;
use treadmill_backend::{Backend, BackendError};

use crate::error::{MonitorError, MonitorResult};
use crate::instance_api::{CreateInstanceRequest, InstanceApi};

/// Wire shape of `/app-monitors/<name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMonitorRecord {
    pub count: u32,
}

/// Outcome of reevaluating a single monitor, returned for logging/tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Created(Vec<String>),
    Deleted(Vec<String>),
    NoChange,
}

/// Per-monitor token-bucket state.
///
/// `rate` and `cap` are derived from `count` and recomputed whenever the
/// monitor is (re)seeded — never adjusted incrementally.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TokenBucket {
    count: u32,
    available: f64,
    rate: f64,
    last_update: i64,
}

impl TokenBucket {
    /// Seed with full burst credit: `available = 2 * count`. Used both
    /// on first sight of a monitor and whenever its `count` changes —
    /// the original replaces the whole per-monitor state rather than
    /// scaling `available` proportionally, and this does the same.
    fn seeded(count: u32, now: i64) -> Self {
        let cap = 2.0 * count as f64;
        Self {
            count,
            available: cap,
            rate: cap / 3600.0,
            last_update: now,
        }
    }

    fn cap(&self) -> f64 {
        2.0 * self.count as f64
    }

    fn refill(&mut self, now: i64) {
        let elapsed = (now - self.last_update).max(0) as f64;
        self.available = (self.available + self.rate * elapsed).min(self.cap());
        self.last_update = now;
    }
}

/// Drives reevaluation of every configured app monitor.
pub struct AppMonitorController<A: InstanceApi> {
    backend: Arc<dyn Backend>,
    instance_api: A,
    buckets: HashMap<String, TokenBucket>,
}

impl<A: InstanceApi> AppMonitorController<A> {
    pub fn new(backend: Arc<dyn Backend>, instance_api: A) -> Self {
        Self {
            backend,
            instance_api,
            buckets: HashMap::new(),
        }
    }

    /// Bring the in-memory monitor table in line with `/app-monitors`:
    /// drop monitors whose node disappeared, seed newly observed ones,
    /// and fully reseed any whose `count` changed.
    pub fn reconcile_monitors(&mut self, now: i64) -> MonitorResult<()> {
        let current = self.backend.list(path::appmonitors_root())?;
        let current: std::collections::HashSet<&str> =
            current.iter().map(String::as_str).collect();

        self.buckets.retain(|name, _| current.contains(name.as_str()));

        for name in &current {
            match self.read_record(name) {
                Ok(Some(record)) => match self.buckets.get(*name) {
                    Some(bucket) if bucket.count == record.count => {}
                    Some(_) => {
                        debug!(monitor = name, count = record.count, "reconfigured, resetting bucket");
                        self.buckets.insert((*name).to_string(), TokenBucket::seeded(record.count, now));
                    }
                    None => {
                        debug!(monitor = name, count = record.count, "new monitor, seeding bucket");
                        self.buckets.insert((*name).to_string(), TokenBucket::seeded(record.count, now));
                    }
                },
                Ok(None) => {
                    warn!(monitor = name, "monitor node has no configuration, skipping");
                }
                Err(MonitorError::ConfigInvalid(msg)) => {
                    warn!(monitor = name, error = %msg, "invalid monitor manifest, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn read_record(&self, name: &str) -> MonitorResult<Option<AppMonitorRecord>> {
        match self.backend.get(&path::appmonitor(name)) {
            Ok(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| MonitorError::ConfigInvalid(format!("{name}: {e}"))),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Run one reevaluation tick over every known monitor.
    ///
    /// Per-monitor `ConfigInvalid`/`InstanceApi` failures are logged and
    /// skipped; a `Backend` error (store connectivity) is propagated so
    /// the caller can give up leadership, per the error-handling policy.
    pub fn reevaluate_all(&mut self, now: i64) -> MonitorResult<Vec<(String, MonitorOutcome)>> {
        let names: Vec<String> = self.buckets.keys().cloned().collect();
        let mut outcomes = Vec::with_capacity(names.len());

        for name in names {
            match self.reevaluate_one(&name, now) {
                Ok(outcome) => outcomes.push((name, outcome)),
                Err(MonitorError::Backend(e)) => return Err(MonitorError::Backend(e)),
                Err(e) => {
                    warn!(monitor = %name, error = %e, "monitor reevaluation failed, continuing");
                }
            }
        }
        Ok(outcomes)
    }

    fn reevaluate_one(&mut self, name: &str, now: i64) -> MonitorResult<MonitorOutcome> {
        let bucket = self
            .buckets
            .get_mut(name)
            .expect("reevaluate_one called for an unknown monitor");
        bucket.refill(now);
        let target = bucket.count as i64;

        let current = self.instance_api.list(name)?;
        let current_count = current.len() as i64;
        let delta = target - current_count;

        if delta > 0 {
            let bucket = self.buckets.get_mut(name).unwrap();
            let allowed = delta.min(bucket.available.floor() as i64).max(0);
            if allowed < 1 {
                return Ok(MonitorOutcome::NoChange);
            }
            let request = CreateInstanceRequest::new(name, serde_json::json!({}), allowed as u32, "monitor")
                .map_err(|e| MonitorError::ConfigInvalid(e.to_string()))?;
            let created = self.instance_api.create(&request)?;
            bucket.available -= allowed as f64;
            info!(monitor = name, count = created.len(), "created instances");
            Ok(MonitorOutcome::Created(created))
        } else if delta < 0 {
            let mut sorted = current;
            sorted.sort();
            let to_delete = (-delta) as usize;
            let victims: Vec<String> = sorted.into_iter().take(to_delete).collect();
            self.instance_api.bulk_delete(&victims, "monitor")?;
            info!(monitor = name, count = victims.len(), "deleted instances");
            Ok(MonitorOutcome::Deleted(victims))
        } else {
            Ok(MonitorOutcome::NoChange)
        }
    }

    /// Run the controller loop: reconcile, reevaluate, sleep ~1s, repeat.
    pub async fn run(
        &mut self,
        tick_interval: std::time::Duration,
        now_fn: impl Fn() -> i64,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> MonitorResult<()> {
        info!(interval_secs = tick_interval.as_secs(), "app-monitor controller started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick_interval) => {
                    let now = now_fn();
                    self.reconcile_monitors(now)?;
                    self.reevaluate_all(now)?;
                }
                _ = shutdown.changed() => {
                    info!("app-monitor controller shutting down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance_api::InMemoryInstanceApi;
    use treadmill_backend::store::RedbBackend;

    fn seed_monitor(backend: &RedbBackend, name: &str, count: u32) {
        backend.put(&path::appmonitor(name), serde_json::json!({ "count": count })).unwrap();
    }

    #[test]
    fn new_monitor_seeds_full_burst_credit() {
        let backend = Arc::new(RedbBackend::open_in_memory().unwrap());
        seed_monitor(&backend, "proid.app", 5);
        let mut controller = AppMonitorController::new(backend, InMemoryInstanceApi::new());

        controller.reconcile_monitors(1000).unwrap();
        let bucket = controller.buckets.get("proid.app").unwrap();
        assert_eq!(bucket.available, 10.0);
        assert_eq!(bucket.cap(), 10.0);
    }

    #[test]
    fn reconfigure_resets_rather_than_scales() {
        let backend = Arc::new(RedbBackend::open_in_memory().unwrap());
        seed_monitor(&backend, "proid.app", 5);
        let mut controller = AppMonitorController::new(backend.clone(), InMemoryInstanceApi::new());
        controller.reconcile_monitors(1000).unwrap();

        // Burn some tokens, then reconfigure to a larger count.
        controller.buckets.get_mut("proid.app").unwrap().available = 1.0;
        seed_monitor(&backend, "proid.app", 20);
        controller.reconcile_monitors(1001).unwrap();

        let bucket = controller.buckets.get("proid.app").unwrap();
        assert_eq!(bucket.available, 40.0, "reconfigure must grant full burst credit, not scale the old value");
    }

    #[test]
    fn monitor_dropped_when_node_disappears() {
        let backend = Arc::new(RedbBackend::open_in_memory().unwrap());
        seed_monitor(&backend, "proid.app", 5);
        let mut controller = AppMonitorController::new(backend.clone(), InMemoryInstanceApi::new());
        controller.reconcile_monitors(1000).unwrap();
        assert!(controller.buckets.contains_key("proid.app"));

        backend.delete(&path::appmonitor("proid.app")).unwrap();
        controller.reconcile_monitors(1001).unwrap();
        assert!(!controller.buckets.contains_key("proid.app"));
    }

    #[test]
    fn scale_up_creates_up_to_available_tokens() {
        let backend = Arc::new(RedbBackend::open_in_memory().unwrap());
        seed_monitor(&backend, "proid.app", 3);
        let mut controller = AppMonitorController::new(backend, InMemoryInstanceApi::new());
        controller.reconcile_monitors(1000).unwrap();

        let outcome = controller.reevaluate_one("proid.app", 1000).unwrap();
        match outcome {
            MonitorOutcome::Created(ids) => assert_eq!(ids.len(), 3),
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn scale_up_is_capped_by_available_tokens() {
        let backend = Arc::new(RedbBackend::open_in_memory().unwrap());
        seed_monitor(&backend, "proid.app", 100);
        let mut controller = AppMonitorController::new(backend, InMemoryInstanceApi::new());
        controller.reconcile_monitors(1000).unwrap();
        // Cap is 200, fine, but force available down to simulate a burst already spent.
        controller.buckets.get_mut("proid.app").unwrap().available = 4.0;

        let outcome = controller.reevaluate_one("proid.app", 1000).unwrap();
        match outcome {
            MonitorOutcome::Created(ids) => assert_eq!(ids.len(), 4),
            other => panic!("expected Created(4), got {other:?}"),
        }
    }

    #[test]
    fn scale_down_deletes_oldest_first() {
        let backend = Arc::new(RedbBackend::open_in_memory().unwrap());
        seed_monitor(&backend, "proid.app", 1);
        let api = InMemoryInstanceApi::new();
        let req = CreateInstanceRequest::new("proid.app", serde_json::json!({}), 3, "test").unwrap();
        api.create(&req).unwrap();

        let mut controller = AppMonitorController::new(backend, api);
        controller.reconcile_monitors(1000).unwrap();

        let outcome = controller.reevaluate_one("proid.app", 1000).unwrap();
        match outcome {
            MonitorOutcome::Deleted(ids) => assert_eq!(ids.len(), 2),
            other => panic!("expected Deleted(2), got {other:?}"),
        }
        assert_eq!(controller.instance_api.list("proid.app").unwrap().len(), 1);
    }

    #[test]
    fn no_change_when_delta_is_zero() {
        let backend = Arc::new(RedbBackend::open_in_memory().unwrap());
        seed_monitor(&backend, "proid.app", 2);
        let api = InMemoryInstanceApi::new();
        let req = CreateInstanceRequest::new("proid.app", serde_json::json!({}), 2, "test").unwrap();
        api.create(&req).unwrap();

        let mut controller = AppMonitorController::new(backend, api);
        controller.reconcile_monitors(1000).unwrap();

        assert_eq!(controller.reevaluate_one("proid.app", 1000).unwrap(), MonitorOutcome::NoChange);
    }
}
