//! The `Backend` trait — the crate's sole interface to the external
//! coordination store.
//!
//! Every method here is synchronous: the real service this models is a
//! blocking hierarchical KV client, and the Loader's event loop is
//! itself a single logical thread for which blocking store I/O is the
//! expected mode (see the concurrency model). Async callers (the
//! `treadmilld` binary) run backend calls via `tokio::task::spawn_blocking`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{BackendError, BackendResult};
use crate::types::{Acl, SessionId, WatchEvent};

/// Callback invoked synchronously whenever a watched path changes.
///
/// Dispatch is serialized by the backend implementation (one callback
/// invocation completes before the next event for any path is
/// delivered), matching the "decorator-driven watcher becomes an
/// explicit registration API" design note.
pub type WatchCallback = Box<dyn Fn(WatchEvent) + Send + Sync>;

/// Opaque handle returned by a watch registration, usable to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHandle(pub u64);

/// Minimal hierarchical coordination-store client.
pub trait Backend: Send + Sync {
    /// List the immediate children of `path`.
    fn list(&self, path: &str) -> BackendResult<Vec<String>>;

    /// True if `path` exists.
    fn exists(&self, path: &str) -> BackendResult<bool>;

    /// Read a node's data. `NotFound` if it doesn't exist.
    fn get(&self, path: &str) -> BackendResult<serde_json::Value>;

    /// Read a node's data, or `default` if it doesn't exist.
    fn get_default(&self, path: &str, default: serde_json::Value) -> BackendResult<serde_json::Value> {
        match self.get(path) {
            Ok(value) => Ok(value),
            Err(BackendError::NotFound(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Unconditionally write a node's data, creating it if absent.
    fn put(&self, path: &str, value: serde_json::Value) -> BackendResult<()>;

    /// Conditional write: returns `true` iff the stored value actually
    /// changed (including creation).
    fn update(&self, path: &str, value: serde_json::Value) -> BackendResult<bool>;

    /// Delete a node. Not an error if it doesn't exist.
    fn delete(&self, path: &str) -> BackendResult<()>;

    /// Create the node with `default` data and the given ACL if it
    /// doesn't already exist. A no-op, not an error, if it does.
    fn ensure_exists(&self, path: &str, default: serde_json::Value, acl: Acl) -> BackendResult<()>;

    /// Create a session-ephemeral node. Fails with `Conflict` if one is
    /// already present (a previous session's node may not have expired
    /// yet — see `create_ephemeral_with_retry`).
    fn create_ephemeral(
        &self,
        path: &str,
        value: serde_json::Value,
        session: SessionId,
    ) -> BackendResult<()>;

    /// Create a session-ephemeral, sequentially-numbered child of
    /// `parent` (used for election nodes). Returns the full path created.
    fn create_sequential_ephemeral(
        &self,
        parent: &str,
        value: serde_json::Value,
        session: SessionId,
    ) -> BackendResult<String>;

    /// Delete every ephemeral node owned by `session`, modeling session
    /// expiry (leadership loss, agent crash).
    fn close_session(&self, session: SessionId) -> BackendResult<()>;

    /// Register a callback fired whenever `path`'s children change.
    /// Fired once immediately with the current children.
    fn watch_children(&self, path: &str, callback: WatchCallback) -> WatchHandle;

    /// Register a callback fired whenever `path`'s data changes.
    /// Fired once immediately with the current data, if any.
    fn watch_data(&self, path: &str, callback: WatchCallback) -> WatchHandle;

    /// Remove a previously registered watch.
    fn unwatch(&self, handle: WatchHandle);
}

/// Bounded retry for ephemeral node creation: up to 5 attempts, sleeping
/// `retry_interval` between them, tolerating a stale session's node that
/// hasn't expired yet.
pub fn create_ephemeral_with_retry(
    backend: &dyn Backend,
    path: &str,
    value: serde_json::Value,
    session: SessionId,
    retry_interval: Duration,
) -> BackendResult<()> {
    const MAX_ATTEMPTS: u32 = 5;
    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        match backend.create_ephemeral(path, value.clone(), session) {
            Ok(()) => return Ok(()),
            Err(BackendError::Conflict(msg)) => {
                last_err = Some(msg);
                if attempt + 1 < MAX_ATTEMPTS {
                    std::thread::sleep(retry_interval);
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(BackendError::Transient(format!(
        "presence setup failed at {path}: {}",
        last_err.unwrap_or_default()
    )))
}

/// RAII guard for a held leader lock: deletes the election node on drop.
pub struct LeaderLock {
    backend: Arc<dyn Backend>,
    node_path: String,
}

impl Drop for LeaderLock {
    fn drop(&mut self) {
        let _ = self.backend.delete(&self.node_path);
    }
}

/// A not-yet-leader candidacy: the sequential ephemeral node has been
/// created, but it isn't (yet) the lowest-numbered child.
pub struct Candidacy {
    backend: Arc<dyn Backend>,
    node_path: String,
}

/// Enter the leader election at `election_path` by creating a sequential
/// ephemeral node. Does not block.
pub fn enter_election(
    backend: Arc<dyn Backend>,
    election_path: &str,
    session: SessionId,
) -> BackendResult<Candidacy> {
    let node_path =
        backend.create_sequential_ephemeral(election_path, serde_json::Value::Null, session)?;
    Ok(Candidacy { backend, node_path })
}

impl Candidacy {
    /// Check whether this candidacy is now the lowest-numbered child
    /// (i.e. has become leader), consuming it into a `LeaderLock` if so.
    pub fn try_claim(self, election_path: &str) -> BackendResult<Result<LeaderLock, Candidacy>> {
        let mut children = self.backend.list(election_path)?;
        children.sort();
        let my_name = self.node_path.rsplit('/').next().unwrap_or(&self.node_path);
        if children.first().map(String::as_str) == Some(my_name) {
            Ok(Ok(LeaderLock {
                backend: self.backend,
                node_path: self.node_path,
            }))
        } else {
            Ok(Err(self))
        }
    }
}

/// Block (polling at `poll_interval`) until the leader lock at
/// `election_path` is held. A single candidacy node is created and
/// held for the duration of the poll.
pub fn acquire_leader_blocking(
    backend: Arc<dyn Backend>,
    election_path: &str,
    session: SessionId,
    poll_interval: Duration,
) -> BackendResult<LeaderLock> {
    let mut candidacy = enter_election(backend, election_path, session)?;
    loop {
        match candidacy.try_claim(election_path)? {
            Ok(lock) => return Ok(lock),
            Err(c) => {
                candidacy = c;
                std::thread::sleep(poll_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RedbBackend;

    #[test]
    fn first_candidate_becomes_leader() {
        let backend: Arc<dyn Backend> = Arc::new(RedbBackend::open_in_memory().unwrap());
        let lock = acquire_leader_blocking(backend, "/election/loader", SessionId(1), Duration::from_millis(1))
            .unwrap();
        drop(lock);
    }

    #[test]
    fn second_candidate_waits_for_first_to_release() {
        let backend: Arc<dyn Backend> = Arc::new(RedbBackend::open_in_memory().unwrap());
        let candidacy_a = enter_election(backend.clone(), "/election/loader", SessionId(1)).unwrap();
        let candidacy_b = enter_election(backend.clone(), "/election/loader", SessionId(2)).unwrap();

        // B is not first in line.
        let candidacy_b = match candidacy_b.try_claim("/election/loader").unwrap() {
            Ok(_) => panic!("second candidate should not win the lock"),
            Err(c) => c,
        };

        let lock_a = match candidacy_a.try_claim("/election/loader").unwrap() {
            Ok(lock) => lock,
            Err(_) => panic!("first candidate should win the lock"),
        };
        drop(lock_a);

        // Now that A released, B is first.
        match candidacy_b.try_claim("/election/loader").unwrap() {
            Ok(_lock) => {}
            Err(_) => panic!("second candidate should win once the first releases"),
        }
    }

    #[test]
    fn ephemeral_retry_recovers_once_conflicting_node_clears() {
        let backend = RedbBackend::open_in_memory().unwrap();
        backend
            .create_ephemeral("/server.presence/s1", serde_json::json!({}), SessionId(1))
            .unwrap();

        // Simulate the stale session expiring mid-retry by deleting its node
        // from another thread shortly after the retry loop starts.
        let bg = {
            let backend = backend.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(5));
                backend.delete("/server.presence/s1").unwrap();
            })
        };

        let result = create_ephemeral_with_retry(
            &backend,
            "/server.presence/s1",
            serde_json::json!({}),
            SessionId(2),
            Duration::from_millis(10),
        );
        bg.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn ephemeral_retry_exhausts_and_returns_transient() {
        let backend = RedbBackend::open_in_memory().unwrap();
        backend
            .create_ephemeral("/server.presence/s1", serde_json::json!({}), SessionId(1))
            .unwrap();

        let result = create_ephemeral_with_retry(
            &backend,
            "/server.presence/s1",
            serde_json::json!({}),
            SessionId(2),
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(BackendError::Transient(_))));
    }
}
