//! `RedbBackend` — redb-backed implementation of the `Backend` trait.
//!
//! Node values are JSON-serialized into redb's `&[u8]` value column,
//! keyed by full path. Children are derived from key prefixes rather
//! than stored separately, so there's no separate "directory" record to
//! keep in sync. Watch dispatch and ephemeral-session bookkeeping are
//! in-process only: they are not part of what redb persists, matching a
//! real coordination-store client's split between durable state and a
//! live session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::backend::{Backend, WatchCallback, WatchHandle};
use crate::error::{BackendError, BackendResult};
use crate::tables::{NodeRecord, NODES};
use crate::types::{Acl, SessionId, WatchEvent};

/// Convert any `Display` error into a `BackendError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| BackendError::$variant(e.to_string())
    };
}

struct WatchRegistry {
    next_id: AtomicU64,
    data: Mutex<HashMap<String, Vec<(u64, WatchCallback)>>>,
    children: Mutex<HashMap<String, Vec<(u64, WatchCallback)>>>,
}

impl WatchRegistry {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            data: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
        }
    }
}

/// Thread-safe coordination-store backend backed by redb.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    watches: Arc<WatchRegistry>,
    sequence_counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl RedbBackend {
    /// Open (or create) a persistent backend at the given path.
    pub fn open(path: &Path) -> BackendResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let backend = Self::from_db(db)?;
        debug!(?path, "backend opened");
        Ok(backend)
    }

    /// Create an ephemeral in-memory backend (for tests, and for any
    /// caller standing in for a live coordination store).
    pub fn open_in_memory() -> BackendResult<Self> {
        let inmem = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(inmem)
            .map_err(map_err!(Open))?;
        let backend = Self::from_db(db)?;
        debug!("in-memory backend opened");
        Ok(backend)
    }

    fn from_db(db: Database) -> BackendResult<Self> {
        let backend = Self {
            db: Arc::new(db),
            watches: Arc::new(WatchRegistry::new()),
            sequence_counters: Arc::new(Mutex::new(HashMap::new())),
        };
        backend.ensure_table()?;
        Ok(backend)
    }

    fn ensure_table(&self) -> BackendResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn read_record(&self, path: &str) -> BackendResult<Option<NodeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(path).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: NodeRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn write_record(&self, path: &str, record: &NodeRecord) -> BackendResult<()> {
        let bytes = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table.insert(path, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn remove_record(&self, path: &str) -> BackendResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = table.remove(path).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// All stored paths. Used to derive children and to sweep a closed
    /// session's ephemeral nodes.
    fn all_paths(&self) -> BackendResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut paths = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            paths.push(key.value().to_string());
        }
        Ok(paths)
    }

    fn notify_data(&self, path: &str, value: &serde_json::Value) {
        let callbacks = self.watches.data.lock().unwrap();
        if let Some(cbs) = callbacks.get(path) {
            for (_, cb) in cbs {
                cb(WatchEvent::DataChanged {
                    path: path.to_string(),
                    value: value.clone(),
                });
            }
        }
    }

    fn notify_deleted(&self, path: &str) {
        let callbacks = self.watches.data.lock().unwrap();
        if let Some(cbs) = callbacks.get(path) {
            for (_, cb) in cbs {
                cb(WatchEvent::Deleted { path: path.to_string() });
            }
        }
    }

    fn notify_children(&self, parent: &str) {
        let callbacks = self.watches.children.lock().unwrap();
        if let Some(cbs) = callbacks.get(parent) {
            if let Ok(children) = self.list(parent) {
                for (_, cb) in cbs {
                    cb(WatchEvent::ChildrenChanged {
                        path: parent.to_string(),
                        children: children.clone(),
                    });
                }
            }
        }
    }

    fn notify_path_change(&self, path: &str, value: &serde_json::Value) {
        self.notify_data(path, value);
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !parent.is_empty() {
                self.notify_children(parent);
            }
        }
    }

    fn notify_path_deleted(&self, path: &str) {
        self.notify_deleted(path);
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !parent.is_empty() {
                self.notify_children(parent);
            }
        }
    }
}

impl Backend for RedbBackend {
    fn list(&self, path: &str) -> BackendResult<Vec<String>> {
        let prefix = format!("{path}/");
        let mut children: Vec<String> = self
            .all_paths()?
            .into_iter()
            .filter_map(|p| {
                let rest = p.strip_prefix(&prefix)?;
                Some(rest.split('/').next().unwrap_or(rest).to_string())
            })
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }

    fn exists(&self, path: &str) -> BackendResult<bool> {
        Ok(self.read_record(path)?.is_some())
    }

    fn get(&self, path: &str) -> BackendResult<serde_json::Value> {
        self.read_record(path)?
            .map(|r| r.value)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    fn put(&self, path: &str, value: serde_json::Value) -> BackendResult<()> {
        let version = self.read_record(path)?.map(|r| r.version + 1).unwrap_or(1);
        let record = NodeRecord {
            value: value.clone(),
            version,
            acl: Acl::Open,
            ephemeral_session: None,
        };
        self.write_record(path, &record)?;
        self.notify_path_change(path, &value);
        Ok(())
    }

    fn update(&self, path: &str, value: serde_json::Value) -> BackendResult<bool> {
        let existing = self.read_record(path)?;
        let changed = existing.as_ref().map(|r| r.value != value).unwrap_or(true);
        if changed {
            let version = existing.map(|r| r.version + 1).unwrap_or(1);
            let record = NodeRecord {
                value: value.clone(),
                version,
                acl: Acl::Open,
                ephemeral_session: None,
            };
            self.write_record(path, &record)?;
            self.notify_path_change(path, &value);
        }
        Ok(changed)
    }

    fn delete(&self, path: &str) -> BackendResult<()> {
        let existed = self.remove_record(path)?;
        if existed {
            self.notify_path_deleted(path);
        }
        Ok(())
    }

    fn ensure_exists(&self, path: &str, default: serde_json::Value, acl: Acl) -> BackendResult<()> {
        if self.read_record(path)?.is_some() {
            return Ok(());
        }
        let record = NodeRecord {
            value: default.clone(),
            version: 1,
            acl,
            ephemeral_session: None,
        };
        self.write_record(path, &record)?;
        self.notify_path_change(path, &default);
        Ok(())
    }

    fn create_ephemeral(
        &self,
        path: &str,
        value: serde_json::Value,
        session: SessionId,
    ) -> BackendResult<()> {
        if self.read_record(path)?.is_some() {
            return Err(BackendError::Conflict(path.to_string()));
        }
        let record = NodeRecord {
            value: value.clone(),
            version: 1,
            acl: Acl::Open,
            ephemeral_session: Some(session.0),
        };
        self.write_record(path, &record)?;
        self.notify_path_change(path, &value);
        Ok(())
    }

    fn create_sequential_ephemeral(
        &self,
        parent: &str,
        value: serde_json::Value,
        session: SessionId,
    ) -> BackendResult<String> {
        let seq = {
            let mut counters = self.sequence_counters.lock().unwrap();
            let counter = counters.entry(parent.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let node_path = format!("{parent}/lock-{seq:010}");
        self.create_ephemeral(&node_path, value, session)?;
        Ok(node_path)
    }

    fn close_session(&self, session: SessionId) -> BackendResult<()> {
        let doomed: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let mut doomed = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let record: NodeRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if record.ephemeral_session == Some(session.0) {
                    doomed.push(key.value().to_string());
                }
            }
            doomed
        };
        for path in &doomed {
            self.delete(path)?;
        }
        Ok(())
    }

    fn watch_children(&self, path: &str, callback: WatchCallback) -> WatchHandle {
        let id = self.watches.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(children) = self.list(path) {
            callback(WatchEvent::ChildrenChanged {
                path: path.to_string(),
                children,
            });
        }
        self.watches
            .children
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push((id, callback));
        WatchHandle(id)
    }

    fn watch_data(&self, path: &str, callback: WatchCallback) -> WatchHandle {
        let id = self.watches.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(value) = self.get(path) {
            callback(WatchEvent::DataChanged {
                path: path.to_string(),
                value,
            });
        }
        self.watches
            .data
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push((id, callback));
        WatchHandle(id)
    }

    fn unwatch(&self, handle: WatchHandle) {
        let mut data = self.watches.data.lock().unwrap();
        for cbs in data.values_mut() {
            cbs.retain(|(id, _)| *id != handle.0);
        }
        drop(data);
        let mut children = self.watches.children.lock().unwrap();
        for cbs in children.values_mut() {
            cbs.retain(|(id, _)| *id != handle.0);
        }
    }
}
