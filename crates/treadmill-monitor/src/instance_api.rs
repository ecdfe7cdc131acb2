//! The Instance API as consumed by the App-Monitor Controller.
//!
//! Modeled as a collaborator trait rather than a concrete client: the
//! real thing is a REST service backed by an LDAP/SQL admin store,
//! which is out of scope here. This crate only needs enough of its
//! surface to drive monitor reevaluation, plus an in-memory double for
//! the monitor's own test suite.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

/// Errors returned by an `InstanceApi` implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstanceApiError {
    #[error("no such instance: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("instance api unavailable: {0}")]
    Unavailable(String),
}

/// A request to create one or more instances of an app.
///
/// Constructed only via `new`/`with_resources`, so a request violating
/// the field-level checks (count in `[1, 1000]`, resources `>= 100 MB`
/// when present) can never exist.
#[derive(Debug, Clone)]
pub struct CreateInstanceRequest {
    pub app_id: String,
    pub manifest: serde_json::Value,
    pub count: u32,
    pub created_by: String,
    pub memory_mb: Option<i64>,
    pub disk_mb: Option<i64>,
}

impl CreateInstanceRequest {
    /// `manifest` is typically `{}` when the monitor is just scaling an
    /// already-registered app template up, and a full manifest when a
    /// caller is creating instances of a brand-new configuration.
    pub fn new(
        app_id: impl Into<String>,
        manifest: serde_json::Value,
        count: u32,
        created_by: impl Into<String>,
    ) -> Result<Self, InstanceApiError> {
        if !(1..=1000).contains(&count) {
            return Err(InstanceApiError::InvalidRequest(format!(
                "count {count} out of range [1, 1000]"
            )));
        }
        Ok(Self {
            app_id: app_id.into(),
            manifest,
            count,
            created_by: created_by.into(),
            memory_mb: None,
            disk_mb: None,
        })
    }

    /// Override the template's resource demand. Rejects anything below
    /// the 100 MB floor for either dimension.
    pub fn with_resources(mut self, memory_mb: i64, disk_mb: i64) -> Result<Self, InstanceApiError> {
        if memory_mb < 100 {
            return Err(InstanceApiError::InvalidRequest(format!(
                "memory {memory_mb} MB below 100 MB floor"
            )));
        }
        if disk_mb < 100 {
            return Err(InstanceApiError::InvalidRequest(format!(
                "disk {disk_mb} MB below 100 MB floor"
            )));
        }
        self.memory_mb = Some(memory_mb);
        self.disk_mb = Some(disk_mb);
        Ok(self)
    }
}

/// A created/known instance, named `<proid>.<app>#<10 decimal digits>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: String,
    pub app_id: String,
    pub priority: i32,
    pub created_by: String,
}

pub trait InstanceApi: Send + Sync {
    /// List instance ids matching an app pattern (e.g. `"proid.app"`).
    fn list(&self, app_match: &str) -> Result<Vec<String>, InstanceApiError>;

    fn get(&self, id: &str) -> Result<InstanceRecord, InstanceApiError>;

    /// Create `request.count` instances, returning their ids.
    fn create(&self, request: &CreateInstanceRequest) -> Result<Vec<String>, InstanceApiError>;

    fn update(&self, id: &str, priority: i32) -> Result<(), InstanceApiError>;

    fn bulk_update(&self, updates: &[(String, i32)]) -> Result<(), InstanceApiError>;

    fn delete(&self, id: &str, deleted_by: &str) -> Result<(), InstanceApiError>;

    fn bulk_delete(&self, ids: &[String], deleted_by: &str) -> Result<(), InstanceApiError>;
}

/// In-memory `InstanceApi` double used by the monitor's own tests.
#[derive(Default)]
pub struct InMemoryInstanceApi {
    instances: Mutex<HashMap<String, InstanceRecord>>,
    next_seq: Mutex<HashMap<String, u64>>,
}

impl InMemoryInstanceApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, app_id: &str) -> String {
        let mut seqs = self.next_seq.lock().unwrap();
        let seq = seqs.entry(app_id.to_string()).or_insert(0);
        *seq += 1;
        format!("{app_id}#{:010}", *seq)
    }
}

impl InstanceApi for InMemoryInstanceApi {
    fn list(&self, app_match: &str) -> Result<Vec<String>, InstanceApiError> {
        let instances = self.instances.lock().unwrap();
        let mut ids: Vec<String> = instances
            .values()
            .filter(|r| r.app_id == app_match)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn get(&self, id: &str) -> Result<InstanceRecord, InstanceApiError> {
        self.instances
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| InstanceApiError::NotFound(id.to_string()))
    }

    fn create(&self, request: &CreateInstanceRequest) -> Result<Vec<String>, InstanceApiError> {
        let mut instances = self.instances.lock().unwrap();
        let mut created = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            let id = self.next_id(&request.app_id);
            instances.insert(
                id.clone(),
                InstanceRecord {
                    id: id.clone(),
                    app_id: request.app_id.clone(),
                    priority: 0,
                    created_by: request.created_by.clone(),
                },
            );
            created.push(id);
        }
        Ok(created)
    }

    fn update(&self, id: &str, priority: i32) -> Result<(), InstanceApiError> {
        let mut instances = self.instances.lock().unwrap();
        let record = instances
            .get_mut(id)
            .ok_or_else(|| InstanceApiError::NotFound(id.to_string()))?;
        record.priority = priority;
        Ok(())
    }

    fn bulk_update(&self, updates: &[(String, i32)]) -> Result<(), InstanceApiError> {
        for (id, priority) in updates {
            self.update(id, *priority)?;
        }
        Ok(())
    }

    fn delete(&self, id: &str, _deleted_by: &str) -> Result<(), InstanceApiError> {
        self.instances.lock().unwrap().remove(id);
        Ok(())
    }

    fn bulk_delete(&self, ids: &[String], deleted_by: &str) -> Result<(), InstanceApiError> {
        for id in ids {
            self.delete(id, deleted_by)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_rejects_out_of_range_count() {
        assert!(CreateInstanceRequest::new("proid.app", serde_json::json!({}), 0, "monitor").is_err());
        assert!(CreateInstanceRequest::new("proid.app", serde_json::json!({}), 1001, "monitor").is_err());
        assert!(CreateInstanceRequest::new("proid.app", serde_json::json!({}), 1, "monitor").is_ok());
    }

    #[test]
    fn create_request_rejects_resources_below_floor() {
        let req = CreateInstanceRequest::new("proid.app", serde_json::json!({}), 1, "monitor").unwrap();
        assert!(req.clone().with_resources(99, 200).is_err());
        assert!(req.clone().with_resources(200, 99).is_err());
        assert!(req.with_resources(100, 100).is_ok());
    }

    #[test]
    fn in_memory_create_and_delete_roundtrip() {
        let api = InMemoryInstanceApi::new();
        let req = CreateInstanceRequest::new("proid.app", serde_json::json!({}), 3, "monitor").unwrap();
        let ids = api.create(&req).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(api.list("proid.app").unwrap().len(), 3);

        api.delete(&ids[0], "monitor").unwrap();
        assert_eq!(api.list("proid.app").unwrap().len(), 2);
    }
}
