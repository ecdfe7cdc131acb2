//! On-the-wire record shapes read from and written to the coordination
//! store. These mirror the namespace layout in the external-interfaces
//! section one-to-one; nothing here is pure in-memory model state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BucketRecord {
    pub parent: Option<String>,
    pub level: Option<String>,
    #[serde(default)]
    pub traits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub parent: String,
    #[serde(default = "default_partition_label")]
    pub partition: String,
    pub memory: i64,
    pub cpu: i64,
    pub disk: i64,
    #[serde(default)]
    pub traits: u32,
    pub up_since: i64,
}

fn default_partition_label() -> String {
    treadmill_model::DEFAULT_PARTITION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PresenceRecord {
    #[serde(default)]
    pub valid_until: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementStateRecord {
    pub state: String,
    pub since: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementEntry {
    pub state: String,
    pub since: i64,
    #[serde(default)]
    pub identity: Option<u32>,
    #[serde(default)]
    pub expires: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub memory: i64,
    pub cpu: i64,
    pub disk: i64,
    #[serde(default)]
    pub reboot_schedule: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub pattern: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub name: String,
    pub partition: String,
    pub memory: i64,
    pub cpu: i64,
    pub disk: i64,
    pub rank: i32,
    pub rank_adjustment: Option<i32>,
    pub max_utilization: Option<f64>,
    #[serde(default)]
    pub assignments: Vec<AssignmentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledManifest {
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub memory: i64,
    pub cpu: i64,
    pub disk: i64,
    #[serde(default)]
    pub affinity: String,
    #[serde(default)]
    pub affinity_limits: BTreeMap<String, u32>,
    pub lease: i64,
    #[serde(default)]
    pub schedule_once: bool,
    pub data_retention_timeout: Option<i64>,
    pub identity_group: Option<String>,
}

fn default_priority() -> i32 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityGroupRecord {
    pub count: u32,
}
