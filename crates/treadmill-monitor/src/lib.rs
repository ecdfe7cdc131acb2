//! treadmill-monitor — the App-Monitor Controller.
//!
//! Keeps each configured app at its target instance count, subject to a
//! per-monitor token bucket that bounds burst creation to `2 * count`
//! instances and steady-state creation to `2 * count / 3600` per
//! second. The factor of two lets a freshly-scaled-up monitor burst to
//! cover its new target in one tick while keeping sustained churn
//! bounded.
//!
//! # Monitor lifecycle
//!
//! A monitor enters the table the instant its `/app-monitors/<name>`
//! node is observed, seeded with full burst credit rather than empty —
//! `available = 2 * count` from the start. It leaves the table the
//! instant the node disappears. Reconfiguring `count` resets the
//! bucket from the new value rather than scaling the old one: this
//! matches a watch callback that replaces the whole per-monitor state
//! on every data change instead of adjusting it incrementally.
//!
//! # Architecture
//!
//! ```text
//! AppMonitorController<A: InstanceApi>
//!   ├── Backend            (reads /app-monitors, the monitor table's source of truth)
//!   └── InstanceApi        (create/delete instances to reach the target count)
//! ```
//!
//! This crate also carries the `InstanceApi` trait (the Instance-API
//! collaborator interface) and an in-memory test double; the
//! production REST/LDAP client lives outside this workspace.

pub mod controller;
pub mod error;
pub mod instance_api;

pub use controller::{AppMonitorController, AppMonitorRecord, MonitorOutcome};
pub use error::{MonitorError, MonitorResult};
pub use instance_api::{CreateInstanceRequest, InMemoryInstanceApi, InstanceApi, InstanceApiError, InstanceRecord};
