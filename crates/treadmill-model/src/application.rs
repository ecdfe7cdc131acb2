//! Applications — scheduled workload instances, named `proid.app#NNNNNNNNNN`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capacity::Capacity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub priority: i32,
    pub demand: Capacity,
    pub affinity: String,
    pub affinity_limits: BTreeMap<String, u32>,
    pub identity_group: Option<String>,
    pub schedule_once: bool,
    pub data_retention_timeout: Option<i64>,
    pub lease: i64,
    pub allocation: String,
    pub server: Option<String>,
    pub placement_expiry: Option<i64>,
    pub identity: Option<u32>,
}

/// Negative priorities mean "use the cell default" rather than a literal
/// priority — see `Application::effective_priority`.
pub const DEFAULT_PRIORITY: i32 = 1;

impl Application {
    pub fn new(name: &str, priority: i32, demand: Capacity, allocation: &str, lease: i64) -> Self {
        Self {
            name: name.to_string(),
            priority,
            demand,
            affinity: String::new(),
            affinity_limits: BTreeMap::new(),
            identity_group: None,
            schedule_once: false,
            data_retention_timeout: None,
            lease,
            allocation: allocation.to_string(),
            server: None,
            placement_expiry: None,
            identity: None,
        }
    }

    /// Numeric instance-id suffix after the final `#`.
    pub fn instance_id(&self) -> Option<&str> {
        self.name.rsplit_once('#').map(|(_, id)| id)
    }

    /// The proid/app portion before `#`.
    pub fn proid_app(&self) -> &str {
        self.name.split('#').next().unwrap_or(&self.name)
    }

    /// A negative `priority` falls back to the cell default; non-negative
    /// values are used as-is.
    pub fn effective_priority(&self) -> i32 {
        if self.priority < 0 {
            DEFAULT_PRIORITY
        } else {
            self.priority
        }
    }

    pub fn is_placed(&self) -> bool {
        self.server.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Application {
        Application::new("proid.app#0000000042", -1, Capacity::new(100, 10, 100), "tenant", 3600)
    }

    #[test]
    fn instance_id_is_suffix_after_hash() {
        assert_eq!(app().instance_id(), Some("0000000042"));
    }

    #[test]
    fn proid_app_is_prefix_before_hash() {
        assert_eq!(app().proid_app(), "proid.app");
    }

    #[test]
    fn negative_priority_falls_back_to_default() {
        assert_eq!(app().effective_priority(), DEFAULT_PRIORITY);
    }

    #[test]
    fn non_negative_priority_is_used_as_is() {
        let mut a = app();
        a.priority = 7;
        assert_eq!(a.effective_priority(), 7);
    }
}
