//! Partitions — named subsets of a cell's servers bound to an allocation
//! tree, with an optional weekly reboot schedule.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PARTITION: &str = "_default";

/// A 7-day reboot-window bitmap, one bit per day (Mon=0 .. Sun=6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RebootSchedule(pub u8);

impl RebootSchedule {
    pub fn allows_day(&self, day: u8) -> bool {
        day < 7 && self.0 & (1 << day) != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub label: String,
    pub allocation: String,
    pub reboot_schedule: Option<RebootSchedule>,
    pub servers: BTreeSet<String>,
}

impl Partition {
    pub fn new(label: &str, allocation: &str) -> Self {
        Self {
            label: label.to_string(),
            allocation: allocation.to_string(),
            reboot_schedule: None,
            servers: BTreeSet::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.label == DEFAULT_PARTITION
    }

    pub fn add_server(&mut self, name: &str) {
        self.servers.insert(name.to_string());
    }

    pub fn remove_server(&mut self, name: &str) {
        self.servers.remove(name);
    }
}
