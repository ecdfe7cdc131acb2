//! Identity groups — fixed-size pools of numbered slots handed out to
//! apps that need a stable identity (e.g. a reserved port or host index).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityGroup {
    pub name: String,
    pub count: u32,
    /// slot index -> (host, app instance) holding it.
    slots: BTreeMap<u32, (String, String)>,
}

impl IdentityGroup {
    pub fn new(name: &str, count: u32) -> Self {
        Self {
            name: name.to_string(),
            count,
            slots: BTreeMap::new(),
        }
    }

    /// Assign the lowest free slot in `[0, count)` to `app` on `host`.
    pub fn assign(&mut self, host: &str, app: &str) -> ModelResult<u32> {
        for slot in 0..self.count {
            if !self.slots.contains_key(&slot) {
                self.slots.insert(slot, (host.to_string(), app.to_string()));
                return Ok(slot);
            }
        }
        Err(ModelError::IdentityGroupFull(self.name.clone()))
    }

    /// Directly marks `slot` as held by `app`, bypassing the
    /// lowest-free-slot search — for reconstructing a group's occupancy
    /// from already-recorded placements rather than assigning afresh.
    pub fn occupy(&mut self, slot: u32, host: &str, app: &str) {
        self.slots.insert(slot, (host.to_string(), app.to_string()));
    }

    /// Release whatever slot `app` holds, if any.
    pub fn release(&mut self, app: &str) {
        self.slots.retain(|_, (_, held_by)| held_by != app);
    }

    /// Shrink or grow the pool. Slots at or beyond the new count are
    /// dropped, releasing whatever app held them.
    pub fn resize(&mut self, count: u32) {
        self.count = count;
        self.slots.retain(|slot, _| *slot < count);
    }

    pub fn slot_of(&self, app: &str) -> Option<u32> {
        self.slots
            .iter()
            .find(|(_, (_, held_by))| held_by == app)
            .map(|(slot, _)| *slot)
    }

    pub fn occupied(&self) -> usize {
        self.slots.len()
    }

    /// Apps holding a slot at or beyond `min_slot` — the set a shrink to
    /// `min_slot` would evict.
    pub fn apps_from(&self, min_slot: u32) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(slot, _)| **slot >= min_slot)
            .map(|(_, (_, app))| app.clone())
            .collect()
    }
}
