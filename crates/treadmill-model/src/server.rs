//! Servers — leaf nodes in the bucket tree that actually host apps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capacity::Capacity;

/// `up`, `down`, `frozen` per the server state machine. Initial state is
/// `Down`. `Frozen` is reachable only via an explicit administrative
/// blackout edge, not as part of the presence-driven up/down cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Up,
    Down,
    Frozen,
}

impl Default for ServerState {
    fn default() -> Self {
        ServerState::Down
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    pub parent: String,
    pub partition: String,
    pub capacity: Capacity,
    pub traits: u32,
    pub up_since: i64,
    pub state: ServerState,
    pub since: i64,
    pub valid_until: Option<i64>,
    /// Apps currently placed here, keyed by instance name.
    pub apps: BTreeMap<String, Capacity>,
}

impl Server {
    pub fn new(
        name: &str,
        parent: &str,
        partition: &str,
        capacity: Capacity,
        traits: u32,
        up_since: i64,
    ) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            partition: partition.to_string(),
            capacity,
            traits,
            up_since,
            state: ServerState::Down,
            since: up_since,
            valid_until: None,
            apps: BTreeMap::new(),
        }
    }

    /// Capacity already committed to placed apps.
    pub fn used(&self) -> Capacity {
        self.apps
            .values()
            .fold(Capacity::ZERO, |acc, demand| acc + *demand)
    }

    /// Capacity remaining for new placements.
    pub fn free(&self) -> Capacity {
        self.capacity - self.used()
    }

    /// A frozen server is never a placement target for new apps, even
    /// with spare capacity; it does not affect apps already placed.
    pub fn accepts_new_placement(&self) -> bool {
        self.state != ServerState::Frozen
    }

    /// Reserve `demand` for `instance` if there's room. Returns `false`
    /// (no mutation) rather than erroring — callers treat a failed fit
    /// as "try the next server", not an error.
    pub fn place(&mut self, instance: &str, demand: Capacity) -> bool {
        if !self.free().covers(&demand) {
            return false;
        }
        self.apps.insert(instance.to_string(), demand);
        true
    }

    pub fn evict(&mut self, instance: &str) -> Option<Capacity> {
        self.apps.remove(instance)
    }

    /// Apply a presence/state transition, honoring the rule that once
    /// frozen, a presence bounce does not clear it: stored state is read
    /// first, and only overridden to `up` when it wasn't already frozen.
    /// Presence disappearing always forces `down` regardless of frozen.
    pub fn adjust_for_presence(&mut self, present: bool, now: i64) {
        let new_state = if !present {
            ServerState::Down
        } else if self.state != ServerState::Frozen {
            ServerState::Up
        } else {
            ServerState::Frozen
        };
        if new_state != self.state {
            self.state = new_state;
            self.since = now;
        }
    }

    /// True if `other` has the same capacity, traits, label and parent
    /// bucket — used by `reload_server` to decide whether a structural
    /// reload is needed or only `up_since` should propagate.
    pub fn structurally_equal(&self, other: &Server) -> bool {
        self.capacity == other.capacity
            && self.traits == other.traits
            && self.partition == other.partition
            && self.parent == other.parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server::new("s1", "rack:1", "_default", Capacity::new(16000, 8000, 100000), 0, 1000)
    }

    #[test]
    fn place_respects_free_capacity() {
        let mut s = server();
        assert!(s.place("a#1", Capacity::new(16000, 8000, 100000)));
        assert!(!s.place("a#2", Capacity::new(1, 0, 0)));
    }

    #[test]
    fn frozen_blocks_new_placement_but_not_existing_apps() {
        let mut s = server();
        s.place("a#1", Capacity::new(1000, 100, 1000));
        s.state = ServerState::Frozen;
        assert!(!s.accepts_new_placement());
        assert!(s.apps.contains_key("a#1"));
    }

    #[test]
    fn presence_loss_always_forces_down_even_when_frozen() {
        let mut s = server();
        s.state = ServerState::Frozen;
        s.adjust_for_presence(false, 2000);
        assert_eq!(s.state, ServerState::Down);
    }

    #[test]
    fn frozen_survives_presence_reappearing() {
        let mut s = server();
        s.state = ServerState::Frozen;
        s.adjust_for_presence(true, 2000);
        assert_eq!(s.state, ServerState::Frozen);
    }

    #[test]
    fn down_becomes_up_on_presence_when_not_frozen() {
        let mut s = server();
        s.state = ServerState::Down;
        s.adjust_for_presence(true, 2000);
        assert_eq!(s.state, ServerState::Up);
    }
}
