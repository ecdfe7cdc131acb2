//! Allocations — hierarchical resource reservations matched to apps by
//! pattern, used to rank apps for placement.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::capacity::Capacity;

/// One pattern → (priority, sub-allocation) entry under an assignment key.
/// Patterns are tried in order; the first match wins (see
/// `Allocation::match_assignment`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub pattern: String,
    pub priority: i32,
    pub allocation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub name: String,
    pub capacity: Capacity,
    pub rank: i32,
    pub rank_adjustment: Option<i32>,
    pub max_utilization: Option<f64>,
    pub parent: Option<String>,
    /// Names of directly-held sub-allocations, created lazily by
    /// splitting a dotted/slashed allocation name on its path separator.
    pub sub_alloc: Vec<String>,
    pub assignments: BTreeMap<String, Vec<Assignment>>,
}

impl Allocation {
    pub fn new(name: &str, capacity: Capacity, rank: i32, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            rank,
            rank_adjustment: None,
            max_utilization: None,
            parent: parent.map(str::to_string),
            sub_alloc: Vec::new(),
            assignments: BTreeMap::new(),
        }
    }

    /// Effective rank for ordering apps at placement time: the bare rank
    /// unless `utilization` exceeds `max_utilization`, in which case
    /// `rank_adjustment` is added. When `max_utilization` is absent there
    /// is no ratio to compare against, so the adjustment never applies —
    /// this is deliberate, not an oversight (see the resolved open
    /// question on rank_adjustment without max_utilization).
    pub fn effective_rank(&self, utilization: f64) -> i32 {
        match (self.max_utilization, self.rank_adjustment) {
            (Some(max_util), Some(adjustment)) if utilization > max_util => self.rank + adjustment,
            _ => self.rank,
        }
    }

    /// Split a lazily-created allocation name ("tenant/sub:leaf") into
    /// its parent path and leaf component, on the last `/`.
    pub fn split_path(name: &str) -> (Option<&str>, &str) {
        match name.rsplit_once('/') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, name),
        }
    }

    /// First assignment under `key` whose pattern matches `instance`,
    /// tried in declared order. The pattern is anchored and suffixed
    /// with the ten-digit instance-id grammar, matching the full
    /// "name#NNNNNNNNNN" instance form.
    pub fn match_assignment<'a>(&'a self, key: &str, instance: &str) -> Option<&'a Assignment> {
        let candidates = self.assignments.get(key)?;
        candidates.iter().find(|a| {
            let anchored = format!("^{}#[0-9]{{10}}$", a.pattern);
            Regex::new(&anchored)
                .map(|re| re.is_match(instance))
                .unwrap_or(false)
        })
    }

    pub fn add_sub_alloc(&mut self, name: &str) {
        if !self.sub_alloc.iter().any(|s| s == name) {
            self.sub_alloc.push(name.to_string());
        }
    }
}

/// Derive the assignment lookup key for an instance name: the substring
/// between `@` and the first `.` if `@` is present, else the substring
/// before the first `.`.
pub fn assignment_key(instance: &str) -> &str {
    if let Some(at) = instance.find('@') {
        let rest = &instance[at + 1..];
        rest.split('.').next().unwrap_or(rest)
    } else {
        instance.split('.').next().unwrap_or(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_separates_parent_and_leaf() {
        assert_eq!(Allocation::split_path("tenant/sub:leaf"), (Some("tenant"), "sub:leaf"));
        assert_eq!(Allocation::split_path("tenant"), (None, "tenant"));
    }

    #[test]
    fn effective_rank_applies_adjustment_only_when_over_max_utilization() {
        let mut a = Allocation::new("tenant", Capacity::new(1000, 1000, 1000), 10, None);
        a.max_utilization = Some(0.8);
        a.rank_adjustment = Some(-5);
        assert_eq!(a.effective_rank(0.5), 10);
        assert_eq!(a.effective_rank(0.9), 5);
    }

    #[test]
    fn effective_rank_never_adjusts_without_max_utilization() {
        let mut a = Allocation::new("tenant", Capacity::new(1000, 1000, 1000), 10, None);
        a.rank_adjustment = Some(-5);
        assert_eq!(a.effective_rank(0.99), 10);
    }

    #[test]
    fn assignment_key_prefers_at_sign_over_leading_dot() {
        assert_eq!(assignment_key("proid.app@tenant.foo#0000000001"), "tenant");
        assert_eq!(assignment_key("proid.app#0000000001"), "proid");
    }

    #[test]
    fn match_assignment_picks_first_matching_pattern_in_order() {
        let mut a = Allocation::new("tenant", Capacity::ZERO, 0, None);
        a.assignments.insert(
            "proid".to_string(),
            vec![
                Assignment { pattern: "proid\\.other".to_string(), priority: 1, allocation: "x".into() },
                Assignment { pattern: "proid\\.app".to_string(), priority: 1, allocation: "y".into() },
            ],
        );
        let m = a.match_assignment("proid", "proid.app#0000000001").unwrap();
        assert_eq!(m.allocation, "y");
    }
}
