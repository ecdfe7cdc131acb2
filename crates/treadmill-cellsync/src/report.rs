//! Summary of a completed sync pass.

/// Counts of what a `sync()` call changed in the coordination store.
///
/// A real implementation fills every field; the counts exist so a
/// caller (the daemon's own logging, a `treadmilld check` report) can
/// tell "ran and changed nothing" apart from "didn't run".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub appgroups_synced: usize,
    pub partitions_synced: usize,
    pub allocations_synced: usize,
    pub servers_synced: usize,
    pub stale_lookups_removed: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        *self == SyncReport::default()
    }
}
