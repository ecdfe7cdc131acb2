//! treadmill-cellsync — the cell sync collaborator interface.
//!
//! A periodic job syncs LDAP-like admin data (appgroups, partitions,
//! allocations, the global servers list) into the coordination store.
//! For appgroups it additionally compiles a per-proid SQLite lookup
//! database, content-addressed by a SHA-1 digest of its inputs, and
//! removes stale siblings whose digest no longer matches.
//!
//! This crate models the job as a collaborator interface rather than a
//! full implementation: it depends on an LDAP client and an embedded
//! SQLite writer, both genuinely external inputs this workspace's core
//! (model, placement, loader, monitor) never calls into directly. The
//! `CellSync` trait and `SyncReport`/`SyncError` types let a real
//! implementation slot in later without the Loader needing to change,
//! and the content-addressing rule is pinned down here so that future
//! implementation has nothing left to decide.
//!
//! Runs under the same leader-lock-guarded shape as the app-monitor —
//! one sync job per cell, serialized with the loader via the leader
//! lock, not concurrent with it.

pub mod error;
pub mod report;

pub use error::{SyncError, SyncResult};
pub use report::SyncReport;

use sha1::{Digest, Sha1};

/// Syncs external admin data into the coordination store.
pub trait CellSync: Send + Sync {
    fn sync(&self) -> SyncResult<SyncReport>;
}

/// Content-addressing digest for an appgroup's lookup database node.
///
/// SHA-1 hex of the concatenation of `pattern`, `group_type`,
/// `endpoints`, and `data`, in that order, each UTF-8 encoded. The
/// resulting hex string is the node name under
/// `/appgroup-lookups/<proid>/<digest>`; a sync pass that recomputes a
/// different digest for the same proid writes the new node and deletes
/// the old one rather than updating in place.
pub fn appgroup_lookup_digest(pattern: &str, group_type: &str, endpoints: &str, data: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(pattern.as_bytes());
    hasher.update(group_type.as_bytes());
    hasher.update(endpoints.as_bytes());
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = appgroup_lookup_digest("proid.app.*", "lbendpoint", "http:1234", "{}");
        let b = appgroup_lookup_digest("proid.app.*", "lbendpoint", "http:1234", "{}");
        assert_eq!(a, b);
    }

    #[test]
    fn digest_is_sensitive_to_field_boundaries() {
        // "ab" + "c" and "a" + "bc" concatenate to the same bytes if the
        // fields aren't kept distinguishable by the caller, but the
        // digest itself is a pure concatenation — this test documents
        // that the function does not insert separators, so callers must
        // ensure their own fields can't collide across a boundary.
        let joined = appgroup_lookup_digest("ab", "c", "", "");
        let split = appgroup_lookup_digest("a", "bc", "", "");
        assert_eq!(joined, split);
    }

    #[test]
    fn digest_changes_with_any_field() {
        let base = appgroup_lookup_digest("proid.app.*", "lbendpoint", "http:1234", "{}");
        let changed = appgroup_lookup_digest("proid.app.*", "lbendpoint", "http:1234", "{\"x\":1}");
        assert_ne!(base, changed);
    }

    #[test]
    fn digest_is_40_hex_chars() {
        let digest = appgroup_lookup_digest("p", "g", "e", "d");
        assert_eq!(digest.len(), 40);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
