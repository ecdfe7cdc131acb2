//! The `fits` predicate and affinity ordering.
//!
//! A server fits an app when, for every capacity dimension, its free
//! capacity covers the app's demand, its traits carry every trait the
//! app requires, its partition label matches the app's allocation
//! partition, and placing the app would not exceed any affinity limit
//! declared at the server or at any ancestor bucket.

use std::collections::HashMap;

use treadmill_model::{Application, Cell, Server};

/// Per-affinity-key counts of already-placed instances, keyed by the
/// bucket or server name the limit applies to.
pub type AffinityCounts = HashMap<String, u32>;

/// True if `server` can host `app` right now.
///
/// `partition` is the app's allocation's partition label; `required_traits`
/// is the bitmask the app needs present in the server's trait set.
pub fn fits(
    server: &Server,
    app: &Application,
    partition: &str,
    required_traits: u32,
    ancestor_affinity_counts: &AffinityCounts,
) -> bool {
    if !server.accepts_new_placement() {
        return false;
    }
    if !server.free().covers(&app.demand) {
        return false;
    }
    if server.traits & required_traits != required_traits {
        return false;
    }
    if server.partition != partition {
        return false;
    }
    affinity_limits_allow(app, &server.name, ancestor_affinity_counts)
}

/// Check every affinity-limit entry declared for `app` against the
/// counts already recorded at that scope (server name or ancestor
/// bucket name). `server_name` is unused directly: limits are already
/// keyed by whatever scope they apply to, server or bucket alike.
fn affinity_limits_allow(app: &Application, _server_name: &str, counts: &AffinityCounts) -> bool {
    app.affinity_limits
        .iter()
        .all(|(scope, limit)| counts.get(scope).copied().unwrap_or(0) < *limit)
}

/// Order a bucket's direct server children for the search, by the
/// app's affinity key. The default strategy is least-loaded: lowest
/// current utilization first, so load spreads rather than stacks.
pub fn order_least_loaded<'a>(cell: &'a Cell, server_names: &[String]) -> Vec<&'a Server> {
    let mut servers: Vec<&Server> = server_names
        .iter()
        .filter_map(|name| cell.servers.get(name))
        .collect();
    servers.sort_by(|a, b| {
        let ua = a.capacity.utilization(&a.used());
        let ub = b.capacity.utilization(&b.used());
        ua.partial_cmp(&ub).unwrap_or(std::cmp::Ordering::Equal)
    });
    servers
}
