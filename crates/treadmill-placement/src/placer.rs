//! Placement search — walks the cell tree depth-first looking for a
//! server that fits the app being placed, and orders apps for the
//! placement sweep by allocation rank.

use thiserror::Error;
use tracing::{debug, warn};

use treadmill_model::{Application, Bucket, Cell, NodeRef};

use crate::fits::{fits, order_least_loaded, AffinityCounts};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no server fits app {app}")]
    NoFit { app: String },
    #[error("server {0} is frozen")]
    FrozenServer(String),
}

/// Search `cell` depth-first for a server under `bucket_name` that fits
/// `app`, returning the chosen server's name. Children within a bucket
/// are tried in least-loaded order. Returns the first fit found;
/// doesn't attempt to find the globally best fit.
pub fn find_server<'a>(
    cell: &'a Cell,
    bucket_name: &str,
    app: &Application,
    partition: &str,
    required_traits: u32,
    affinity_counts: &AffinityCounts,
) -> Option<&'a str> {
    let bucket = cell.buckets.get(bucket_name)?;
    search_bucket(cell, bucket, app, partition, required_traits, affinity_counts)
}

fn search_bucket<'a>(
    cell: &'a Cell,
    bucket: &Bucket,
    app: &Application,
    partition: &str,
    required_traits: u32,
    affinity_counts: &AffinityCounts,
) -> Option<&'a str> {
    let server_names: Vec<String> = bucket
        .children
        .iter()
        .filter_map(|c| match c {
            NodeRef::Server(name) => Some(name.clone()),
            NodeRef::Bucket(_) => None,
        })
        .collect();

    for server in order_least_loaded(cell, &server_names) {
        if fits(server, app, partition, required_traits, affinity_counts) {
            return Some(server.name.as_str());
        }
    }

    for child in &bucket.children {
        if let NodeRef::Bucket(name) = child {
            if let Some(child_bucket) = cell.buckets.get(name) {
                if let Some(found) =
                    search_bucket(cell, child_bucket, app, partition, required_traits, affinity_counts)
                {
                    return Some(found);
                }
            }
        }
    }

    None
}

/// Place `app` by searching every top-level bucket, applying the first
/// fit found. Returns `NoFit` if the search is exhausted.
pub fn place(cell: &mut Cell, app_name: &str) -> Result<String, PlacementError> {
    let allocation_name = cell
        .apps
        .get(app_name)
        .expect("place called with an app not in the model")
        .allocation
        .clone();
    let required_traits = 0u32;

    let affinity_counts = AffinityCounts::new();
    let top_buckets = cell.top_buckets.clone();
    let partition_label = server_partition_for(cell, &allocation_name).to_string();

    for bucket_name in &top_buckets {
        let app_ref = cell.apps.get(app_name).unwrap();
        if let Some(server_name) = find_server(
            cell,
            bucket_name,
            app_ref,
            &partition_label,
            required_traits,
            &affinity_counts,
        ) {
            let server_name = server_name.to_string();
            cell.place_app(app_name, &server_name)
                .expect("server_name came from a fits() match against this cell");
            debug!(app = app_name, server = %server_name, "placed app");
            return Ok(server_name);
        }
    }

    warn!(app = app_name, "no server fits this app in any partition");
    Err(PlacementError::NoFit {
        app: app_name.to_string(),
    })
}

/// The partition an allocation binds to: for now the allocation name
/// and partition label are the same namespace until the loader wires
/// allocations to their owning partition explicitly.
fn server_partition_for<'a>(cell: &'a Cell, allocation_name: &'a str) -> &'a str {
    cell.partitions
        .values()
        .find(|p| p.allocation == allocation_name)
        .map(|p| p.label.as_str())
        .unwrap_or(treadmill_model::DEFAULT_PARTITION)
}

/// Order apps for a placement sweep: by effective allocation rank
/// (ascending — lower rank schedules first), then by the app's own
/// priority, then by creation order (FIFO) as the final tiebreak.
pub fn order_apps_for_sweep<'a>(
    cell: &'a Cell,
    app_names: &[String],
    creation_order: impl Fn(&str) -> u64,
) -> Vec<&'a Application> {
    let mut apps: Vec<&Application> = app_names
        .iter()
        .filter_map(|name| cell.apps.get(name))
        .collect();

    apps.sort_by(|a, b| {
        let rank_a = allocation_rank(cell, a);
        let rank_b = allocation_rank(cell, b);
        rank_a
            .cmp(&rank_b)
            .then_with(|| b.effective_priority().cmp(&a.effective_priority()))
            .then_with(|| creation_order(&a.name).cmp(&creation_order(&b.name)))
    });
    apps
}

fn allocation_rank(cell: &Cell, app: &Application) -> i32 {
    match cell.allocation(&app.allocation) {
        Ok(alloc) => {
            let utilization = cell
                .capacity_aggregate(&app.allocation)
                .map(|(total, used)| total.utilization(&used))
                .unwrap_or(0.0);
            alloc.effective_rank(utilization)
        }
        Err(_) => i32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treadmill_model::{Allocation, Bucket, Capacity, Server, DEFAULT_PARTITION};

    fn cell_with_server(name: &str, cap: Capacity) -> Cell {
        let mut cell = Cell::new("cell1");
        cell.attach_bucket(Bucket::new("rack:1", None, 0, None), None).unwrap();
        cell.add_server(Server::new(name, "rack:1", DEFAULT_PARTITION, cap, 0, 0))
            .unwrap();
        cell.partitions
            .get_mut(DEFAULT_PARTITION)
            .unwrap()
            .allocation = "tenant".to_string();
        cell.allocations
            .insert("tenant".to_string(), Allocation::new("tenant", Capacity::ZERO, 0, None));
        cell
    }

    #[test]
    fn place_finds_the_only_fitting_server() {
        let mut cell = cell_with_server("s1", Capacity::new(1000, 1000, 1000));
        cell.servers.get_mut("s1").unwrap().state = treadmill_model::ServerState::Up;
        cell.apps.insert(
            "proid.app#0000000001".into(),
            Application::new("proid.app#0000000001", 1, Capacity::new(100, 100, 100), "tenant", 3600),
        );
        let placed = place(&mut cell, "proid.app#0000000001").unwrap();
        assert_eq!(placed, "s1");
        assert!(cell.apps["proid.app#0000000001"].is_placed());
    }

    #[test]
    fn place_fails_when_nothing_fits() {
        let mut cell = cell_with_server("s1", Capacity::new(10, 10, 10));
        cell.servers.get_mut("s1").unwrap().state = treadmill_model::ServerState::Up;
        cell.apps.insert(
            "proid.app#0000000001".into(),
            Application::new("proid.app#0000000001", 1, Capacity::new(1000, 1000, 1000), "tenant", 3600),
        );
        let err = place(&mut cell, "proid.app#0000000001").unwrap_err();
        assert_eq!(err, PlacementError::NoFit { app: "proid.app#0000000001".into() });
    }

    #[test]
    fn order_apps_for_sweep_breaks_ties_by_priority_then_fifo() {
        let mut cell = cell_with_server("s1", Capacity::new(1000, 1000, 1000));
        cell.apps.insert(
            "proid.low#0000000001".into(),
            Application::new("proid.low#0000000001", 1, Capacity::ZERO, "tenant", 3600),
        );
        cell.apps.insert(
            "proid.high#0000000002".into(),
            Application::new("proid.high#0000000002", 9, Capacity::ZERO, "tenant", 3600),
        );
        let names = vec!["proid.low#0000000001".to_string(), "proid.high#0000000002".to_string()];
        let ordered = order_apps_for_sweep(&cell, &names, |n| n.len() as u64);
        assert_eq!(ordered[0].name, "proid.high#0000000002");
    }
}
