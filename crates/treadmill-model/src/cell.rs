//! The Cell — the in-memory root of the resource model, rebuilt from the
//! coordination store on every leader start and owning everything else
//! in this crate: the bucket tree, servers, partitions, allocations,
//! apps and identity groups.

use std::collections::BTreeMap;

use crate::allocation::Allocation;
use crate::application::Application;
use crate::bucket::{Bucket, NodeRef};
use crate::capacity::Capacity;
use crate::error::{ModelError, ModelResult};
use crate::identity::IdentityGroup;
use crate::partition::{Partition, DEFAULT_PARTITION};
use crate::server::Server;

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub name: String,
    /// Buckets attached directly under the implicit cell root.
    pub top_buckets: Vec<String>,
    pub buckets: BTreeMap<String, Bucket>,
    pub servers: BTreeMap<String, Server>,
    pub partitions: BTreeMap<String, Partition>,
    pub allocations: BTreeMap<String, Allocation>,
    pub apps: BTreeMap<String, Application>,
    pub identity_groups: BTreeMap<String, IdentityGroup>,
}

impl Cell {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Attach `bucket` under `parent` (or the cell root when `None`),
    /// rejecting a parent that is (transitively) the bucket itself.
    pub fn attach_bucket(&mut self, mut bucket: Bucket, parent: Option<&str>) -> ModelResult<()> {
        if let Some(parent_name) = parent {
            if self.creates_cycle(&bucket.name, parent_name) {
                return Err(ModelError::CycleDetected(bucket.name.clone()));
            }
            bucket.parent = Some(parent_name.to_string());
            self.buckets
                .get_mut(parent_name)
                .ok_or_else(|| ModelError::UnknownBucket(parent_name.to_string()))?
                .add_node(NodeRef::Bucket(bucket.name.clone()));
        } else {
            bucket.parent = None;
            if !self.top_buckets.contains(&bucket.name) {
                self.top_buckets.push(bucket.name.clone());
            }
        }
        self.buckets.insert(bucket.name.clone(), bucket);
        Ok(())
    }

    fn creates_cycle(&self, candidate_child: &str, parent: &str) -> bool {
        let mut current = Some(parent.to_string());
        while let Some(name) = current {
            if name == candidate_child {
                return true;
            }
            current = self.buckets.get(&name).and_then(|b| b.parent.clone());
        }
        false
    }

    /// Attach a server under its parent bucket and partition.
    pub fn add_server(&mut self, server: Server) -> ModelResult<()> {
        let bucket = self
            .buckets
            .get_mut(&server.parent)
            .ok_or_else(|| ModelError::UnknownBucket(server.parent.clone()))?;
        bucket.add_node(NodeRef::Server(server.name.clone()));
        self.partitions
            .entry(server.partition.clone())
            .or_insert_with(|| Partition::new(&server.partition, DEFAULT_PARTITION))
            .add_server(&server.name);
        self.servers.insert(server.name.clone(), server);
        Ok(())
    }

    /// Remove a server: drop it from its bucket, its partition, and the
    /// model entirely (its placement records go with it).
    pub fn remove_server(&mut self, name: &str) -> ModelResult<Server> {
        let server = self
            .servers
            .remove(name)
            .ok_or_else(|| ModelError::UnknownServer(name.to_string()))?;
        if let Some(bucket) = self.buckets.get_mut(&server.parent) {
            bucket.remove_node(&NodeRef::Server(name.to_string()));
        }
        if let Some(partition) = self.partitions.get_mut(&server.partition) {
            partition.remove_server(name);
        }
        Ok(server)
    }

    /// Depth-first listing of every server reachable under `bucket_name`.
    pub fn traverse(&self, bucket_name: &str) -> ModelResult<Vec<&Server>> {
        let bucket = self
            .buckets
            .get(bucket_name)
            .ok_or_else(|| ModelError::UnknownBucket(bucket_name.to_string()))?;
        let mut out = Vec::new();
        self.traverse_into(bucket, &mut out);
        Ok(out)
    }

    fn traverse_into<'a>(&'a self, bucket: &Bucket, out: &mut Vec<&'a Server>) {
        for child in &bucket.children {
            match child {
                NodeRef::Server(name) => {
                    if let Some(server) = self.servers.get(name) {
                        out.push(server);
                    }
                }
                NodeRef::Bucket(name) => {
                    if let Some(child_bucket) = self.buckets.get(name) {
                        self.traverse_into(child_bucket, out);
                    }
                }
            }
        }
    }

    /// Sum of total and used capacity across every server under `bucket_name`.
    pub fn capacity_aggregate(&self, bucket_name: &str) -> ModelResult<(Capacity, Capacity)> {
        let servers = self.traverse(bucket_name)?;
        let total = servers
            .iter()
            .fold(Capacity::ZERO, |acc, s| acc + s.capacity);
        let used = servers.iter().fold(Capacity::ZERO, |acc, s| acc + s.used());
        Ok((total, used))
    }

    pub fn default_partition(&self) -> ModelResult<&Partition> {
        self.partitions
            .get(DEFAULT_PARTITION)
            .ok_or(ModelError::NoDefaultPartition)
    }

    pub fn allocation(&self, name: &str) -> ModelResult<&Allocation> {
        self.allocations
            .get(name)
            .ok_or_else(|| ModelError::UnknownAllocation(name.to_string()))
    }

    /// Lazily create every ancestor of `name` ("tenant/sub:leaf") that
    /// doesn't yet exist, wiring each to its parent via `sub_alloc`.
    pub fn ensure_allocation(&mut self, name: &str, capacity: Capacity, rank: i32) {
        if self.allocations.contains_key(name) {
            return;
        }
        let (parent, _) = Allocation::split_path(name);
        if let Some(parent_name) = parent {
            self.ensure_allocation(parent_name, Capacity::ZERO, 0);
            if let Some(p) = self.allocations.get_mut(parent_name) {
                p.add_sub_alloc(name);
            }
        }
        self.allocations
            .insert(name.to_string(), Allocation::new(name, capacity, rank, parent));
    }

    /// Place `app` on `server`, wiring both sides of the relationship.
    pub fn place_app(&mut self, app_name: &str, server_name: &str) -> ModelResult<()> {
        let app = self
            .apps
            .get(app_name)
            .ok_or_else(|| ModelError::UnknownApplication(app_name.to_string()))?;
        let demand = app.demand;
        let server = self
            .servers
            .get_mut(server_name)
            .ok_or_else(|| ModelError::UnknownServer(server_name.to_string()))?;
        server.place(app_name, demand);
        self.apps.get_mut(app_name).unwrap().server = Some(server_name.to_string());
        Ok(())
    }

    pub fn evict_app(&mut self, app_name: &str) {
        if let Some(app) = self.apps.get_mut(app_name) {
            if let Some(server_name) = app.server.take() {
                if let Some(server) = self.servers.get_mut(&server_name) {
                    server.evict(app_name);
                }
            }
        }
    }

    /// Invariants 1, 2 and 4 from the testable-properties table:
    /// placement consistency, non-negative free capacity, and
    /// identity-group slot uniqueness. Invariant 3 (app.allocation's
    /// partition matches app.server.label) requires the allocation tree
    /// to be loaded, so it's checked by the loader once allocations and
    /// apps are both in place. 5 and 6 (round-trip and idempotence of
    /// `load_model`) are loader properties too, not the static model's.
    pub fn check_invariants(&self) -> Vec<ModelError> {
        let mut violations = Vec::new();

        for (name, app) in &self.apps {
            if let Some(server_name) = &app.server {
                match self.servers.get(server_name) {
                    Some(server) if server.apps.contains_key(name) => {}
                    _ => violations.push(ModelError::UnknownServer(server_name.clone())),
                }
            }
        }

        for (name, server) in &self.servers {
            if !server.free().is_non_negative() {
                violations.push(ModelError::InvalidCapacity(name.clone()));
            }
        }

        for (group_name, group) in &self.identity_groups {
            let mut seen = std::collections::HashSet::with_capacity(group.occupied());
            for app in self.apps.values() {
                if app.identity_group.as_deref() == Some(group_name.as_str()) {
                    if let Some(slot) = app.identity {
                        if !seen.insert(slot) {
                            violations.push(ModelError::IdentityGroupFull(group_name.clone()));
                        }
                    }
                }
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Bucket;

    fn cell_with_one_server() -> Cell {
        let mut cell = Cell::new("cell1");
        cell.attach_bucket(Bucket::new("rack:1", None, 0, None), None).unwrap();
        cell.add_server(Server::new(
            "s1",
            "rack:1",
            DEFAULT_PARTITION,
            Capacity::new(16000, 8000, 100000),
            0,
            100,
        ))
        .unwrap();
        cell
    }

    #[test]
    fn attach_bucket_rejects_self_parenting_cycle() {
        let mut cell = Cell::new("cell1");
        cell.attach_bucket(Bucket::new("rack:1", None, 0, None), None).unwrap();
        let err = cell
            .attach_bucket(Bucket::new("rack:1", None, 0, None), Some("rack:1"))
            .unwrap_err();
        assert_eq!(err, ModelError::CycleDetected("rack:1".into()));
    }

    #[test]
    fn traverse_finds_server_under_nested_buckets() {
        let mut cell = Cell::new("cell1");
        cell.attach_bucket(Bucket::new("building:1", None, 0, None), None).unwrap();
        cell.attach_bucket(Bucket::new("rack:1", None, 0, None), Some("building:1")).unwrap();
        cell.add_server(Server::new(
            "s1",
            "rack:1",
            DEFAULT_PARTITION,
            Capacity::new(1000, 1000, 1000),
            0,
            0,
        ))
        .unwrap();
        let found = cell.traverse("building:1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "s1");
    }

    #[test]
    fn capacity_aggregate_sums_across_bucket() {
        let cell = cell_with_one_server();
        let (total, used) = cell.capacity_aggregate("rack:1").unwrap();
        assert_eq!(total, Capacity::new(16000, 8000, 100000));
        assert_eq!(used, Capacity::ZERO);
    }

    #[test]
    fn place_and_evict_app_round_trips() {
        let mut cell = cell_with_one_server();
        cell.apps.insert(
            "proid.app#0000000001".into(),
            Application::new("proid.app#0000000001", 1, Capacity::new(1000, 100, 1000), "tenant", 3600),
        );
        cell.place_app("proid.app#0000000001", "s1").unwrap();
        assert_eq!(cell.servers["s1"].free(), Capacity::new(15000, 7900, 99000));
        assert!(cell.check_invariants().is_empty());

        cell.evict_app("proid.app#0000000001");
        assert_eq!(cell.servers["s1"].free(), Capacity::new(16000, 8000, 100000));
    }

    #[test]
    fn ensure_allocation_creates_missing_ancestors() {
        let mut cell = Cell::new("cell1");
        cell.ensure_allocation("tenant/sub:leaf", Capacity::new(100, 100, 100), 5);
        assert!(cell.allocations.contains_key("tenant"));
        assert!(cell.allocations.contains_key("tenant/sub:leaf"));
        assert!(cell.allocations["tenant"].sub_alloc.contains(&"tenant/sub:leaf".to_string()));
    }

    #[test]
    fn default_partition_missing_is_an_error() {
        let cell = Cell::new("cell1");
        assert_eq!(cell.default_partition().unwrap_err(), ModelError::NoDefaultPartition);
    }
}
