//! The Loader — rebuilds the in-memory cell model from the coordination
//! store, keeps it current as servers and apps come and go, and
//! restores placements consistent with both the model and the store's
//! recorded state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use treadmill_backend::namespace::{self, path};
use treadmill_backend::{Acl, Backend, BackendError};
use treadmill_model::allocation::assignment_key;
use treadmill_model::{
    Application, Bucket, Capacity, Cell, IdentityGroup, Partition, Server, ServerState,
    DEFAULT_PARTITION,
};
use treadmill_placement::PlacementError;

use crate::error::{LoaderError, LoaderResult};
use crate::records::{
    AllocationRecord, BucketRecord, IdentityGroupRecord, PartitionRecord, PlacementEntry,
    PlacementStateRecord, PresenceRecord, ScheduledManifest, ServerRecord,
};

pub struct Loader {
    backend: Arc<dyn Backend>,
    pub cell: Cell,
}

impl Loader {
    pub fn new(backend: Arc<dyn Backend>, cell_name: &str) -> Self {
        Self {
            backend,
            cell: Cell::new(cell_name),
        }
    }

    fn get<T: serde::de::DeserializeOwned>(&self, node_path: &str) -> LoaderResult<Option<T>> {
        match self.backend.get(node_path) {
            Ok(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| LoaderError::Malformed {
                    path: node_path.to_string(),
                    source,
                }),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild the whole model from scratch, in dependency order:
    /// partitions, buckets, servers, allocations, apps, restored
    /// placements.
    pub fn load_model(&mut self) -> LoaderResult<()> {
        self.cell = Cell::new(&self.cell.name);
        self.load_partitions()?;

        for name in self.backend.list(namespace::BUCKETS)? {
            self.load_bucket(&name)?;
        }
        for name in self.backend.list(namespace::SERVERS)? {
            self.load_server(&name)?;
        }

        self.load_allocations()?;

        for name in self.backend.list(namespace::SCHEDULED)? {
            self.load_app(&name)?;
        }

        self.restore_placements()?;
        self.load_identity_groups()?;
        Ok(())
    }

    /// Loads each group's configured `count`, evicting any app whose
    /// slot falls out of range on a shrink, and drops groups whose
    /// config node has disappeared entirely.
    fn load_identity_groups(&mut self) -> LoaderResult<()> {
        let current: HashSet<String> = self.backend.list(namespace::IDENTITY_GROUPS)?.into_iter().collect();
        self.cell.identity_groups.retain(|name, _| current.contains(name));

        for name in &current {
            let Some(record): Option<IdentityGroupRecord> = self.get(&path::identity_group_config(name))? else {
                continue;
            };

            let evicted: Vec<String> = self
                .cell
                .identity_groups
                .get(name)
                .filter(|group| record.count < group.count)
                .map(|group| group.apps_from(record.count))
                .unwrap_or_default();
            for app_name in evicted {
                self.evict_identity_app(&app_name)?;
            }

            self.cell
                .identity_groups
                .entry(name.clone())
                .or_insert_with(|| IdentityGroup::new(name, record.count))
                .resize(record.count);
        }

        // Reconstruct occupancy from apps `restore_placements` already
        // brought back with a recorded identity, so their slots aren't
        // handed out again to a newly placed app.
        let occupants: Vec<(String, String, String, u32)> = self
            .cell
            .apps
            .values()
            .filter_map(|app| {
                let group = app.identity_group.clone()?;
                let slot = app.identity?;
                let host = app.server.clone()?;
                Some((group, app.name.clone(), host, slot))
            })
            .collect();
        for (group_name, app_name, host, slot) in occupants {
            if let Some(group) = self.cell.identity_groups.get_mut(&group_name) {
                group.occupy(slot, &host, &app_name);
            }
        }
        Ok(())
    }

    /// Evicts an app placed under a shrinking identity group: drops its
    /// placement record, releases the server capacity and the slot, and
    /// leaves the scheduled node alone — an external sweep re-places it.
    fn evict_identity_app(&mut self, app_name: &str) -> LoaderResult<()> {
        let server = self.cell.apps.get(app_name).and_then(|a| a.server.clone());
        if let Some(server) = server {
            self.backend.delete(&path::placement_entry(&server, app_name))?;
        }
        self.cell.evict_app(app_name);
        if let Some(app) = self.cell.apps.get_mut(app_name) {
            if let Some(group_name) = app.identity_group.clone() {
                if let Some(group) = self.cell.identity_groups.get_mut(&group_name) {
                    group.release(app_name);
                }
            }
            app.identity = None;
        }
        Ok(())
    }

    fn load_partitions(&mut self) -> LoaderResult<()> {
        for name in self.backend.list(namespace::PARTITIONS)? {
            let Some(record): Option<PartitionRecord> = self.get(&path::partition(&name))? else {
                continue;
            };
            let mut partition = Partition::new(&name, "");
            partition.reboot_schedule = record.reboot_schedule.map(treadmill_model::RebootSchedule);
            self.cell.partitions.insert(name, partition);
        }
        self.cell
            .partitions
            .entry(DEFAULT_PARTITION.to_string())
            .or_insert_with(|| Partition::new(DEFAULT_PARTITION, ""));
        Ok(())
    }

    /// Recursive and idempotent: reads the bucket's data, ensures its
    /// parent exists first, then attaches it once.
    pub fn load_bucket(&mut self, name: &str) -> LoaderResult<()> {
        if self.cell.buckets.contains_key(name) {
            return Ok(());
        }
        let Some(record): Option<BucketRecord> = self.get(&path::bucket(name))? else {
            warn!(bucket = name, "bucket configured but has no data, skipping");
            return Ok(());
        };

        if let Some(parent) = &record.parent {
            self.load_bucket(parent)?;
        }

        let bucket = Bucket::new(name, record.level.as_deref(), record.traits, record.parent.as_deref());
        self.cell.attach_bucket(bucket, record.parent.as_deref())?;
        Ok(())
    }

    /// Missing data means the server is configured but hasn't reported
    /// in yet — an expected steady state, logged at info. A missing
    /// parent bucket is unexpected and logged at warn.
    pub fn load_server(&mut self, name: &str) -> LoaderResult<()> {
        let Some(record): Option<ServerRecord> = self.get(&path::server(name))? else {
            info!(server = name, "server has no data yet, skipping");
            return Ok(());
        };

        if !self.cell.buckets.contains_key(&record.parent) {
            warn!(server = name, parent = %record.parent, "parent bucket missing, skipping server");
            return Ok(());
        }

        let capacity = Capacity::new(record.memory, record.cpu, record.disk);
        let server = Server::new(
            name,
            &record.parent,
            &record.partition,
            capacity,
            record.traits,
            record.up_since,
        );
        self.cell.add_server(server)?;

        self.backend
            .ensure_exists(&path::placement(name), serde_json::json!({}), Acl::ServerOwned)?;

        self.adjust_server_state(name, record.up_since)?;
        Ok(())
    }

    /// Compares capacity/traits/label/parent. Unchanged: only
    /// `up_since` propagates. Changed: the server is removed and
    /// reloaded wholesale, and any apps it was hosting are re-placed
    /// through `restore_placement` if they still fit.
    pub fn reload_server(&mut self, name: &str) -> LoaderResult<()> {
        let Some(record): Option<ServerRecord> = self.get(&path::server(name))? else {
            return Ok(());
        };
        let Some(existing) = self.cell.servers.get(name) else {
            return self.load_server(name);
        };

        let capacity = Capacity::new(record.memory, record.cpu, record.disk);
        let candidate = Server::new(
            name,
            &record.parent,
            &record.partition,
            capacity,
            record.traits,
            record.up_since,
        );

        if existing.structurally_equal(&candidate) {
            self.cell.servers.get_mut(name).unwrap().up_since = record.up_since;
            return Ok(());
        }

        let previously_placed: Vec<String> = existing.apps.keys().cloned().collect();
        self.cell.remove_server(name)?;
        for app_name in &previously_placed {
            if let Some(app) = self.cell.apps.get_mut(app_name) {
                app.server = None;
            }
        }

        self.load_server(name)?;
        if !previously_placed.is_empty() {
            self.restore_placement(name)?;
        }
        Ok(())
    }

    fn load_allocations(&mut self) -> LoaderResult<()> {
        let Some(records): Option<Vec<AllocationRecord>> = self.get(path::allocations_root())? else {
            return Ok(());
        };
        for record in records {
            let capacity = Capacity::new(record.memory, record.cpu, record.disk);
            self.cell.ensure_allocation(&record.name, capacity, record.rank);
            let alloc = self.cell.allocations.get_mut(&record.name).unwrap();
            alloc.rank_adjustment = record.rank_adjustment;
            alloc.max_utilization = record.max_utilization;

            if let Some(partition) = self.cell.partitions.get_mut(&record.partition) {
                partition.allocation = record.name.clone();
            }

            for assignment in record.assignments {
                let key = pattern_key(&assignment.pattern);
                alloc.assignments.entry(key).or_default().push(treadmill_model::Assignment {
                    pattern: assignment.pattern,
                    priority: assignment.priority,
                    allocation: record.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn load_app(&mut self, name: &str) -> LoaderResult<()> {
        let Some(manifest): Option<ScheduledManifest> = self.get(&path::scheduled(name))? else {
            return Ok(());
        };
        let allocation_name = self.find_assignment(name);
        let demand = Capacity::new(manifest.memory, manifest.cpu, manifest.disk);
        let mut app = Application::new(name, manifest.priority, demand, &allocation_name, manifest.lease);
        app.affinity = manifest.affinity;
        app.affinity_limits = manifest.affinity_limits;
        app.schedule_once = manifest.schedule_once;
        app.data_retention_timeout = manifest.data_retention_timeout;
        app.identity_group = manifest.identity_group;
        self.cell.apps.insert(name.to_string(), app);
        Ok(())
    }

    /// Assignment key is the substring between `@` and `.` if `@` is
    /// present, else the substring before the first `.`. Tries the
    /// default partition's root allocation's assignments under that
    /// key, first regex match wins. Falls back to a per-proid
    /// sub-allocation under the default partition at priority 1.
    pub fn find_assignment(&self, instance_name: &str) -> String {
        let key = assignment_key(instance_name);

        if let Ok(default_partition) = self.cell.default_partition() {
            if let Ok(root) = self.cell.allocation(&default_partition.allocation) {
                if let Some(assignment) = root.match_assignment(key, instance_name) {
                    return assignment.allocation.clone();
                }
            }
        }

        let proid = instance_name.split('.').next().unwrap_or(instance_name);
        format!("{DEFAULT_PARTITION}/{proid}")
    }

    /// List recorded apps placed at `server`, reconcile each against
    /// the model. Stale records (unknown app, no longer fits) are
    /// deleted; `schedule_once` apps that no longer fit are dropped
    /// from the model entirely rather than left pending indefinitely.
    /// Returns (listed, restored).
    pub fn restore_placement(&mut self, server: &str) -> LoaderResult<(usize, usize)> {
        let entries = self.backend.list(&path::placement(server))?;
        let listed = entries.len();
        let mut restored = 0;

        for app_name in entries {
            let entry_path = path::placement_entry(server, &app_name);

            if !self.cell.apps.contains_key(&app_name) {
                self.backend.delete(&entry_path)?;
                continue;
            }

            if restore_onto(&mut self.cell, &app_name, server) {
                restored += 1;
                if let Some(record): Option<PlacementEntry> = self.get(&entry_path)? {
                    if let Some(app) = self.cell.apps.get_mut(&app_name) {
                        app.identity = record.identity;
                        app.placement_expiry = record.expires;
                    }
                }
            } else {
                self.backend.delete(&entry_path)?;
                let schedule_once = self.cell.apps.get(&app_name).map(|a| a.schedule_once).unwrap_or(false);
                if schedule_once {
                    self.cell.apps.remove(&app_name);
                    self.backend.delete(&path::scheduled(&app_name))?;
                }
            }
        }

        Ok((listed, restored))
    }

    /// Restore placements for every known server, then clear every
    /// record for any app that ended up restored on more than one
    /// server — the placement sweep re-places it cleanly rather than
    /// leaving an ambiguous survivor.
    pub fn restore_placements(&mut self) -> LoaderResult<()> {
        let server_names: Vec<String> = self.cell.servers.keys().cloned().collect();
        for server in &server_names {
            self.restore_placement(server)?;
        }

        let mut restored_on: HashMap<String, Vec<String>> = HashMap::new();
        for (app_name, app) in &self.cell.apps {
            if let Some(server) = &app.server {
                restored_on.entry(app_name.clone()).or_default().push(server.clone());
            }
        }

        for (app_name, servers) in restored_on {
            if servers.len() > 1 {
                warn!(app = %app_name, servers = ?servers, "app restored on multiple servers, clearing all");
                for server in &servers {
                    self.backend.delete(&path::placement_entry(server, &app_name))?;
                    if let Some(s) = self.cell.servers.get_mut(server) {
                        s.evict(&app_name);
                    }
                }
                if let Some(app) = self.cell.apps.get_mut(&app_name) {
                    app.server = None;
                }
            }
        }
        Ok(())
    }

    /// Frozen state is authoritative from an explicit admin blackout
    /// record, never cleared by a presence bounce. Presence then
    /// decides up/down per `Server::adjust_for_presence`. On a
    /// transition into `down`, the server is dropped from its
    /// partition's membership set (it remains in the bucket tree) and
    /// the app's `/running`/`/endpoints` records are swept, since they
    /// describe a live instance and this server no longer has one. A
    /// down-to-up transition re-adds it to the partition. The resulting
    /// `{state,since}` is always persisted to the server's placement
    /// node so it survives a leader restart.
    pub fn adjust_server_state(&mut self, name: &str, now: i64) -> LoaderResult<()> {
        let presence: Option<PresenceRecord> = self.get(&path::server_presence(name))?;
        let present = presence.is_some();
        let frozen = self.backend.exists(&path::blackedout_server(name))?;

        let Some(server) = self.cell.servers.get_mut(name) else {
            return Ok(());
        };

        let previous_state = server.state;

        if frozen {
            if server.state != ServerState::Frozen {
                server.state = ServerState::Frozen;
                server.since = now;
            }
        } else if server.state == ServerState::Frozen {
            server.state = ServerState::Down;
            server.since = now;
        }
        server.adjust_for_presence(present, now);
        server.valid_until = presence.and_then(|p| p.valid_until);

        let new_state = server.state;
        let since = server.since;
        let partition_label = server.partition.clone();
        let apps_to_sweep: Vec<String> = if new_state == ServerState::Down {
            server.apps.keys().cloned().collect()
        } else {
            Vec::new()
        };

        if previous_state != ServerState::Down && new_state == ServerState::Down {
            if let Some(partition) = self.cell.partitions.get_mut(&partition_label) {
                partition.remove_server(name);
            }
        } else if previous_state == ServerState::Down && new_state != ServerState::Down {
            if let Some(partition) = self.cell.partitions.get_mut(&partition_label) {
                partition.add_server(name);
            }
        }

        if !apps_to_sweep.is_empty() {
            for app in &apps_to_sweep {
                self.backend.delete(&path::running(app))?;
                self.backend.delete(&path::endpoint_proid(app))?;
            }
            debug!(server = name, count = apps_to_sweep.len(), "swept running/endpoint records on down transition");
        }

        let record = PlacementStateRecord { state: state_label(new_state).to_string(), since };
        let value = serde_json::to_value(&record).map_err(|source| LoaderError::Malformed {
            path: path::placement(name),
            source,
        })?;
        self.backend.put(&path::placement(name), value)?;

        Ok(())
    }

    /// Reconciles the model against a freshly observed up-server set
    /// (normally delivered by a `/server.presence` children watch):
    /// loads any server not yet in the model, then recomputes state for
    /// everything the model already knows about.
    pub fn adjust_presence(&mut self, up_servers: &HashSet<String>, now: i64) -> LoaderResult<()> {
        let unknown: Vec<String> = up_servers
            .iter()
            .filter(|name| !self.cell.servers.contains_key(*name))
            .cloned()
            .collect();
        for name in unknown {
            self.load_server(&name)?;
        }

        let server_names: Vec<String> = self.cell.servers.keys().cloned().collect();
        for name in server_names {
            self.adjust_server_state(&name, now)?;
        }
        Ok(())
    }

    /// Builds app→server from the store's placement records and
    /// reconciles against the model's authoritative `app.server`,
    /// deleting any incorrect duplicate. An app with a placement record
    /// but no corresponding known app, or a model-authoritative server
    /// with no backing record at all, is an unresolvable integrity
    /// violation escalated to the caller.
    pub fn check_placement_integrity(&mut self) -> LoaderResult<()> {
        let mut found: HashMap<String, Vec<String>> = HashMap::new();
        for server in self.cell.servers.keys().cloned().collect::<Vec<_>>() {
            for app in self.backend.list(&path::placement(&server))? {
                found.entry(app).or_default().push(server.clone());
            }
        }

        for (app_name, servers) in &found {
            let authoritative = self.cell.apps.get(app_name).and_then(|a| a.server.clone());
            match authoritative {
                Some(correct) if servers.len() > 1 => {
                    for server in servers {
                        if server != &correct {
                            self.backend.delete(&path::placement_entry(server, app_name))?;
                        }
                    }
                }
                None => {
                    return Err(LoaderError::Integrity(format!(
                        "placement record for unknown app {app_name}"
                    )));
                }
                _ => {}
            }
        }

        for (app_name, app) in &self.cell.apps {
            if let Some(server) = &app.server {
                if !found.get(app_name).map(|s| s.contains(server)).unwrap_or(false) {
                    return Err(LoaderError::Integrity(format!(
                        "app {app_name} has server {server} but no placement record"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Run one placement sweep over every unplaced app, ordered by
    /// allocation rank, priority and `creation_order`. Apps that find no
    /// fit are left pending for the next sweep; this is a normal
    /// outcome, not propagated as an error.
    pub fn run_placement_sweep(
        &mut self,
        now: i64,
        creation_order: impl Fn(&str) -> u64,
    ) -> LoaderResult<Vec<String>> {
        let mut pending: Vec<String> = self
            .cell
            .apps
            .iter()
            .filter(|(_, app)| !app.is_placed())
            .map(|(name, _)| name.clone())
            .collect();

        pending.sort_by(|a, b| {
            let app_a = &self.cell.apps[a];
            let app_b = &self.cell.apps[b];
            allocation_rank(&self.cell, app_a)
                .cmp(&allocation_rank(&self.cell, app_b))
                .then_with(|| app_b.effective_priority().cmp(&app_a.effective_priority()))
                .then_with(|| creation_order(a).cmp(&creation_order(b)))
        });

        let mut placed = Vec::new();
        for app_name in pending {
            match treadmill_placement::place(&mut self.cell, &app_name) {
                Ok(server) => {
                    let identity = self.assign_identity(&app_name, &server)?;
                    let entry_path = path::placement_entry(&server, &app_name);
                    let value = serde_json::to_value(PlacementEntry {
                        state: "up".to_string(),
                        since: now,
                        identity,
                        expires: None,
                    })
                    .map_err(|source| LoaderError::Malformed { path: entry_path.clone(), source })?;
                    self.backend.put(&entry_path, value)?;
                    placed.push(app_name);
                }
                Err(PlacementError::NoFit { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(placed)
    }

    /// Assigns the lowest free slot of the app's identity group, if it
    /// has one, recording it on the app itself. Returns `None` for apps
    /// with no `identity_group`, since the placement entry has no slot
    /// to record for them.
    fn assign_identity(&mut self, app_name: &str, host: &str) -> LoaderResult<Option<u32>> {
        let Some(group_name) = self.cell.apps.get(app_name).and_then(|a| a.identity_group.clone()) else {
            return Ok(None);
        };
        let Some(group) = self.cell.identity_groups.get_mut(&group_name) else {
            warn!(app = app_name, group = %group_name, "app references unconfigured identity group, placing without identity");
            return Ok(None);
        };
        let slot = group.assign(host, app_name)?;
        if let Some(app) = self.cell.apps.get_mut(app_name) {
            app.identity = Some(slot);
        }
        Ok(Some(slot))
    }
}

fn state_label(state: ServerState) -> &'static str {
    match state {
        ServerState::Up => "up",
        ServerState::Down => "down",
        ServerState::Frozen => "frozen",
    }
}

/// Derives the assignment-table key for a stored pattern: the literal
/// prefix before the pattern's first regex metacharacter or dot,
/// typically the proid the pattern was written for.
fn pattern_key(pattern: &str) -> String {
    let unescaped: String = pattern.chars().filter(|c| *c != '\\').collect();
    unescaped.split('.').next().unwrap_or(&unescaped).to_string()
}

fn restore_onto(cell: &mut Cell, app_name: &str, server_name: &str) -> bool {
    let demand = match cell.apps.get(app_name) {
        Some(app) => app.demand,
        None => return false,
    };
    let fits = cell
        .servers
        .get(server_name)
        .map(|s| s.free().covers(&demand))
        .unwrap_or(false);
    if !fits {
        return false;
    }
    cell.place_app(app_name, server_name).is_ok()
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
    use treadmill_backend::store::RedbBackend;

    fn backend() -> Arc<dyn Backend> {
        Arc::new(RedbBackend::open_in_memory().unwrap())
    }

    fn seed_rack_and_server(backend: &Arc<dyn Backend>, memory: i64) {
        backend
            .put(&path::bucket("rack1"), serde_json::json!({"parent": null, "level": "rack", "traits": 0}))
            .unwrap();
        backend
            .put(
                &path::server("s1"),
                serde_json::json!({"parent": "rack1", "partition": "_default", "memory": memory, "cpu": 8000, "disk": 100000, "traits": 0, "up_since": 100}),
            )
            .unwrap();
        backend
            .ensure_exists(&path::server_presence("s1"), serde_json::json!({"valid_until": null}), Acl::ServerOwned)
            .unwrap();
    }

    #[test]
    fn restores_placement_after_leader_restart() {
        let backend = backend();
        seed_rack_and_server(&backend, 16000);
        backend
            .put(
                &path::scheduled("proid1.web#0000000001"),
                serde_json::json!({"priority": 5, "memory": 1000, "cpu": 100, "disk": 1000, "lease": 3600}),
            )
            .unwrap();
        backend
            .put(
                &path::placement_entry("s1", "proid1.web#0000000001"),
                serde_json::json!({"state": "up", "since": 200, "identity": null, "expires": null}),
            )
            .unwrap();

        let mut loader = Loader::new(backend, "cell1");
        loader.load_model().unwrap();

        let app = loader.cell.apps.get("proid1.web#0000000001").expect("app present");
        assert_eq!(app.server.as_deref(), Some("s1"));

        let server = &loader.cell.servers["s1"];
        assert_eq!(server.state, ServerState::Up);
        assert_eq!(server.free(), Capacity::new(15000, 7900, 99000));
    }

    #[test]
    fn presence_loss_marks_server_down_without_dropping_assignment() {
        let backend = backend();
        seed_rack_and_server(&backend, 16000);
        backend
            .put(
                &path::scheduled("proid1.web#0000000001"),
                serde_json::json!({"priority": 5, "memory": 1000, "cpu": 100, "disk": 1000, "lease": 3600}),
            )
            .unwrap();
        backend
            .put(
                &path::placement_entry("s1", "proid1.web#0000000001"),
                serde_json::json!({"state": "up", "since": 200, "identity": null, "expires": null}),
            )
            .unwrap();

        let mut loader = Loader::new(backend.clone(), "cell1");
        loader.load_model().unwrap();
        assert_eq!(loader.cell.servers["s1"].state, ServerState::Up);
        assert!(loader.cell.partitions[DEFAULT_PARTITION].servers.contains("s1"));

        backend.delete(&path::server_presence("s1")).unwrap();
        loader.adjust_presence(&HashSet::new(), 2000).unwrap();

        assert_eq!(loader.cell.servers["s1"].state, ServerState::Down);
        assert!(!loader.cell.partitions[DEFAULT_PARTITION].servers.contains("s1"));
        assert!(backend.exists(&path::placement_entry("s1", "proid1.web#0000000001")).unwrap());
    }

    #[test]
    fn schedule_once_app_is_dropped_when_shrink_no_longer_fits() {
        let backend = backend();
        seed_rack_and_server(&backend, 16000);
        backend
            .put(
                &path::scheduled("proid1.web#0000000001"),
                serde_json::json!({"priority": 5, "memory": 1000, "cpu": 100, "disk": 1000, "lease": 3600, "schedule_once": true}),
            )
            .unwrap();
        backend
            .put(
                &path::placement_entry("s1", "proid1.web#0000000001"),
                serde_json::json!({"state": "up", "since": 200, "identity": null, "expires": null}),
            )
            .unwrap();

        let mut loader = Loader::new(backend.clone(), "cell1");
        loader.load_model().unwrap();
        assert!(loader.cell.apps.contains_key("proid1.web#0000000001"));

        backend
            .put(
                &path::server("s1"),
                serde_json::json!({"parent": "rack1", "partition": "_default", "memory": 500, "cpu": 8000, "disk": 100000, "traits": 0, "up_since": 100}),
            )
            .unwrap();
        loader.reload_server("s1").unwrap();

        assert!(!loader.cell.apps.contains_key("proid1.web#0000000001"));
        assert!(!backend.exists(&path::scheduled("proid1.web#0000000001")).unwrap());
    }

    #[test]
    fn duplicate_placement_is_resolved_against_authoritative_server() {
        let backend = backend();
        backend
            .put(&path::bucket("rack1"), serde_json::json!({"parent": null, "level": "rack", "traits": 0}))
            .unwrap();
        for name in ["s1", "s2"] {
            backend
                .put(
                    &path::server(name),
                    serde_json::json!({"parent": "rack1", "partition": "_default", "memory": 16000, "cpu": 8000, "disk": 100000, "traits": 0, "up_since": 100}),
                )
                .unwrap();
            backend
                .ensure_exists(&path::server_presence(name), serde_json::json!({"valid_until": null}), Acl::ServerOwned)
                .unwrap();
        }
        backend
            .put(&path::scheduled("app1#0000000001"), serde_json::json!({"priority": 5, "memory": 100, "cpu": 10, "disk": 100, "lease": 3600}))
            .unwrap();

        let mut loader = Loader::new(backend.clone(), "cell1");
        loader.load_model().unwrap();
        loader.cell.place_app("app1#0000000001", "s1").unwrap();
        backend
            .put(&path::placement_entry("s1", "app1#0000000001"), serde_json::json!({"state": "up", "since": 1, "identity": null, "expires": null}))
            .unwrap();
        backend
            .put(&path::placement_entry("s2", "app1#0000000001"), serde_json::json!({"state": "up", "since": 1, "identity": null, "expires": null}))
            .unwrap();

        loader.check_placement_integrity().unwrap();

        assert!(backend.exists(&path::placement_entry("s1", "app1#0000000001")).unwrap());
        assert!(!backend.exists(&path::placement_entry("s2", "app1#0000000001")).unwrap());
    }

    #[test]
    fn placement_sweep_places_a_pending_app() {
        let backend = backend();
        seed_rack_and_server(&backend, 16000);
        backend
            .put(&path::scheduled("proid1.web#0000000001"), serde_json::json!({"priority": 5, "memory": 1000, "cpu": 100, "disk": 1000, "lease": 3600}))
            .unwrap();

        let mut loader = Loader::new(backend.clone(), "cell1");
        loader.load_model().unwrap();
        assert!(!loader.cell.apps["proid1.web#0000000001"].is_placed());

        let placed = loader.run_placement_sweep(500, |n| n.len() as u64).unwrap();
        assert_eq!(placed, vec!["proid1.web#0000000001".to_string()]);
        assert_eq!(loader.cell.apps["proid1.web#0000000001"].server.as_deref(), Some("s1"));
        assert!(backend.exists(&path::placement_entry("s1", "proid1.web#0000000001")).unwrap());
    }

    #[test]
    fn placement_sweep_assigns_lowest_free_identity_slot() {
        let backend = backend();
        seed_rack_and_server(&backend, 16000);
        backend.put(&path::identity_group_config("ids"), serde_json::json!({"count": 4})).unwrap();
        backend
            .put(&path::scheduled("proid1.web#0000000001"), serde_json::json!({"priority": 5, "memory": 1000, "cpu": 100, "disk": 1000, "lease": 3600, "identity_group": "ids"}))
            .unwrap();

        let mut loader = Loader::new(backend.clone(), "cell1");
        loader.load_model().unwrap();
        loader.run_placement_sweep(500, |n| n.len() as u64).unwrap();

        let app = &loader.cell.apps["proid1.web#0000000001"];
        assert_eq!(app.identity, Some(0));
        let entry: PlacementEntry =
            serde_json::from_value(backend.get(&path::placement_entry("s1", "proid1.web#0000000001")).unwrap()).unwrap();
        assert_eq!(entry.identity, Some(0));
    }

    #[test]
    fn shrinking_identity_group_evicts_out_of_range_apps() {
        let backend = backend();
        seed_rack_and_server(&backend, 16000);
        backend.put(&path::identity_group_config("ids"), serde_json::json!({"count": 2})).unwrap();
        backend
            .put(&path::scheduled("proid1.web#0000000001"), serde_json::json!({"priority": 5, "memory": 1000, "cpu": 100, "disk": 1000, "lease": 3600, "identity_group": "ids"}))
            .unwrap();
        backend
            .put(&path::scheduled("proid1.web#0000000002"), serde_json::json!({"priority": 5, "memory": 1000, "cpu": 100, "disk": 1000, "lease": 3600, "identity_group": "ids"}))
            .unwrap();

        let mut loader = Loader::new(backend.clone(), "cell1");
        loader.load_model().unwrap();
        loader.run_placement_sweep(500, |n| n.len() as u64).unwrap();
        assert_eq!(loader.cell.apps["proid1.web#0000000001"].identity, Some(0));
        assert_eq!(loader.cell.apps["proid1.web#0000000002"].identity, Some(1));

        backend.put(&path::identity_group_config("ids"), serde_json::json!({"count": 1})).unwrap();
        loader.load_identity_groups().unwrap();

        assert!(loader.cell.apps["proid1.web#0000000001"].is_placed());
        assert!(!loader.cell.apps["proid1.web#0000000002"].is_placed());
        assert_eq!(loader.cell.apps["proid1.web#0000000002"].identity, None);
        assert!(!backend.exists(&path::placement_entry("s1", "proid1.web#0000000002")).unwrap());
    }
}
