//! Coordination-store namespace paths.
//!
//! Pure functions mapping domain concepts to string paths. Every
//! subsystem goes through here rather than building paths with ad hoc
//! string formatting, so the on-the-wire layout is defined in exactly
//! one place.

pub const ALLOCATIONS: &str = "/allocations";
pub const APPMONITORS: &str = "/app-monitors";
pub const APPGROUP_LOOKUP: &str = "/appgroup-lookups";
pub const BLACKEDOUT_APPS: &str = "/blackedout.apps";
pub const BLACKEDOUT_SERVERS: &str = "/blackedout.servers";
pub const BUCKETS: &str = "/buckets";
pub const CELL: &str = "/cell";
pub const ELECTION: &str = "/election";
pub const ENDPOINTS: &str = "/endpoints";
pub const IDENTITY_GROUPS: &str = "/identity-groups";
pub const PARTITIONS: &str = "/partitions";
pub const PLACEMENT: &str = "/placement";
pub const RUNNING: &str = "/running";
pub const SCHEDULED: &str = "/scheduled";
pub const SERVERS: &str = "/servers";
pub const SERVER_PRESENCE: &str = "/server.presence";
pub const STATE_REPORTS: &str = "/reports";
pub const TRACE: &str = "/trace";

/// Number of trace shards. Fixed by the spec, never configurable.
pub const TRACE_SHARDS_COUNT: u32 = 256;

fn join(root: &str, child: &str) -> String {
    format!("{root}/{child}")
}

/// Path helpers for each namespace root, following `path::server("s1")`
/// call-site style instead of raw string concatenation.
pub mod path {
    use super::*;

    pub fn allocation(name: &str) -> String {
        join(ALLOCATIONS, name)
    }

    pub fn allocations_root() -> &'static str {
        ALLOCATIONS
    }

    pub fn appmonitor(name: &str) -> String {
        join(APPMONITORS, name)
    }

    pub fn appmonitors_root() -> &'static str {
        APPMONITORS
    }

    pub fn appgroup_lookup(proid: &str, sha1_hex: &str) -> String {
        format!("{APPGROUP_LOOKUP}/{proid}/{sha1_hex}")
    }

    pub fn blackedout_app(name: &str) -> String {
        join(BLACKEDOUT_APPS, name)
    }

    pub fn blackedout_server(name: &str) -> String {
        join(BLACKEDOUT_SERVERS, name)
    }

    pub fn bucket(name: &str) -> String {
        join(BUCKETS, name)
    }

    pub fn cell() -> &'static str {
        CELL
    }

    pub fn election(role: &str) -> String {
        join(ELECTION, role)
    }

    pub fn identity_group(group: &str, slot: &str) -> String {
        format!("{IDENTITY_GROUPS}/{group}/{slot}")
    }

    /// The group's own config node (`{count}`), distinct from its
    /// per-slot ephemeral member children.
    pub fn identity_group_config(group: &str) -> String {
        join(IDENTITY_GROUPS, group)
    }

    pub fn identity_groups_root() -> &'static str {
        IDENTITY_GROUPS
    }

    pub fn partition(name: &str) -> String {
        join(PARTITIONS, name)
    }

    pub fn placement(server: &str) -> String {
        join(PLACEMENT, server)
    }

    pub fn placement_entry(server: &str, app: &str) -> String {
        format!("{PLACEMENT}/{server}/{app}")
    }

    pub fn running(appname: &str) -> String {
        join(RUNNING, appname)
    }

    pub fn scheduled(appname: &str) -> String {
        join(SCHEDULED, appname)
    }

    pub fn scheduled_root() -> &'static str {
        SCHEDULED
    }

    pub fn server(name: &str) -> String {
        join(SERVERS, name)
    }

    pub fn servers_root() -> &'static str {
        SERVERS
    }

    pub fn server_presence(name: &str) -> String {
        join(SERVER_PRESENCE, name)
    }

    pub fn server_presence_root() -> &'static str {
        SERVER_PRESENCE
    }

    pub fn state_report(report_type: &str) -> String {
        join(STATE_REPORTS, report_type)
    }

    /// Endpoint path for an app instance name `<proid>.<rest>`:
    /// `/endpoints/<proid>/<rest>:<proto>:<name>`.
    pub fn endpoint(instance_name: &str, proto: &str, name: &str) -> String {
        let (proid, rest) = split_proid(instance_name);
        format!("{ENDPOINTS}/{proid}/{rest}:{proto}:{name}")
    }

    /// Proid-level endpoint parent path for an app instance name.
    pub fn endpoint_proid(instance_name: &str) -> String {
        let (proid, _rest) = split_proid(instance_name);
        format!("{ENDPOINTS}/{proid}")
    }

    fn split_proid(instance_name: &str) -> (&str, &str) {
        match instance_name.split_once('.') {
            Some((proid, rest)) => (proid, rest),
            None => (instance_name, ""),
        }
    }

    /// Trace shard path for a raw shard id (`instance_id mod 256`),
    /// formatted as 4 uppercase hex digits.
    pub fn trace_shard(shard_id: u32) -> String {
        format!("{TRACE}/{:04X}", shard_id % TRACE_SHARDS_COUNT)
    }

    /// All 256 trace shard paths, in order.
    pub fn trace_shards() -> Vec<String> {
        (0..TRACE_SHARDS_COUNT).map(trace_shard).collect()
    }

    /// Trace event path for an instance name `<proid>.<app>#<id>`.
    ///
    /// The shard is derived from the numeric suffix after `#`, not the
    /// whole instance name.
    pub fn trace(instance_name: &str, event: Option<&str>) -> String {
        let instance_id: u32 = instance_name
            .rsplit_once('#')
            .and_then(|(_, id)| id.parse().ok())
            .unwrap_or(0);
        let shard = instance_id % TRACE_SHARDS_COUNT;
        match event {
            Some(event) => format!("{TRACE}/{shard:04X}/{instance_name},{event}"),
            None => format!("{TRACE}/{shard:04X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_bucket_paths() {
        assert_eq!(path::server("s1"), "/servers/s1");
        assert_eq!(path::bucket("rack1"), "/buckets/rack1");
        assert_eq!(path::server_presence("s1"), "/server.presence/s1");
    }

    #[test]
    fn placement_paths() {
        assert_eq!(path::placement("s1"), "/placement/s1");
        assert_eq!(
            path::placement_entry("s1", "proid1.web#0000000001"),
            "/placement/s1/proid1.web#0000000001"
        );
    }

    #[test]
    fn endpoint_path_splits_on_first_dot() {
        assert_eq!(
            path::endpoint("proid1.web.foo", "tcp", "http"),
            "/endpoints/proid1/web.foo:tcp:http"
        );
        assert_eq!(path::endpoint_proid("proid1.web"), "/endpoints/proid1");
    }

    #[test]
    fn trace_shard_formats_four_hex_digits() {
        assert_eq!(path::trace_shard(0), "/trace/0000");
        assert_eq!(path::trace_shard(255), "/trace/00FF");
        // Wraps at 256.
        assert_eq!(path::trace_shard(256), "/trace/0000");
    }

    #[test]
    fn trace_shards_lists_all_256() {
        let shards = path::trace_shards();
        assert_eq!(shards.len(), 256);
        assert_eq!(shards[0], "/trace/0000");
        assert_eq!(shards[255], "/trace/00FF");
    }

    #[test]
    fn trace_path_derives_shard_from_instance_suffix() {
        let p = path::trace("proid1.web#0000000001", Some("configured"));
        assert_eq!(p, "/trace/0001/proid1.web#0000000001,configured");
    }

    #[test]
    fn election_and_appmonitor_paths() {
        assert_eq!(path::election("loader"), "/election/loader");
        assert_eq!(path::appmonitor("proid1.web"), "/app-monitors/proid1.web");
    }
}
