//! redb table definition and the on-disk node record shape.

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::types::Acl;

/// Every node in the namespace, keyed by its full path, JSON-serialized.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Persisted representation of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub value: serde_json::Value,
    pub version: u64,
    pub acl: Acl,
    /// Session that owns this node if it is ephemeral; `None` for
    /// persistent nodes.
    pub ephemeral_session: Option<u64>,
}
