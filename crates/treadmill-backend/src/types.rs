//! Node-level types shared by the backend and its callers.

use serde::{Deserialize, Serialize};

/// Access rule attached to a node when it is created via `ensure_exists`/`put`.
///
/// Mirrors the original coordination store's ACL model closely enough to
/// let the in-process backend reject writes locally instead of round
/// tripping to a real service: `ServerOwned` nodes may only be written by
/// the caller presenting the matching `owner` session (servers write their
/// own presence and blackout reason; nothing else).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Acl {
    #[default]
    Open,
    ServerOwned,
    ReadOnly,
}

/// Identifies the session that created an ephemeral node.
///
/// A session's ephemeral nodes are all deleted together when the session
/// is closed, modeling coordination-store session expiry (leadership
/// loss, agent crash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// A data node's value plus enough metadata for conditional writes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub value: serde_json::Value,
    /// Monotonically increasing version, bumped on every successful write.
    pub version: u64,
}

/// Event delivered to a registered watch callback.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A data node's value changed (or it was created).
    DataChanged { path: String, value: serde_json::Value },
    /// A node's children changed; carries the full current child list.
    ChildrenChanged { path: String, children: Vec<String> },
    /// The node (or, for a children watch, its parent) was deleted.
    Deleted { path: String },
}
