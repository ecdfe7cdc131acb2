//! Buckets — topology nodes grouping servers (rack, row, building).
//!
//! The original's duck-typed node classes (Bucket/Server sharing an
//! `add_node`/`remove_node`/`traverse` capability) become this explicit
//! tagged child reference plus the `Node` capability on `Bucket` itself;
//! `Server` doesn't need the capability since it is always a leaf.

use serde::{Deserialize, Serialize};

/// A bucket's child is either another bucket or a server, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    Bucket(String),
    Server(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    /// Topology level, e.g. "rack", "building". Defaults to the prefix
    /// before the first `:` in the bucket name when not given explicitly.
    pub level: String,
    /// Bitmask of traits, inherited additively by descendants.
    pub traits: u32,
    /// `None` only for the implicit top-level attachment to `/cell`.
    pub parent: Option<String>,
    pub children: Vec<NodeRef>,
}

impl Bucket {
    pub fn new(name: &str, level: Option<&str>, traits: u32, parent: Option<&str>) -> Self {
        let level = level
            .map(str::to_string)
            .unwrap_or_else(|| default_level(name));
        Self {
            name: name.to_string(),
            level,
            traits,
            parent: parent.map(str::to_string),
            children: Vec::new(),
        }
    }

    pub fn add_node(&mut self, child: NodeRef) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn remove_node(&mut self, child: &NodeRef) {
        self.children.retain(|c| c != child);
    }

    pub fn reset_children(&mut self) {
        self.children.clear();
    }
}

/// Default level for a bucket name: the prefix before the first `:`.
pub fn default_level(bucket_name: &str) -> String {
    bucket_name
        .split(':')
        .next()
        .unwrap_or(bucket_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_splits_on_colon() {
        assert_eq!(default_level("rack:1"), "rack");
        assert_eq!(default_level("building"), "building");
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut b = Bucket::new("rack:1", None, 0, Some("building:1"));
        b.add_node(NodeRef::Server("s1".into()));
        b.add_node(NodeRef::Server("s1".into()));
        assert_eq!(b.children.len(), 1);
    }

    #[test]
    fn remove_node_drops_matching_child() {
        let mut b = Bucket::new("rack:1", None, 0, None);
        b.add_node(NodeRef::Server("s1".into()));
        b.add_node(NodeRef::Server("s2".into()));
        b.remove_node(&NodeRef::Server("s1".into()));
        assert_eq!(b.children, vec![NodeRef::Server("s2".into())]);
    }
}
