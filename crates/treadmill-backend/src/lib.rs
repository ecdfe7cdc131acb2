//! treadmill-backend — coordination-store adapter and namespace paths.
//!
//! This crate is the sole interface between the rest of Treadmill and
//! the external coordination store (a hierarchical, watchable,
//! ephemeral-node KV service). Everything above it — the resource
//! model, the loader, the placement engine, the app-monitor — talks to
//! the store only through the `Backend` trait and the `namespace::path`
//! helpers, never with a literal path string.
//!
//! # Architecture
//!
//! - **`backend`** — the `Backend` trait, leader-lock primitives, and
//!   the bounded ephemeral-create retry helper.
//! - **`store`** — `RedbBackend`, the redb-backed implementation (also
//!   usable purely in-memory, which stands in for a live coordination
//!   store in tests).
//! - **`namespace`** — pure path-building functions, one per domain
//!   concept (server, bucket, placement, scheduled app, endpoint,
//!   trace shard, ...).
//! - **`types`** — `Acl`, `SessionId`, `WatchEvent`, shared by the trait
//!   and its implementations.

pub mod backend;
pub mod error;
pub mod namespace;
pub mod store;
pub mod tables;
pub mod types;

pub use backend::{
    acquire_leader_blocking, create_ephemeral_with_retry, enter_election, Backend, Candidacy,
    LeaderLock, WatchCallback, WatchHandle,
};
pub use error::{BackendError, BackendResult};
pub use namespace::path;
pub use store::RedbBackend;
pub use types::{Acl, NodeData, SessionId, WatchEvent};
