//! In-memory cell resource model: buckets, servers, partitions,
//! allocations, apps and identity groups, plus the invariants the
//! scheduling loop is expected to uphold.
//!
//! This crate never talks to the coordination store. It's built and
//! mutated by the loader (`treadmill-loader`) from data read through
//! `treadmill-backend`, and queried by the placement engine
//! (`treadmill-placement`).

pub mod allocation;
pub mod application;
pub mod bucket;
pub mod capacity;
pub mod cell;
pub mod error;
pub mod identity;
pub mod partition;
pub mod server;

pub use allocation::{Allocation, Assignment};
pub use application::Application;
pub use bucket::{Bucket, NodeRef};
pub use capacity::Capacity;
pub use cell::Cell;
pub use error::{ModelError, ModelResult};
pub use identity::IdentityGroup;
pub use partition::{Partition, RebootSchedule, DEFAULT_PARTITION};
pub use server::{Server, ServerState};
