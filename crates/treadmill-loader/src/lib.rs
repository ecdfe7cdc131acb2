//! treadmill-loader — rebuilds and maintains the in-memory cell model
//! from the coordination store, and restores/re-places app workloads.
//!
//! # Architecture
//!
//! ```text
//! Loader
//!   ├── Backend (read buckets/servers/allocations/scheduled apps)
//!   ├── Cell (the in-memory model it owns and mutates)
//!   └── treadmill-placement (called during the sweep for unplaced apps)
//! ```
//!
//! The Loader is the only thing in this workspace that both reads the
//! coordination store and mutates the resource model; everything else
//! either talks to the store (`treadmill-backend`) or works purely over
//! the model (`treadmill-model`, `treadmill-placement`).

pub mod error;
pub mod loader;
pub mod records;

pub use error::{LoaderError, LoaderResult};
pub use loader::Loader;
