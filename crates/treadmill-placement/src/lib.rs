//! Placement engine — given the in-memory cell model, decides which
//! server hosts a given app.
//!
//! This crate owns no state of its own; it's a pure function of the
//! `Cell` handed to it by `treadmill-loader`, which applies the chosen
//! placement back onto the model.
//!
//! # Components
//!
//! - **`fits`** — the `fits` predicate and affinity-aware server ordering
//! - **`placer`** — depth-first tree search and app sweep ordering

pub mod fits;
pub mod placer;

pub use fits::{fits as server_fits, order_least_loaded, AffinityCounts};
pub use placer::{find_server, order_apps_for_sweep, place, PlacementError};
