//! treadmilld — the leader-elected cell control-plane binary.
//!
//! Assembles the workspace's subsystems into two independently-elected
//! roles, matching the concurrency model's "single-writer per cell via
//! a leader lock" rule applied separately to the loader and the
//! app-monitor:
//!
//! ```text
//! treadmilld run loader    -> /election/loader     -> Loader
//! treadmilld run monitor   -> /election/appmonitor -> AppMonitorController
//! treadmilld check         -> (no lock) one-shot integrity check
//! ```
//!
//! Exposed as a library as well as a binary so the CLI's command
//! bodies can be exercised directly in integration tests without
//! spawning a subprocess.

pub mod commands;
pub mod config;

pub use commands::{run_check, run_loader, run_monitor};
pub use config::CellConfig;
