//! `treadmill.toml` layered configuration.
//!
//! Mirrors the teacher's `WarpConfig`: a typed struct tree parsed with
//! `toml` + `serde`, a `from_file` loader, and a `scaffold` constructor
//! for `treadmilld init`-style workflows (none of which this crate
//! exposes yet — `scaffold` exists for tests and for a future command).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellConfig {
    pub cell: CellSection,
    pub backend: BackendSection,
    #[serde(default)]
    pub loader: LoaderSection,
    #[serde(default)]
    pub monitor: MonitorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSection {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    /// Directory holding the redb-backed coordination store file.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSection {
    #[serde(default = "default_loader_election_path")]
    pub election_path: String,
    #[serde(default = "default_integrity_interval_secs")]
    pub integrity_check_interval_secs: u64,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            election_path: default_loader_election_path(),
            integrity_check_interval_secs: default_integrity_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_monitor_election_path")]
    pub election_path: String,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            election_path: default_monitor_election_path(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

fn default_loader_election_path() -> String {
    "/election/loader".to_string()
}

fn default_monitor_election_path() -> String {
    "/election/appmonitor".to_string()
}

fn default_integrity_interval_secs() -> u64 {
    30
}

fn default_tick_interval_secs() -> u64 {
    1
}

impl CellConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CellConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a minimal `treadmill.toml` for a named cell.
    pub fn scaffold(cell_name: &str, data_dir: &str) -> Self {
        CellConfig {
            cell: CellSection { name: cell_name.to_string() },
            backend: BackendSection { data_dir: PathBuf::from(data_dir) },
            loader: LoaderSection::default(),
            monitor: MonitorSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_round_trips_through_toml() {
        let config = CellConfig::scaffold("cell001", "/var/lib/treadmill");
        let toml_str = config.to_toml_string().unwrap();
        let parsed: CellConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.cell.name, "cell001");
        assert_eq!(parsed.loader.election_path, "/election/loader");
    }

    #[test]
    fn minimal_toml_fills_in_defaults() {
        let toml_str = r#"
[cell]
name = "cell001"

[backend]
data_dir = "/var/lib/treadmill"
"#;
        let config: CellConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.monitor.tick_interval_secs, 1);
        assert_eq!(config.loader.integrity_check_interval_secs, 30);
    }
}
