//! The three things `treadmilld` can do: run the loader, run the
//! app-monitor, or perform a one-shot integrity check. Each acquires
//! (or skips) the leader lock appropriate to its role and owns its
//! `Loader`/`AppMonitorController` exclusively for the lifetime of the
//! run — no shared mutable state between roles, matching the
//! independently-elected single-writer model.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{error, info, warn};

use treadmill_backend::backend::acquire_leader_blocking;
use treadmill_backend::namespace;
use treadmill_backend::store::RedbBackend;
use treadmill_backend::{Backend, SessionId};
use treadmill_loader::Loader;
use treadmill_monitor::{AppMonitorController, InMemoryInstanceApi};

use crate::config::CellConfig;

pub(crate) fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Creation order for the placement sweep, derived from the trailing
/// `#NNNNNNNNNN` sequence in the instance name grammar rather than any
/// timestamp this workspace tracks separately.
fn instance_sequence(app_name: &str) -> u64 {
    app_name
        .rsplit('#')
        .next()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

fn open_backend(config: &CellConfig) -> anyhow::Result<Arc<dyn Backend>> {
    std::fs::create_dir_all(&config.backend.data_dir)?;
    let db_path = config.backend.data_dir.join("treadmill.redb");
    let backend = RedbBackend::open(&db_path)?;
    Ok(Arc::new(backend))
}

fn session_id() -> SessionId {
    SessionId(std::process::id() as u64)
}

fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
}

/// `treadmilld run loader` — acquires `/election/loader`, rebuilds the
/// cell model, then on every tick reconciles presence (driving the
/// up/down/frozen state machine), sweeps placement, and periodically
/// checks integrity, until shutdown or a fatal error.
pub async fn run_loader(config: CellConfig) -> anyhow::Result<()> {
    let backend = open_backend(&config)?;
    let session = session_id();
    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(shutdown.clone());

    let cell_name = config.cell.name.clone();
    let election_path = config.loader.election_path.clone();
    let integrity_interval_secs = config.loader.integrity_check_interval_secs as i64;

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let _lock = acquire_leader_blocking(backend.clone(), &election_path, session, Duration::from_secs(5))?;
        info!(cell = %cell_name, path = %election_path, "acquired loader leadership");

        let presence_backend = backend.clone();
        let mut loader = Loader::new(backend, &cell_name);
        loader.load_model()?;
        info!(
            servers = loader.cell.servers.len(),
            apps = loader.cell.apps.len(),
            "initial cell model loaded"
        );

        let mut last_integrity_check = epoch_secs();
        while !shutdown.load(Ordering::SeqCst) {
            let now = epoch_secs();

            let up_servers: HashSet<String> = presence_backend.list(namespace::SERVER_PRESENCE)?.into_iter().collect();
            loader.adjust_presence(&up_servers, now)?;

            let placed = loader.run_placement_sweep(now, instance_sequence)?;
            if !placed.is_empty() {
                info!(count = placed.len(), "placed pending apps");
            }

            if now - last_integrity_check >= integrity_interval_secs {
                loader.check_placement_integrity()?;
                last_integrity_check = now;
            }

            std::thread::sleep(Duration::from_millis(200));
        }

        info!("loader giving up leadership");
        Ok(())
    })
    .await?
}

/// `treadmilld run monitor` — acquires `/election/appmonitor`
/// independently of the loader's lock, then runs the App-Monitor
/// Controller on its ~1s tick.
///
/// The production Instance API (REST handlers, auth, the LDAP-backed
/// admin store) is out of scope for this workspace; this wires the
/// in-memory double so the command is runnable end to end against a
/// real coordination store for demonstration and local testing.
pub async fn run_monitor(config: CellConfig) -> anyhow::Result<()> {
    let backend = open_backend(&config)?;
    let session = session_id();
    let election_path = config.monitor.election_path.clone();

    let lock = tokio::task::spawn_blocking({
        let backend = backend.clone();
        move || acquire_leader_blocking(backend, &election_path, session, Duration::from_secs(5))
    })
    .await??;
    info!(cell = %config.cell.name, path = %config.monitor.election_path, "acquired app-monitor leadership");

    warn!("no production Instance API configured; running with the in-memory test double");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut controller = AppMonitorController::new(backend, InMemoryInstanceApi::new());
    controller
        .run(Duration::from_secs(config.monitor.tick_interval_secs), epoch_secs, shutdown_rx)
        .await?;
    drop(lock);
    Ok(())
}

/// `treadmilld check` — one-shot placement integrity check. Returns
/// `Ok(true)` when the model is consistent, `Ok(false)` on a resolvable
/// violation (caller exits non-zero), and `Err` on a store I/O failure.
pub async fn run_check(config: CellConfig) -> anyhow::Result<bool> {
    let backend = open_backend(&config)?;
    let cell_name = config.cell.name.clone();

    tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        let mut loader = Loader::new(backend, &cell_name);
        loader.load_model()?;
        match loader.check_placement_integrity() {
            Ok(()) => {
                info!(
                    servers = loader.cell.servers.len(),
                    apps = loader.cell.apps.len(),
                    "integrity check passed"
                );
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "integrity check failed");
                Ok(false)
            }
        }
    })
    .await?
}
