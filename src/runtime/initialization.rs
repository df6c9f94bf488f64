//! # Initialization
//!
//! Sidecar startup: rustls setup, tracing, configuration, metrics, probe
//! server, Consul client, detector baseline and file watch.

use crate::config::{self, LogConfig, ServerConfig};
use crate::detector::{ChangeDetector, KeyMaterial};
use crate::keyring::{ConsulClient, KeyringClient, LeaderSource};
use crate::leadership::LeadershipGate;
use crate::observability;
use crate::rotation::RotationOrchestrator;
use crate::runtime::event_loop::EventLoop;
use crate::runtime::shutdown::cancel_on_signal;
use crate::runtime::watcher::FileWatcher;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything `main` needs to run the sidecar
#[derive(Debug)]
pub struct Runtime {
    pub event_loop: EventLoop<FileWatcher>,
    pub server_state: Arc<ServerState>,
    pub server_handle: JoinHandle<()>,
    pub cancel: CancellationToken,
}

impl Runtime {
    /// Run the event loop until shutdown, then stop the probe server
    ///
    /// # Errors
    ///
    /// Fails only when the probe server task panicked.
    pub async fn run(mut self) -> Result<()> {
        self.event_loop.run().await;

        self.cancel.cancel();
        self.server_handle
            .await
            .context("Probe server task panicked")?;
        info!("Gossip key rotator stopped");
        Ok(())
    }
}

/// Initialize the sidecar runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Configuration loading and validation
/// - Metrics registration
/// - Probe server startup
/// - Consul client creation
/// - Detector baseline, resumed from the keyring when enabled
/// - File watch and signal handling
pub async fn initialize() -> Result<Runtime> {
    // Must happen before any rustls client is built
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    let log_config = LogConfig::from_env();
    if let Err(e) = observability::logging::init_tracing(&log_config) {
        eprintln!("{e}");
    }
    if !provider_installed {
        debug!("rustls crypto provider already installed");
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting gossip key rotator");

    let (config, server_config) = config::load_config().context("Invalid configuration")?;
    info!(
        key_file = %config.key_file.display(),
        pod_ip = %config.pod_ip,
        consul = %config.consul.address,
        interval = ?config.reconcile_interval,
        "Configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let cancel = CancellationToken::new();
    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let shutdown = cancel.clone();
        let server_config = server_config.clone();
        tokio::spawn(async move {
            if let Err(e) = start_server(server_config, state, shutdown).await {
                error!(error = %e, "Probe server error");
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let consul = Arc::new(ConsulClient::new(&config.consul, config.rpc_timeout)?);
    let keyring: Arc<dyn KeyringClient> = Arc::clone(&consul) as Arc<dyn KeyringClient>;
    let leader: Arc<dyn LeaderSource> = consul as Arc<dyn LeaderSource>;

    let (mut detector, material) = ChangeDetector::initialize(&config.key_file)?;
    info!(fingerprint = %material.fingerprint(), "Loaded gossip key baseline");

    if config.resume_from_keyring {
        resume_baseline(&mut detector, &material, keyring.as_ref(), config.rpc_timeout).await;
    }
    drop(material);

    let watcher = FileWatcher::new(&config.key_file)?;

    let gate = LeadershipGate::new(leader, config.pod_ip, config.rpc_timeout);
    debug!(identity = %gate.identity(), "Mutating the keyring only while colocated with the Raft leader");
    let orchestrator = RotationOrchestrator::new(
        keyring,
        gate,
        config.retry.clone(),
        config.rpc_timeout,
        cancel.clone(),
    );
    let event_loop = EventLoop::new(
        watcher,
        detector,
        orchestrator,
        config.reconcile_interval,
        cancel.clone(),
    );

    // Detached; exits on its own once the token is cancelled
    let _signals = cancel_on_signal(cancel.clone());

    server_state.mark_ready();
    info!("Gossip key rotator initialized");

    Ok(Runtime {
        event_loop,
        server_state,
        server_handle,
        cancel,
    })
}

/// Drop the file baseline when the cluster is not yet on the file's key
///
/// After a shutdown mid-rotation the file already holds the new key, so the
/// file alone would look unchanged. Resetting the baseline lets the first
/// tick drive the rotation again. A failed listing keeps the baseline.
pub async fn resume_baseline(
    detector: &mut ChangeDetector,
    material: &KeyMaterial,
    keyring: &dyn KeyringClient,
    timeout: Duration,
) {
    let snapshot = match tokio::time::timeout(timeout, keyring.list()).await {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(e)) => {
            warn!(error = %e, "Unable to list keyring at startup, keeping file baseline");
            return;
        }
        Err(_) => {
            warn!(timeout = ?timeout, "Keyring listing timed out at startup, keeping file baseline");
            return;
        }
    };

    if snapshot.sole_primary() == Some(material.key()) {
        debug!("Cluster already uses the gossip key from the file");
    } else {
        info!(
            fingerprint = %material.fingerprint(),
            installed = snapshot.contains(material.key()),
            "Cluster is not on the gossip key from the file, resuming rotation"
        );
        detector.reset_baseline();
    }
}

/// Wait for the probe server to bind
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let start_time = tokio::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("Probe server failed to start"));
        }

        if server_state.is_listening() {
            info!("Probe server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > config.startup_timeout {
            return Err(anyhow::anyhow!(
                "Probe server failed to become ready within {} seconds",
                config.startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}
