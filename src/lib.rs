pub mod camera;
pub mod diagnostics;
pub mod node;
pub mod pipeline;
pub mod settings;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use camera::error::CameraError;
use camera::simulated::{SimulatedSdk, SIMULATED_ENV};
use node::{NodeError, StereoNode};
use transport::local::LocalTransport;

/// How often the running node logs capture statistics.
const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(10);

/// Install the fmt subscriber, honouring `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

/// Binary entry: load config, bring the node up, stream until Ctrl-C.
///
/// `args` are the command-line arguments after the program name; the first
/// one, if present, is the config file path.
pub async fn run(args: impl Iterator<Item = String>) -> Result<(), NodeError> {
    init_tracing();

    let path = settings::store::config_path(args);
    let loaded = settings::store::load(path.as_deref())?;
    let config = loaded.config;

    if !SimulatedSdk::is_enabled() {
        return Err(NodeError::Initialization(CameraError::DriverUnavailable(
            format!("no vendor driver is linked; set {SIMULATED_ENV}=1 to run a simulated unit"),
        )));
    }
    let sdk = Arc::new(SimulatedSdk::new(config.serial_no.clone()));

    let node = StereoNode::start(sdk, &config, |config| {
        LocalTransport::advertise(config.queue_size)
    })?;

    let mut ticker = tokio::time::interval(DIAGNOSTICS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            _ = ticker.tick() => {
                let snapshot = node.diagnostics();
                match serde_json::to_string(&snapshot) {
                    Ok(json) => info!("Capture stats: {json}"),
                    Err(e) => warn!("Failed to serialise capture stats: {e}"),
                }
            }
        }
    }

    info!("Shutting down");
    let report = node.shutdown();
    if !report.is_clean() {
        warn!("Teardown finished with {} failed step(s)", report.failures.len());
    }
    Ok(())
}
