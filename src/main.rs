use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

mod fleet_logic;
use fleet_logic::{config, downstream, logger, scenario, simulator, state, store};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(
        config
            .log_dir
            .as_deref()
            .unwrap_or(Path::new(config::DEFAULT_LOG_DIR)),
        config
            .log_level
            .as_deref()
            .unwrap_or(config::DEFAULT_LOG_LEVEL),
    )?;

    let scenario_choice = scenario::Scenario::from_config(config.scenario.as_deref())?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = state::AppState::new(Arc::new(store::NoopStore));
    let device_simulator = simulator::DeviceSimulator::new(Duration::from_millis(
        config
            .tick_interval_ms
            .unwrap_or(config::DEFAULT_TICK_INTERVAL_MS),
    ));

    let pump_handle = tokio::spawn(scenario::run(
        config.clone(),
        scenario_choice,
        device_simulator.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    let downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(pump_handle, downstream_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
