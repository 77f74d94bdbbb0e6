//! Load scenario state machine and the tick pump. The controller counts
//! pump ticks and decides when the stress window opens and closes; the
//! pump applies those transitions to the simulator and pushes each tick's
//! batch through the registry.

use crate::fleet_logic::config::{
    Config, DEFAULT_STRESS_TICKS, DEFAULT_TICK_INTERVAL_MS, DEFAULT_WARMUP_TICKS,
};
use crate::fleet_logic::simulator::{DeviceSimulator, DEFAULT_DEVICE_COUNT};
use crate::fleet_logic::state::AppState;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

/// Startup-selected load scenario. There is no runtime switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Steady pumping at the configured device count, indefinitely.
    Normal,
    /// One warm-up window, one stress window, then Normal forever.
    High,
}

impl Scenario {
    pub fn from_config(value: Option<&str>) -> anyhow::Result<Scenario> {
        match value.unwrap_or("normal") {
            "normal" => Ok(Scenario::Normal),
            "high" => Ok(Scenario::High),
            other => anyhow::bail!(
                "unrecognized scenario {other:?}, expected \"normal\" or \"high\""
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Stress,
}

/// Load change the pump must apply to the simulator this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    EnterStress,
    ExitStress,
}

/// Tick-counted mode machine. Time never appears here, so the full
/// timeline can be driven tick by tick in tests.
pub struct ModeController {
    scenario: Scenario,
    warmup_ticks: u64,
    stress_ticks: u64,
    ticks: u64,
    mode: Mode,
}

impl ModeController {
    pub fn new(scenario: Scenario, warmup_ticks: u64, stress_ticks: u64) -> Self {
        Self {
            scenario,
            warmup_ticks,
            stress_ticks,
            ticks: 0,
            mode: Mode::Normal,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Counts one pump tick and reports the transition, if any, that falls
    /// on it. After the stress window closes the controller stays Normal
    /// for good.
    pub fn advance(&mut self) -> Option<Transition> {
        let tick = self.ticks;
        self.ticks += 1;

        if self.scenario != Scenario::High {
            return None;
        }
        match self.mode {
            Mode::Normal if tick == self.warmup_ticks => {
                self.mode = Mode::Stress;
                Some(Transition::EnterStress)
            }
            Mode::Stress if tick == self.warmup_ticks + self.stress_ticks => {
                self.mode = Mode::Normal;
                Some(Transition::ExitStress)
            }
            _ => None,
        }
    }
}

/// Runs the generate-classify-broadcast cycle once per interval until
/// shutdown. The simulator is started here and stopped on the way out.
pub async fn run(
    config: Config,
    scenario: Scenario,
    simulator: DeviceSimulator,
    app_state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) {
    let device_count = config.device_count.unwrap_or(DEFAULT_DEVICE_COUNT);
    let mut controller = ModeController::new(
        scenario,
        config.warmup_ticks.unwrap_or(DEFAULT_WARMUP_TICKS),
        config.stress_ticks.unwrap_or(DEFAULT_STRESS_TICKS),
    );

    simulator.start(Some(device_count), Some(false));
    log::info!(
        "Pump started: {:?} scenario, {} devices",
        scenario,
        device_count
    );

    let mut ticker = interval(Duration::from_millis(
        config.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
    ));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Pump received shutdown signal.");
                break;
            }
            _ = ticker.tick() => {
                match controller.advance() {
                    Some(Transition::EnterStress) => {
                        simulator.set_high_concurrency(true);
                        log::info!(
                            "Entering stress mode: device count raised to {}",
                            simulator.device_count()
                        );
                    }
                    Some(Transition::ExitStress) => {
                        simulator.disable_high_concurrency();
                        log::info!(
                            "Stress window over: device count back to {}",
                            simulator.device_count()
                        );
                    }
                    None => {}
                }

                let batch = simulator.latest_data();
                if batch.is_empty() {
                    continue;
                }
                let report = app_state.broadcast(&batch);
                log::debug!(
                    "tick {}: {} readings to {} subscriber(s), {} queued",
                    controller.ticks(),
                    report.readings,
                    report.subscribers,
                    report.delivered
                );
                if !report.faulted.is_empty() {
                    log::warn!(
                        "{} subscriber(s) missed tick {}",
                        report.faulted.len(),
                        controller.ticks()
                    );
                }
            }
        }
    }

    simulator.stop();
}
