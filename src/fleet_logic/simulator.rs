//! Simulated device population. A periodic task synthesizes one batch of
//! readings per tick; the load profile (device count, high-concurrency
//! mode) is adjustable at runtime without restarting the tick.

use crate::fleet_logic::model::{
    DeviceState, EnvironmentKind, GeoPoint, MetricCategory, Payload, Reading, TelemetryKind,
    READINGS_PER_DEVICE,
};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_DEVICE_COUNT: usize = 100;
/// Floor applied to the device count whenever high-concurrency mode is on.
pub const HIGH_LOAD_FLOOR: usize = 50_000;

// The fleet is scattered around a fixed center with per-tick jitter.
const FLEET_CENTER_LAT: f64 = 39.0;
const FLEET_CENTER_LNG: f64 = 116.0;

const TEMPERATURE_UNIT: &str = "°C";

struct Inner {
    running: bool,
    high_load: bool,
    device_count: usize,
    latest: Arc<Vec<Reading>>,
    stop_token: Option<CancellationToken>,
}

#[derive(Clone)]
pub struct DeviceSimulator {
    inner: Arc<Mutex<Inner>>,
    tick_interval: Duration,
}

impl DeviceSimulator {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                running: false,
                high_load: false,
                device_count: DEFAULT_DEVICE_COUNT,
                latest: Arc::new(Vec::new()),
                stop_token: None,
            })),
            tick_interval,
        }
    }

    /// Starts the periodic tick, applying any overrides first. Calling
    /// `start` while already running is a no-op.
    pub fn start(&self, device_count: Option<usize>, high_load: Option<bool>) {
        let mut inner = self.lock();
        if inner.running {
            return;
        }
        inner.running = true;
        if let Some(count) = device_count {
            inner.device_count = count;
        }
        if let Some(flag) = high_load {
            inner.high_load = flag;
        }
        if inner.high_load {
            inner.device_count = inner.device_count.max(HIGH_LOAD_FLOOR);
        }
        // A non-positive count is a configuration bug, not a runtime state.
        assert!(inner.device_count > 0, "device count must be positive");

        let token = CancellationToken::new();
        inner.stop_token = Some(token.clone());
        drop(inner);

        let shared = Arc::clone(&self.inner);
        let tick_interval = self.tick_interval;
        tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let count = shared
                            .lock()
                            .expect("simulator state lock poisoned")
                            .device_count;
                        let timestamp = chrono::Utc::now().timestamp_millis();
                        let batch = generate_batch(count, timestamp, &mut rand::rng());
                        shared
                            .lock()
                            .expect("simulator state lock poisoned")
                            .latest = Arc::new(batch);
                    }
                }
            }
        });
    }

    /// Cancels the periodic tick. The last generated batch stays readable.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if let Some(token) = inner.stop_token.take() {
            token.cancel();
        }
        inner.running = false;
    }

    /// Raises the device count to the high-load floor. Does not start
    /// generation when the simulator is stopped.
    pub fn set_high_concurrency(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.high_load = enabled;
        if enabled {
            inner.device_count = inner.device_count.max(HIGH_LOAD_FLOOR);
        }
    }

    /// Leaves high-concurrency mode and restores the default population.
    pub fn disable_high_concurrency(&self) {
        let mut inner = self.lock();
        inner.high_load = false;
        inner.device_count = DEFAULT_DEVICE_COUNT;
    }

    /// Snapshot of the most recent batch. Replaced wholesale on the next
    /// tick, so callers must not hold it as stable state.
    pub fn latest_data(&self) -> Arc<Vec<Reading>> {
        Arc::clone(&self.lock().latest)
    }

    pub fn device_count(&self) -> usize {
        self.lock().device_count
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn high_load(&self) -> bool {
        self.lock().high_load
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("simulator state lock poisoned")
    }
}

/// Synthesizes the full batch for one tick: six readings per device, all
/// sharing `timestamp`. Pure in everything but the RNG, so tests can seed it.
pub fn generate_batch(device_count: usize, timestamp: i64, rng: &mut impl Rng) -> Vec<Reading> {
    assert!(device_count > 0, "device count must be positive");
    let mut batch = Vec::with_capacity(device_count * READINGS_PER_DEVICE);

    for i in 0..device_count {
        let device_id = format!("device_{i}");
        let location = GeoPoint {
            lat: FLEET_CENTER_LAT + rng.random_range(0.0..1.0),
            lng: FLEET_CENTER_LNG + rng.random_range(0.0..1.0),
            accuracy: Some(f64::from(rng.random_range(1..=10))),
        };
        // Drawn once per device; feeds both the online metric and the
        // device-status reading.
        let status = DeviceState::ALL[rng.random_range(0..DeviceState::ALL.len())];

        batch.push(Reading {
            device_id: device_id.clone(),
            timestamp,
            location: Some(location.clone()),
            data_status: None,
            payload: Payload::CoreMetric {
                category: MetricCategory::Cpu,
                value: rng.random_range(0.0..100.0),
            },
        });
        batch.push(Reading {
            device_id: device_id.clone(),
            timestamp,
            location: Some(location.clone()),
            data_status: None,
            payload: Payload::CoreMetric {
                category: MetricCategory::Memory,
                value: rng.random_range(0.0..100.0),
            },
        });
        batch.push(Reading {
            device_id: device_id.clone(),
            timestamp,
            location: Some(location.clone()),
            data_status: None,
            payload: Payload::CoreMetric {
                category: MetricCategory::Network,
                value: rng.random_range(0.0..200.0),
            },
        });
        batch.push(Reading {
            device_id: device_id.clone(),
            timestamp,
            location: Some(location.clone()),
            data_status: None,
            payload: Payload::CoreMetric {
                category: MetricCategory::Online,
                value: if status == DeviceState::Online { 1.0 } else { 0.0 },
            },
        });
        batch.push(Reading {
            device_id: device_id.clone(),
            timestamp,
            location: Some(location.clone()),
            data_status: None,
            payload: Payload::Environment {
                kind: EnvironmentKind::Temperature,
                value: rng.random_range(20.0..30.0),
                unit: TEMPERATURE_UNIT.to_string(),
            },
        });
        batch.push(Reading {
            device_id: device_id.clone(),
            timestamp,
            location: Some(location.clone()),
            data_status: None,
            payload: Payload::Telemetry {
                data_type: TelemetryKind::UploadFrequency,
                value: rng.random_range(0..100),
            },
        });
        batch.push(Reading {
            device_id,
            timestamp,
            location: Some(location),
            data_status: None,
            payload: Payload::DeviceStatus {
                status,
                last_update: timestamp,
                battery_level: rng.random_range(0..100),
            },
        });
    }

    batch
}
