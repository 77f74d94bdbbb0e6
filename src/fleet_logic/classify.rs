//! Threshold grading for readings. Stateless: a grade is a function of the
//! single current value, with no hysteresis between ticks.

use crate::fleet_logic::model::{
    EnvironmentKind, MetricCategory, Payload, Reading, Severity, TelemetryKind,
};

#[derive(Debug, Clone, Copy)]
struct Band {
    warning: f64,
    error: f64,
}

struct Thresholds {
    cpu: Band,
    memory: Band,
    network: Band,
    online: Band,
    temperature: Band,
    upload_frequency: Band,
}

const THRESHOLDS: Thresholds = Thresholds {
    cpu: Band { warning: 90.0, error: 95.0 },
    memory: Band { warning: 90.0, error: 95.0 },
    network: Band { warning: 150.0, error: 180.0 },
    // Inverted band: a low online rate is the bad case.
    online: Band { warning: 60.0, error: 30.0 },
    temperature: Band { warning: 35.0, error: 40.0 },
    upload_frequency: Band { warning: 80.0, error: 100.0 },
};

/// Grades one reading against the per-family bands. Families without a bare
/// numeric value (device status) always grade `normal`.
pub fn classify(reading: &Reading) -> Severity {
    match &reading.payload {
        Payload::CoreMetric { category, value } => match category {
            MetricCategory::Cpu => grade_high(*value, THRESHOLDS.cpu),
            MetricCategory::Memory => grade_high(*value, THRESHOLDS.memory),
            MetricCategory::Network => grade_high(*value, THRESHOLDS.network),
            MetricCategory::Online => grade_low(*value, THRESHOLDS.online),
        },
        Payload::Environment {
            kind: EnvironmentKind::Temperature,
            value,
            ..
        } => grade_high(*value, THRESHOLDS.temperature),
        Payload::Telemetry {
            data_type: TelemetryKind::UploadFrequency,
            value,
        } => grade_high(f64::from(*value), THRESHOLDS.upload_frequency),
        Payload::DeviceStatus { .. } => Severity::Normal,
    }
}

// Higher is worse. The error band is checked first, so a value meeting both
// thresholds reports `error`.
fn grade_high(value: f64, band: Band) -> Severity {
    if value >= band.error {
        Severity::Error
    } else if value >= band.warning {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

// Lower is worse.
fn grade_low(value: f64, band: Band) -> Severity {
    if value <= band.error {
        Severity::Error
    } else if value <= band.warning {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet_logic::model::DeviceState;

    fn core(category: MetricCategory, value: f64) -> Reading {
        Reading {
            device_id: "device_0".to_string(),
            timestamp: 0,
            location: None,
            data_status: None,
            payload: Payload::CoreMetric { category, value },
        }
    }

    fn temperature(value: f64) -> Reading {
        Reading {
            device_id: "device_0".to_string(),
            timestamp: 0,
            location: None,
            data_status: None,
            payload: Payload::Environment {
                kind: EnvironmentKind::Temperature,
                value,
                unit: "°C".to_string(),
            },
        }
    }

    fn upload_frequency(value: u32) -> Reading {
        Reading {
            device_id: "device_0".to_string(),
            timestamp: 0,
            location: None,
            data_status: None,
            payload: Payload::Telemetry {
                data_type: TelemetryKind::UploadFrequency,
                value,
            },
        }
    }

    #[test]
    fn cpu_boundaries() {
        assert_eq!(classify(&core(MetricCategory::Cpu, 89.9)), Severity::Normal);
        assert_eq!(classify(&core(MetricCategory::Cpu, 90.0)), Severity::Warning);
        assert_eq!(classify(&core(MetricCategory::Cpu, 94.9)), Severity::Warning);
        // 95.0 meets both bands; error wins.
        assert_eq!(classify(&core(MetricCategory::Cpu, 95.0)), Severity::Error);
    }

    #[test]
    fn memory_follows_the_cpu_bands() {
        assert_eq!(classify(&core(MetricCategory::Memory, 50.0)), Severity::Normal);
        assert_eq!(classify(&core(MetricCategory::Memory, 90.0)), Severity::Warning);
        assert_eq!(classify(&core(MetricCategory::Memory, 99.0)), Severity::Error);
    }

    #[test]
    fn network_boundaries() {
        assert_eq!(classify(&core(MetricCategory::Network, 149.9)), Severity::Normal);
        assert_eq!(classify(&core(MetricCategory::Network, 150.0)), Severity::Warning);
        assert_eq!(classify(&core(MetricCategory::Network, 180.0)), Severity::Error);
    }

    #[test]
    fn online_rate_grades_low_values_as_worse() {
        assert_eq!(classify(&core(MetricCategory::Online, 65.0)), Severity::Normal);
        assert_eq!(classify(&core(MetricCategory::Online, 60.0)), Severity::Warning);
        assert_eq!(classify(&core(MetricCategory::Online, 55.0)), Severity::Warning);
        assert_eq!(classify(&core(MetricCategory::Online, 30.0)), Severity::Error);
        assert_eq!(classify(&core(MetricCategory::Online, 25.0)), Severity::Error);
    }

    #[test]
    fn temperature_boundaries() {
        assert_eq!(classify(&temperature(34.9)), Severity::Normal);
        assert_eq!(classify(&temperature(35.0)), Severity::Warning);
        assert_eq!(classify(&temperature(40.0)), Severity::Error);
    }

    #[test]
    fn upload_frequency_boundaries() {
        assert_eq!(classify(&upload_frequency(79)), Severity::Normal);
        assert_eq!(classify(&upload_frequency(80)), Severity::Warning);
        assert_eq!(classify(&upload_frequency(99)), Severity::Warning);
        assert_eq!(classify(&upload_frequency(100)), Severity::Error);
    }

    #[test]
    fn device_status_always_grades_normal() {
        let reading = Reading {
            device_id: "device_0".to_string(),
            timestamp: 0,
            location: None,
            data_status: None,
            payload: Payload::DeviceStatus {
                status: DeviceState::Error,
                last_update: 0,
                battery_level: 1,
            },
        };
        assert_eq!(classify(&reading), Severity::Normal);
    }

    #[test]
    fn classification_is_deterministic() {
        let reading = core(MetricCategory::Cpu, 92.5);
        assert_eq!(classify(&reading), classify(&reading));
    }
}
