//! Wire data shapes: the reading variants emitted by the simulated fleet,
//! plus the severity grade stamped on each reading by the processor.

use serde::{Deserialize, Serialize};

/// Readings contributed by one device on every tick: four core metrics,
/// one environment sample, one telemetry sample, one device status.
pub const READINGS_PER_DEVICE: usize = 7;

/// Device geolocation in floating point degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    /// Positioning accuracy in meters.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accuracy: Option<f64>,
}

/// Three-valued grade assigned by the processor, never by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Cpu,
    Memory,
    Network,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    UploadFrequency,
}

/// Device operating state as shown on the map view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Online,
    Offline,
    Warning,
    Error,
}

impl DeviceState {
    pub const ALL: [DeviceState; 4] = [
        DeviceState::Online,
        DeviceState::Offline,
        DeviceState::Warning,
        DeviceState::Error,
    ];
}

/// One timestamped measurement from one device. Serializes flat, so the
/// wire object is the payload fields next to the shared ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: String,
    /// Milliseconds since the Unix epoch, shared by the whole batch.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_status: Option<Severity>,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Closed set of reading families. Untagged: each case is recognized by
/// its own discriminant field, never by probing for ad hoc keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    CoreMetric {
        category: MetricCategory,
        value: f64,
    },
    Environment {
        #[serde(rename = "type")]
        kind: EnvironmentKind,
        value: f64,
        unit: String,
    },
    Telemetry {
        #[serde(rename = "dataType")]
        data_type: TelemetryKind,
        value: u32,
    },
    DeviceStatus {
        status: DeviceState,
        #[serde(rename = "lastUpdate")]
        last_update: i64,
        #[serde(rename = "batteryLevel")]
        battery_level: u8,
    },
}
