use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarms::AlarmThresholds;

/// Phase of the test lifecycle state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TestPhase {
    Configuring,
    Running,
    StoppingCountdown,
    Finished,
}

impl Default for TestPhase {
    fn default() -> Self {
        TestPhase::Configuring
    }
}

/// The two Bluetooth peripherals a test listens to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    Oximeter,
    Accelerometer,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Oximeter => "oximeter",
            DeviceKind::Accelerometer => "accelerometer",
        }
    }
}

/// The vitals tracked as time series during a walk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum VitalKind {
    Spo2,
    HeartRate,
}

/// One typed sample as delivered by the transport layer.
///
/// An oximeter notification carries both vitals at once; the wearable streams
/// a cumulative step count that the engine turns into distance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SensorSample {
    Oximetry { spo2: f64, pulse_bpm: f64 },
    StepCount { total: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaselineVitals {
    pub spo2: u32,
    pub heart_rate: u32,
}

/// Everything the preparation screen hands over before a test can start.
/// Treated as immutable for the lifetime of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationData {
    pub patient_id: String,
    pub patient_name: String,
    pub baseline: BaselineVitals,
    /// Length of the walking corridor in meters.
    pub track_length_m: f64,
    /// Average stride length used to convert step counts into distance.
    pub stride_length_m: f64,
    /// Reference distance computed by the preparation collaborator.
    pub theoretical_distance_m: f64,
    pub thresholds: AlarmThresholds,
}

/// One execution attempt for one patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
    pub id: String,
    pub prep: PreparationData,
    pub started_at: DateTime<Utc>,
}
