use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::records::{DataPoint, MinuteSnapshot, StopRecord, VitalExtremes};

/// Why a test finalized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FinishReason {
    CompletedNormally,
    StoppedEarly,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::CompletedNormally => "completed normally",
            FinishReason::StoppedEarly => "stopped early",
        }
    }
}

/// Immutable result record assembled once per finished test. The engine hands
/// this outward to the persistence/reporting collaborators and performs no
/// I/O itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub session_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub finish_reason: FinishReason,
    pub elapsed_ms: u64,
    pub distance_m: f64,
    pub theoretical_distance_m: f64,
    /// Percentage of the theoretical distance achieved, 0 when no reference
    /// distance was supplied.
    pub percent_of_theoretical: f64,
    pub spo2_series: Vec<DataPoint>,
    pub heart_rate_series: Vec<DataPoint>,
    pub stops: Vec<StopRecord>,
    pub minute_snapshots: Vec<MinuteSnapshot>,
    pub spo2_extremes: VitalExtremes,
    pub heart_rate_extremes: VitalExtremes,
}

impl TestSummary {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize test summary")
    }
}
