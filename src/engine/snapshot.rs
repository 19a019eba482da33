use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alarms::AlarmLevel;
use crate::link::LinkSnapshot;
use crate::models::{FinishReason, MinuteSnapshot, StopRecord, TestPhase, VitalExtremes};
use crate::trend::Trend;
use crate::utils::format::{format_distance, format_elapsed};

use super::state::EngineState;

/// Latest reading of one vital with its derived presentation state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalReadout {
    pub value: Option<f64>,
    pub trend: Trend,
    pub alarm: AlarmLevel,
}

/// Immutable view of the engine handed to observers on every state-changing
/// event. Observers never write back through this; all mutation goes through
/// the engine's operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub phase: TestPhase,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub elapsed_display: String,
    pub distance_m: f64,
    pub distance_display: String,
    pub spo2: VitalReadout,
    pub heart_rate: VitalReadout,
    pub stops: Vec<StopRecord>,
    pub minute_snapshots: Vec<MinuteSnapshot>,
    pub spo2_extremes: VitalExtremes,
    pub heart_rate_extremes: VitalExtremes,
    pub countdown_remaining_ms: Option<u64>,
    pub finish_reason: Option<FinishReason>,
    pub oximeter_link: LinkSnapshot,
    pub accelerometer_link: LinkSnapshot,
}

impl EngineSnapshot {
    pub fn from_state(state: &EngineState) -> Self {
        Self {
            phase: state.phase,
            session_id: state.session.as_ref().map(|s| s.id.clone()),
            started_at: state.session.as_ref().map(|s| s.started_at),
            elapsed_ms: state.elapsed_ms,
            elapsed_display: format_elapsed(state.elapsed_ms),
            distance_m: state.distance_m,
            distance_display: format_distance(state.distance_m),
            spo2: VitalReadout {
                value: state.current_spo2,
                trend: state.spo2_trend,
                alarm: state.spo2_alarm,
            },
            heart_rate: VitalReadout {
                value: state.current_heart_rate,
                trend: state.heart_rate_trend,
                alarm: state.heart_rate_alarm,
            },
            stops: state.stops.clone(),
            minute_snapshots: state.minute_snapshots.clone(),
            spo2_extremes: state.spo2_extremes,
            heart_rate_extremes: state.heart_rate_extremes,
            countdown_remaining_ms: state.countdown_remaining_ms,
            finish_reason: state.finish_reason,
            oximeter_link: state.oximeter_link.clone(),
            accelerometer_link: state.accelerometer_link.clone(),
        }
    }
}
