use serde::{Deserialize, Serialize};

use crate::config::ExtremeTiePolicy;

/// One sample of a vital at an elapsed-time offset. Immutable once recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub time_offset_ms: u64,
    pub value: f64,
}

/// A manually logged pause during the walk, with the vitals at that moment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StopRecord {
    pub sequence_number: u32,
    pub elapsed_ms: u64,
    pub spo2: u32,
    pub heart_rate: u32,
}

/// Vitals captured at each completed minute boundary (1..=6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MinuteSnapshot {
    pub minute: u32,
    pub spo2: Option<f64>,
    pub heart_rate: Option<f64>,
    pub distance_m: f64,
}

/// The value and time of a running min or max observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalRecord {
    pub value: f64,
    pub time_offset_ms: u64,
}

/// Running min/max records for one vital's series.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalExtremes {
    pub min: Option<VitalRecord>,
    pub max: Option<VitalRecord>,
}

impl VitalExtremes {
    /// Update from a new sample. A record is replaced only on a strictly more
    /// extreme value; ties resolve per the configured policy.
    pub fn observe(&mut self, point: DataPoint, tie_policy: ExtremeTiePolicy) {
        let record = VitalRecord {
            value: point.value,
            time_offset_ms: point.time_offset_ms,
        };

        self.min = Some(match self.min {
            None => record,
            Some(current) if record.value < current.value => record,
            Some(current)
                if record.value == current.value
                    && tie_policy == ExtremeTiePolicy::KeepLatest =>
            {
                record
            }
            Some(current) => current,
        });

        self.max = Some(match self.max {
            None => record,
            Some(current) if record.value > current.value => record,
            Some(current)
                if record.value == current.value
                    && tie_policy == ExtremeTiePolicy::KeepLatest =>
            {
                record
            }
            Some(current) => current,
        });
    }
}
