use chrono::Utc;
use log::warn;
use uuid::Uuid;

use crate::alarms::AlarmLevel;
use crate::config::{AlarmPolicy, EngineConfig};
use crate::link::LinkSnapshot;
use crate::models::{
    DataPoint, DeviceKind, FinishReason, MinuteSnapshot, PreparationData, StopRecord, TestPhase,
    TestSession, TestSummary, VitalExtremes, VitalKind,
};
use crate::trend::Trend;

const MINUTE_MS: u64 = 60_000;
const MAX_MINUTES: u64 = 6;

/// Everything the engine knows about the current test attempt. Owned
/// exclusively by the engine; observers only ever see snapshots built from
/// this under the engine's lock.
#[derive(Debug)]
pub struct EngineState {
    pub phase: TestPhase,
    pub prep: Option<PreparationData>,
    pub session: Option<TestSession>,

    pub elapsed_ms: u64,
    last_minute_recorded: u64,

    pub spo2_series: Vec<DataPoint>,
    pub heart_rate_series: Vec<DataPoint>,
    pub stops: Vec<StopRecord>,
    pub minute_snapshots: Vec<MinuteSnapshot>,
    pub spo2_extremes: VitalExtremes,
    pub heart_rate_extremes: VitalExtremes,

    pub current_spo2: Option<f64>,
    pub current_heart_rate: Option<f64>,
    pub spo2_trend: Trend,
    pub heart_rate_trend: Trend,
    pub spo2_alarm: AlarmLevel,
    pub heart_rate_alarm: AlarmLevel,
    spo2_in_critical: bool,
    heart_rate_in_critical: bool,

    pub steps: u32,
    pub distance_m: f64,

    pub countdown_remaining_ms: Option<u64>,
    /// Bumped on every request/cancel so a late tick from a cancelled
    /// countdown task can never finalize the test.
    pub countdown_generation: u64,
    pub finish_reason: Option<FinishReason>,

    pub oximeter_link: LinkSnapshot,
    pub accelerometer_link: LinkSnapshot,
}

/// An alarm transition that the controller must surface to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmTransition {
    pub vital: VitalKind,
    pub level: AlarmLevel,
    pub value: f64,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            phase: TestPhase::Configuring,
            prep: None,
            session: None,
            elapsed_ms: 0,
            last_minute_recorded: 0,
            spo2_series: Vec::new(),
            heart_rate_series: Vec::new(),
            stops: Vec::new(),
            minute_snapshots: Vec::new(),
            spo2_extremes: VitalExtremes::default(),
            heart_rate_extremes: VitalExtremes::default(),
            current_spo2: None,
            current_heart_rate: None,
            spo2_trend: Trend::Unknown,
            heart_rate_trend: Trend::Unknown,
            spo2_alarm: AlarmLevel::Unknown,
            heart_rate_alarm: AlarmLevel::Unknown,
            spo2_in_critical: false,
            heart_rate_in_critical: false,
            steps: 0,
            distance_m: 0.0,
            countdown_remaining_ms: None,
            countdown_generation: 0,
            finish_reason: None,
            oximeter_link: LinkSnapshot::new(DeviceKind::Oximeter),
            accelerometer_link: LinkSnapshot::new(DeviceKind::Accelerometer),
        }
    }

    /// Drop all per-attempt data. Preparation data and link snapshots
    /// survive; they belong to the patient/session and the radios, not the
    /// attempt.
    pub fn reset_run_data(&mut self) {
        self.session = None;
        self.elapsed_ms = 0;
        self.last_minute_recorded = 0;
        self.spo2_series.clear();
        self.heart_rate_series.clear();
        self.stops.clear();
        self.minute_snapshots.clear();
        self.spo2_extremes = VitalExtremes::default();
        self.heart_rate_extremes = VitalExtremes::default();
        self.current_spo2 = None;
        self.current_heart_rate = None;
        self.spo2_trend = Trend::Unknown;
        self.heart_rate_trend = Trend::Unknown;
        self.spo2_alarm = AlarmLevel::Unknown;
        self.heart_rate_alarm = AlarmLevel::Unknown;
        self.spo2_in_critical = false;
        self.heart_rate_in_critical = false;
        self.steps = 0;
        self.distance_m = 0.0;
        self.countdown_remaining_ms = None;
        self.finish_reason = None;
    }

    /// Open a fresh session from the loaded preparation data.
    pub fn begin_session(&mut self) -> anyhow::Result<()> {
        let prep = match self.prep.clone() {
            Some(prep) => prep,
            None => anyhow::bail!("cannot start a test without preparation data"),
        };
        self.reset_run_data();
        self.session = Some(TestSession {
            id: Uuid::new_v4().to_string(),
            prep,
            started_at: Utc::now(),
        });
        self.phase = TestPhase::Running;
        Ok(())
    }

    /// Record an oximetry sample at `offset_ms`. Returns the alarm
    /// transitions to surface, empty when nothing reportable happened.
    pub fn apply_oximetry(
        &mut self,
        offset_ms: u64,
        spo2: f64,
        pulse_bpm: f64,
        config: &EngineConfig,
    ) -> Vec<AlarmTransition> {
        // Both series advance together, so one monotonicity check covers both.
        if let Some(last) = self.spo2_series.last() {
            if offset_ms <= last.time_offset_ms {
                warn!(
                    "dropping out-of-order oximetry sample at {offset_ms}ms (last {}ms)",
                    last.time_offset_ms
                );
                return Vec::new();
            }
        }

        let thresholds = match self.prep.as_ref() {
            Some(prep) => prep.thresholds,
            None => return Vec::new(),
        };

        let spo2_point = DataPoint {
            time_offset_ms: offset_ms,
            value: spo2,
        };
        let hr_point = DataPoint {
            time_offset_ms: offset_ms,
            value: pulse_bpm,
        };

        self.spo2_series.push(spo2_point);
        self.heart_rate_series.push(hr_point);
        self.spo2_extremes
            .observe(spo2_point, config.extreme_tie_policy);
        self.heart_rate_extremes
            .observe(hr_point, config.extreme_tie_policy);

        self.spo2_trend = Trend::between(self.current_spo2, spo2);
        self.heart_rate_trend = Trend::between(self.current_heart_rate, pulse_bpm);
        self.current_spo2 = Some(spo2);
        self.current_heart_rate = Some(pulse_bpm);

        self.spo2_alarm = thresholds.classify_spo2(spo2);
        self.heart_rate_alarm = thresholds.classify_heart_rate(pulse_bpm);

        let mut transitions = Vec::new();
        if should_report_critical(
            self.spo2_alarm,
            &mut self.spo2_in_critical,
            config.alarm_policy,
        ) {
            transitions.push(AlarmTransition {
                vital: VitalKind::Spo2,
                level: self.spo2_alarm,
                value: spo2,
            });
        }
        if should_report_critical(
            self.heart_rate_alarm,
            &mut self.heart_rate_in_critical,
            config.alarm_policy,
        ) {
            transitions.push(AlarmTransition {
                vital: VitalKind::HeartRate,
                level: self.heart_rate_alarm,
                value: pulse_bpm,
            });
        }
        transitions
    }

    /// Record a cumulative step-count sample and derive distance.
    pub fn apply_step_count(&mut self, total: u32) {
        if total < self.steps {
            warn!(
                "step counter went backwards ({} -> {total}); keeping previous total",
                self.steps
            );
            return;
        }
        self.steps = total;
        let stride = self
            .prep
            .as_ref()
            .map(|prep| prep.stride_length_m)
            .unwrap_or(0.0);
        self.distance_m = f64::from(total) * stride;
    }

    /// Emit one snapshot per completed minute up to `elapsed_ms`, in order.
    /// Tick bursts that jump several boundaries emit every skipped minute.
    pub fn record_minutes_through(&mut self, elapsed_ms: u64) {
        let completed = (elapsed_ms / MINUTE_MS).min(MAX_MINUTES);
        while self.last_minute_recorded < completed {
            let minute = self.last_minute_recorded + 1;
            self.minute_snapshots.push(MinuteSnapshot {
                minute: minute as u32,
                spo2: self.current_spo2,
                heart_rate: self.current_heart_rate,
                distance_m: self.distance_m,
            });
            self.last_minute_recorded = minute;
        }
    }

    /// Create a stop record from the current vitals. Falls back to the
    /// baseline vitals when no sample has arrived yet.
    pub fn add_stop(&mut self) -> StopRecord {
        let baseline = self.prep.as_ref().map(|prep| prep.baseline);
        let spo2 = self
            .current_spo2
            .map(|v| v.round() as u32)
            .or(baseline.map(|b| b.spo2))
            .unwrap_or(0);
        let heart_rate = self
            .current_heart_rate
            .map(|v| v.round() as u32)
            .or(baseline.map(|b| b.heart_rate))
            .unwrap_or(0);

        let record = StopRecord {
            sequence_number: self.stops.len() as u32 + 1,
            elapsed_ms: self.elapsed_ms,
            spo2,
            heart_rate,
        };
        self.stops.push(record.clone());
        record
    }

    /// LIFO removal of the newest stop; remaining records are renumbered to
    /// stay contiguous from 1.
    pub fn delete_last_stop(&mut self) -> Option<StopRecord> {
        let removed = self.stops.pop();
        for (index, stop) in self.stops.iter_mut().enumerate() {
            stop.sequence_number = index as u32 + 1;
        }
        removed
    }

    /// Close the attempt and assemble the immutable summary.
    pub fn finalize(&mut self, reason: FinishReason) -> TestSummary {
        self.phase = TestPhase::Finished;
        self.finish_reason = Some(reason);
        self.countdown_remaining_ms = None;

        let (session_id, patient_id, patient_name, theoretical) = match self.session.as_ref() {
            Some(session) => (
                session.id.clone(),
                session.prep.patient_id.clone(),
                session.prep.patient_name.clone(),
                session.prep.theoretical_distance_m,
            ),
            None => (String::new(), String::new(), String::new(), 0.0),
        };

        let percent_of_theoretical = if theoretical > 0.0 {
            self.distance_m / theoretical * 100.0
        } else {
            0.0
        };

        TestSummary {
            session_id,
            patient_id,
            patient_name,
            finish_reason: reason,
            elapsed_ms: self.elapsed_ms,
            distance_m: self.distance_m,
            theoretical_distance_m: theoretical,
            percent_of_theoretical,
            spo2_series: self.spo2_series.clone(),
            heart_rate_series: self.heart_rate_series.clone(),
            stops: self.stops.clone(),
            minute_snapshots: self.minute_snapshots.clone(),
            spo2_extremes: self.spo2_extremes,
            heart_rate_extremes: self.heart_rate_extremes,
        }
    }

    pub fn link_mut(&mut self, device: DeviceKind) -> &mut LinkSnapshot {
        match device {
            DeviceKind::Oximeter => &mut self.oximeter_link,
            DeviceKind::Accelerometer => &mut self.accelerometer_link,
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

fn should_report_critical(level: AlarmLevel, in_critical: &mut bool, policy: AlarmPolicy) -> bool {
    match level {
        AlarmLevel::Critical => {
            let entered = !*in_critical;
            *in_critical = true;
            match policy {
                AlarmPolicy::OncePerCriticalEntry => entered,
                AlarmPolicy::EveryCriticalSample => true,
            }
        }
        _ => {
            *in_critical = false;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarms::AlarmThresholds;
    use crate::models::BaselineVitals;

    fn prep() -> PreparationData {
        PreparationData {
            patient_id: "p-001".to_string(),
            patient_name: "Test Patient".to_string(),
            baseline: BaselineVitals {
                spo2: 97,
                heart_rate: 72,
            },
            track_length_m: 30.0,
            stride_length_m: 0.7,
            theoretical_distance_m: 500.0,
            thresholds: AlarmThresholds::default(),
        }
    }

    fn running_state() -> EngineState {
        let mut state = EngineState::new();
        state.prep = Some(prep());
        state.begin_session().unwrap();
        state
    }

    #[test]
    fn oximetry_samples_build_ordered_series() {
        let mut state = running_state();
        let config = EngineConfig::default();

        state.apply_oximetry(1_000, 96.0, 90.0, &config);
        state.apply_oximetry(2_000, 95.0, 92.0, &config);
        state.apply_oximetry(3_000, 94.0, 95.0, &config);

        assert_eq!(state.spo2_series.len(), 3);
        assert_eq!(state.heart_rate_series.len(), 3);
        assert!(state
            .spo2_series
            .windows(2)
            .all(|pair| pair[0].time_offset_ms < pair[1].time_offset_ms));
        assert_eq!(state.spo2_trend, Trend::Down);
        assert_eq!(state.heart_rate_trend, Trend::Up);
    }

    #[test]
    fn out_of_order_samples_are_dropped() {
        let mut state = running_state();
        let config = EngineConfig::default();

        state.apply_oximetry(2_000, 96.0, 90.0, &config);
        state.apply_oximetry(2_000, 80.0, 90.0, &config);
        state.apply_oximetry(1_500, 80.0, 90.0, &config);

        assert_eq!(state.spo2_series.len(), 1);
        assert_eq!(state.current_spo2, Some(96.0));
    }

    #[test]
    fn critical_alarm_fires_once_per_entry() {
        let mut state = running_state();
        let config = EngineConfig::default();

        let t1 = state.apply_oximetry(1_000, 87.0, 90.0, &config);
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].vital, VitalKind::Spo2);
        assert_eq!(t1[0].level, AlarmLevel::Critical);

        // Still critical: no second event.
        let t2 = state.apply_oximetry(2_000, 86.0, 90.0, &config);
        assert!(t2.is_empty());

        // Recover, then drop again: one more event.
        let t3 = state.apply_oximetry(3_000, 95.0, 90.0, &config);
        assert!(t3.is_empty());
        let t4 = state.apply_oximetry(4_000, 85.0, 90.0, &config);
        assert_eq!(t4.len(), 1);
    }

    #[test]
    fn every_sample_policy_repeats_the_alarm() {
        let mut state = running_state();
        let config = EngineConfig {
            alarm_policy: AlarmPolicy::EveryCriticalSample,
            ..EngineConfig::default()
        };

        assert_eq!(state.apply_oximetry(1_000, 87.0, 90.0, &config).len(), 1);
        assert_eq!(state.apply_oximetry(2_000, 86.0, 90.0, &config).len(), 1);
    }

    #[test]
    fn step_counts_accumulate_into_distance() {
        let mut state = running_state();

        state.apply_step_count(10);
        assert!((state.distance_m - 7.0).abs() < 1e-9);

        // Backwards counter readings are ignored.
        state.apply_step_count(5);
        assert_eq!(state.steps, 10);

        state.apply_step_count(100);
        assert!((state.distance_m - 70.0).abs() < 1e-9);
    }

    #[test]
    fn minute_snapshots_are_emitted_once_per_minute_in_order() {
        let mut state = running_state();
        let config = EngineConfig::default();
        state.apply_oximetry(30_000, 95.0, 100.0, &config);

        state.record_minutes_through(59_999);
        assert!(state.minute_snapshots.is_empty());

        state.record_minutes_through(60_000);
        assert_eq!(state.minute_snapshots.len(), 1);
        assert_eq!(state.minute_snapshots[0].minute, 1);
        assert_eq!(state.minute_snapshots[0].spo2, Some(95.0));

        // A burst that skips ahead emits every crossed minute exactly once.
        state.record_minutes_through(185_000);
        let minutes: Vec<u32> = state.minute_snapshots.iter().map(|m| m.minute).collect();
        assert_eq!(minutes, vec![1, 2, 3]);

        // Re-delivering the same elapsed time adds nothing.
        state.record_minutes_through(185_000);
        assert_eq!(state.minute_snapshots.len(), 3);

        // Never more than six.
        state.record_minutes_through(900_000);
        assert_eq!(state.minute_snapshots.len(), 6);
    }

    #[test]
    fn stops_are_numbered_and_renumbered_contiguously() {
        let mut state = running_state();
        let config = EngineConfig::default();

        state.elapsed_ms = 30_000;
        state.apply_oximetry(29_000, 91.0, 100.0, &config);
        let first = state.add_stop();
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.elapsed_ms, 30_000);
        assert_eq!(first.spo2, 91);
        assert_eq!(first.heart_rate, 100);

        state.elapsed_ms = 90_000;
        let second = state.add_stop();
        assert_eq!(second.sequence_number, 2);

        let removed = state.delete_last_stop().unwrap();
        assert_eq!(removed.sequence_number, 2);
        assert_eq!(state.stops.len(), 1);
        assert_eq!(state.stops[0].sequence_number, 1);

        state.add_stop();
        state.add_stop();
        while state.delete_last_stop().is_some() {
            for (index, stop) in state.stops.iter().enumerate() {
                assert_eq!(stop.sequence_number, index as u32 + 1);
            }
        }
        assert!(state.delete_last_stop().is_none());
    }

    #[test]
    fn stop_without_samples_uses_baseline_vitals() {
        let mut state = running_state();
        let record = state.add_stop();
        assert_eq!(record.spo2, 97);
        assert_eq!(record.heart_rate, 72);
    }

    #[test]
    fn summary_reports_percent_of_theoretical() {
        let mut state = running_state();
        let config = EngineConfig::default();

        state.apply_step_count(500); // 350 m at 0.7 m stride
        state.apply_oximetry(10_000, 95.0, 100.0, &config);
        state.elapsed_ms = 360_000;

        let summary = state.finalize(FinishReason::CompletedNormally);
        assert_eq!(state.phase, TestPhase::Finished);
        assert_eq!(summary.finish_reason, FinishReason::CompletedNormally);
        assert!((summary.distance_m - 350.0).abs() < 1e-9);
        assert!((summary.percent_of_theoretical - 70.0).abs() < 1e-9);
        assert_eq!(summary.spo2_series.len(), 1);
        assert_eq!(summary.patient_id, "p-001");
    }
}
