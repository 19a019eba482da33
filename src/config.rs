use serde::{Deserialize, Serialize};

/// When to raise a reportable alarm event for a critical reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlarmPolicy {
    /// At most one event per transition into Critical, reset on recovery.
    OncePerCriticalEntry,
    /// One event for every critical sample.
    EveryCriticalSample,
}

/// Which record wins when a new sample ties the current min/max value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExtremeTiePolicy {
    KeepEarliest,
    KeepLatest,
}

/// Retry behaviour for one sensor link.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Automatic reconnect attempts after a link loss before giving up and
    /// waiting for a manual reconnect.
    pub max_auto_reconnect_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_auto_reconnect_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
        }
    }
}

/// Tunable parameters of the test execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed test duration. Crossing this while running finalizes the test.
    pub test_duration_ms: u64,
    pub tick_interval_ms: u64,
    /// Grace countdown started by a stop request before the test finalizes.
    pub stop_countdown_ms: u64,
    pub alarm_policy: AlarmPolicy,
    pub extreme_tie_policy: ExtremeTiePolicy,
    pub link: LinkConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            test_duration_ms: 360_000,
            tick_interval_ms: 1_000,
            stop_countdown_ms: 5_000,
            alarm_policy: AlarmPolicy::OncePerCriticalEntry,
            extreme_tie_policy: ExtremeTiePolicy::KeepEarliest,
            link: LinkConfig::default(),
        }
    }
}
