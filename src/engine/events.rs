use serde::Serialize;

use crate::alarms::AlarmLevel;
use crate::models::{FinishReason, TestSummary, VitalKind};

/// One-shot events broadcast to observers, distinct from the continuously
/// updated state snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum EngineEvent {
    /// A vital crossed into a reportable alarm condition.
    AlarmRaised {
        vital: VitalKind,
        level: AlarmLevel,
        value: f64,
        elapsed_ms: u64,
    },
    /// `start()` was called while a test was already running. The teardown
    /// needs explicit confirmation via `confirm_restart`.
    RestartRequested,
    /// The test finalized; the summary goes to the persistence/reporting
    /// collaborators.
    TestFinished {
        reason: FinishReason,
        summary: TestSummary,
    },
}
