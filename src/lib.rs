//! Execution engine for the six-minute walk test (6MWT).
//!
//! A patient walks for six minutes while a Bluetooth oximeter and a wearable
//! step counter stream samples. This crate owns the test's temporal state
//! machine: it times the walk, classifies vitals against clinical alarm
//! thresholds, derives trends and min/max records, logs stop events with
//! their concurrent vitals, manages both device links (with automatic and
//! manual reconnection), and assembles the final summary record.
//!
//! Rendering, navigation, report generation and persistence are external
//! collaborators; they observe the engine through [`TestEngine::subscribe`]
//! and [`TestEngine::events`] and drive it through its operations.

pub mod alarms;
pub mod clock;
pub mod config;
pub mod engine;
pub mod link;
pub mod models;
pub mod trend;
pub mod utils;

pub use alarms::{AlarmLevel, AlarmThresholds};
pub use config::{AlarmPolicy, EngineConfig, ExtremeTiePolicy, LinkConfig};
pub use engine::{EngineEvent, EngineSnapshot, TestEngine};
pub use link::{LinkSnapshot, LinkStatus, TransportCommand, TransportEvent};
pub use models::{
    BaselineVitals, DataPoint, DeviceKind, FinishReason, MinuteSnapshot, PreparationData,
    SensorSample, StopRecord, TestPhase, TestSummary, VitalKind,
};
pub use trend::Trend;
