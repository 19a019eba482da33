pub mod records;
pub mod session;
pub mod summary;

pub use records::{DataPoint, MinuteSnapshot, StopRecord, VitalExtremes, VitalRecord};
pub use session::{
    BaselineVitals, DeviceKind, PreparationData, SensorSample, TestPhase, TestSession, VitalKind,
};
pub use summary::{FinishReason, TestSummary};
