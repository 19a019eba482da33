pub mod controller;
pub mod events;
pub mod snapshot;
pub mod state;

pub use controller::TestEngine;
pub use events::EngineEvent;
pub use snapshot::{EngineSnapshot, VitalReadout};
pub use state::EngineState;
