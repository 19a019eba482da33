pub mod manager;
pub mod transport;

pub use manager::{LinkCommand, SensorLinkManager};
pub use transport::{LinkSnapshot, LinkStatus, LinkUpdate, TransportCommand, TransportEvent};
