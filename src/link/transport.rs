use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeviceKind, SensorSample};

/// Command issued outward to the Bluetooth transport collaborator. The
/// transport owns the radio; the engine only asks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Connect { device: DeviceKind },
    Disconnect { device: DeviceKind },
}

/// Event delivered inward by the transport collaborator for one device.
/// Raw radio protocol handling is below this boundary; samples arrive typed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    ConnectFailed {
        reason: String,
    },
    LinkLost {
        reason: String,
    },
    Sample {
        sample: SensorSample,
        timestamp: DateTime<Utc>,
    },
    /// The platform's Bluetooth radio is globally disabled. Terminal until
    /// externally resolved; never retried automatically.
    RadioDisabled,
}

/// Connection status of one sensor link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    ErrorRetryable,
    ErrorFatal,
}

/// Observable state of one sensor link, published on every change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkSnapshot {
    pub device: DeviceKind,
    pub status: LinkStatus,
    pub message: String,
    pub reconnect_in_progress: bool,
    pub auto_attempts: u32,
}

impl LinkSnapshot {
    pub fn new(device: DeviceKind) -> Self {
        Self {
            device,
            status: LinkStatus::Disconnected,
            message: "not connected".to_string(),
            reconnect_in_progress: false,
            auto_attempts: 0,
        }
    }
}

/// What a link worker reports upward into the engine's serialized input
/// stream: status changes and forwarded samples.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkUpdate {
    Status(LinkSnapshot),
    Sample {
        device: DeviceKind,
        sample: SensorSample,
        timestamp: DateTime<Utc>,
    },
}
