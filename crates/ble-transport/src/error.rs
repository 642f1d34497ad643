use ble_frame::FrameError;
use thiserror::Error;

use crate::state::ConnectionState;

/// Radio-level failures reported by a [`crate::Radio`] implementation.
#[derive(Debug, Error)]
pub enum BleError {
    #[cfg(feature = "btleplug")]
    #[error("btleplug error: {0}")]
    Btleplug(#[from] btleplug::Error),
    #[error("no BLE adapter available")]
    AdapterUnavailable,
    #[error("BLE device {0} not found")]
    DeviceNotFound(String),
    #[error("required characteristic {kind} not found for profile {profile}")]
    MissingCharacteristic {
        kind: &'static str,
        profile: &'static str,
    },
    #[error("BLE link error: {0}")]
    Link(String),
}

impl BleError {
    pub fn missing(kind: &'static str, profile: crate::BleProfile) -> Self {
        Self::MissingCharacteristic {
            kind,
            profile: profile.id,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no device connected")]
    NotConnected,
    #[error("device disconnected during exchange")]
    Disconnected,
    #[error("another command is already in flight")]
    Busy,
    #[error("timed out waiting for the device")]
    Timeout,
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("device returned status 0x{0:04X}")]
    Apdu(u16),
    #[error("radio error: {0}")]
    Ble(#[from] BleError),
    #[error("cannot move from {from:?} to {to:?}")]
    InvalidState {
        from: ConnectionState,
        to: ConnectionState,
    },
    #[error("command sequence is empty")]
    EmptySequence,
    #[error("transport task stopped")]
    Stopped,
}
