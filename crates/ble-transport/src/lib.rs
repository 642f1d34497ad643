//! BLE transport for APDU-speaking hardware signers.
//!
//! A single actor task owns the radio, the active link and the one
//! outstanding command slot. Callers talk to it through a cloneable
//! [`TransportHandle`]; radio callbacks are funnelled into the same actor as
//! [`RadioEvent`]s.

pub mod config;
pub mod error;
#[cfg(feature = "btleplug")]
pub mod manager;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod profile;
pub mod radio;
#[cfg(feature = "btleplug")]
pub mod session;
pub mod state;
pub mod transport;

pub use config::TransportConfig;
pub use error::{BleError, TransportError};
#[cfg(feature = "btleplug")]
pub use manager::BtleplugRadio;
pub use profile::{BleProfile, Device, DeviceModel};
pub use radio::{Radio, RadioEvent, RadioEventSink, RadioLink, RadioPeripheral};
pub use state::ConnectionState;
pub use transport::{LinkInfo, TransportHandle};

pub type BleResult<T> = Result<T, BleError>;
pub type TransportResult<T> = Result<T, TransportError>;
