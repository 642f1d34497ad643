use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{BleProfile, BleResult, Device};

/// Asynchronous radio callbacks, delivered to the transport actor's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Discovered(Device),
    Notification { device_id: String, value: Vec<u8> },
    Disconnected { device_id: String },
    PoweredOff,
}

pub type RadioEventSink = mpsc::UnboundedSender<RadioEvent>;

/// Platform central: discovery and link establishment.
#[async_trait]
pub trait Radio: Send + 'static {
    type Peripheral: RadioPeripheral;

    /// Called once before any other method. Implementations forward every
    /// platform callback into `sink` and never touch transport state.
    async fn attach(&mut self, sink: RadioEventSink) -> BleResult<()>;

    async fn start_scan(&mut self, profile: &BleProfile) -> BleResult<()>;

    async fn stop_scan(&mut self) -> BleResult<()>;

    /// Establishes the link-level connection to a device seen earlier.
    async fn connect(&mut self, device_id: &str) -> BleResult<Self::Peripheral>;
}

/// A connected peripheral whose GATT characteristics are not resolved yet.
#[async_trait]
pub trait RadioPeripheral: Send + 'static {
    type Link: RadioLink;

    /// Resolves the write and notify characteristics of `profile` and
    /// subscribes to notifications.
    async fn discover(self, profile: &BleProfile) -> BleResult<Self::Link>;
}

/// A ready link.
#[async_trait]
pub trait RadioLink: Send + Sync + 'static {
    /// Writes one frame. Resolves only once the platform acknowledged it, so
    /// sequential awaits keep fragments in order.
    async fn write(&mut self, frame: &[u8]) -> BleResult<()>;

    /// Negotiated MTU, when the platform exposes it.
    fn mtu(&self) -> Option<usize>;

    /// Whether the platform still reports the link as up.
    async fn is_connected(&self) -> BleResult<bool>;

    async fn disconnect(&mut self) -> BleResult<()>;
}
