//! In-memory radio with a scriptable device on the other end.
//!
//! Frames written by the transport are reassembled into commands and handed
//! to a responder closure; its reply is framed and delivered back as
//! notifications, exactly like a real peripheral would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ble_frame::{ReassemblyOutcome, ReassemblyState, encode_apdu};
use parking_lot::Mutex;
use tracing::debug;

use crate::radio::{Radio, RadioEvent, RadioEventSink, RadioLink, RadioPeripheral};
use crate::{BleError, BleProfile, BleResult, Device};

/// Maps one complete command to its response. `None` leaves the command
/// unanswered.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Clone, Default)]
pub struct MockRadio {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    sink: Mutex<Option<RadioEventSink>>,
    scanning: Mutex<bool>,
    connected: Mutex<Option<String>>,
    written: Mutex<Vec<Vec<u8>>>,
    commands: Mutex<Vec<Vec<u8>>>,
    responder: Mutex<Option<Responder>>,
    mtu: Mutex<Option<usize>>,
    reassembly: Mutex<ReassemblyState>,
    fail_next_connect: Mutex<bool>,
    connect_delay: Mutex<Option<Duration>>,
}

impl Inner {
    fn emit(&self, event: RadioEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            let _ = sink.send(event);
        }
    }
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the link report `mtu` as its negotiated MTU.
    pub fn with_mtu(self, mtu: usize) -> Self {
        *self.inner.mtu.lock() = Some(mtu);
        self
    }

    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) {
        *self.inner.responder.lock() = Some(Box::new(responder));
    }

    /// Leaves every subsequent command unanswered.
    pub fn clear_responder(&self) {
        *self.inner.responder.lock() = None;
    }

    pub fn advertise(&self, device: Device) {
        self.inner.emit(RadioEvent::Discovered(device));
    }

    /// Delivers a raw notification from the connected device.
    pub fn notify_raw(&self, value: Vec<u8>) {
        let device_id = self.inner.connected.lock().clone().unwrap_or_default();
        self.inner
            .emit(RadioEvent::Notification { device_id, value });
    }

    /// Simulates the peripheral going out of range.
    pub fn drop_link(&self) {
        if let Some(device_id) = self.inner.connected.lock().take() {
            self.inner.emit(RadioEvent::Disconnected { device_id });
        }
    }

    /// Delivers a disconnect event for `device_id` while leaving any live
    /// link untouched, like a platform callback that arrives late.
    pub fn announce_disconnect(&self, device_id: &str) {
        self.inner.emit(RadioEvent::Disconnected {
            device_id: device_id.to_string(),
        });
    }

    pub fn power_off(&self) {
        *self.inner.scanning.lock() = false;
        self.inner.connected.lock().take();
        self.inner.emit(RadioEvent::PoweredOff);
    }

    pub fn fail_next_connect(&self) {
        *self.inner.fail_next_connect.lock() = true;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.inner.connect_delay.lock() = Some(delay);
    }

    /// Every frame written so far, in order.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.inner.written.lock().clone()
    }

    /// Every command reassembled from the written frames, in order.
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.inner.commands.lock().clone()
    }

    pub fn is_scanning(&self) -> bool {
        *self.inner.scanning.lock()
    }

    pub fn connected_device(&self) -> Option<String> {
        self.inner.connected.lock().clone()
    }
}

#[async_trait]
impl Radio for MockRadio {
    type Peripheral = MockPeripheral;

    async fn attach(&mut self, sink: RadioEventSink) -> BleResult<()> {
        *self.inner.sink.lock() = Some(sink);
        Ok(())
    }

    async fn start_scan(&mut self, _profile: &BleProfile) -> BleResult<()> {
        *self.inner.scanning.lock() = true;
        Ok(())
    }

    async fn stop_scan(&mut self) -> BleResult<()> {
        *self.inner.scanning.lock() = false;
        Ok(())
    }

    async fn connect(&mut self, device_id: &str) -> BleResult<MockPeripheral> {
        let delay = *self.inner.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if std::mem::take(&mut *self.inner.fail_next_connect.lock()) {
            return Err(BleError::DeviceNotFound(device_id.to_string()));
        }
        *self.inner.connected.lock() = Some(device_id.to_string());
        Ok(MockPeripheral {
            inner: Arc::clone(&self.inner),
            device_id: device_id.to_string(),
        })
    }
}

pub struct MockPeripheral {
    inner: Arc<Inner>,
    device_id: String,
}

#[async_trait]
impl RadioPeripheral for MockPeripheral {
    type Link = MockLink;

    async fn discover(self, profile: &BleProfile) -> BleResult<MockLink> {
        let mtu = *self.inner.mtu.lock();
        self.inner.reassembly.lock().reset();
        Ok(MockLink {
            reply_mtu: mtu.unwrap_or(usize::from(profile.mtu_hint)),
            mtu,
            inner: self.inner,
            device_id: self.device_id,
        })
    }
}

pub struct MockLink {
    inner: Arc<Inner>,
    device_id: String,
    mtu: Option<usize>,
    reply_mtu: usize,
}

#[async_trait]
impl RadioLink for MockLink {
    async fn write(&mut self, frame: &[u8]) -> BleResult<()> {
        self.inner.written.lock().push(frame.to_vec());

        let outcome = self
            .inner
            .reassembly
            .lock()
            .push(frame)
            .map_err(|err| BleError::Link(err.to_string()))?;
        let ReassemblyOutcome::Complete(command) = outcome else {
            return Ok(());
        };
        self.inner.commands.lock().push(command.clone());

        let reply = self
            .inner
            .responder
            .lock()
            .as_mut()
            .and_then(|responder| responder(&command));
        let Some(reply) = reply else {
            debug!(bytes = command.len(), "mock device left command unanswered");
            return Ok(());
        };
        let frames = encode_apdu(&reply, self.reply_mtu)
            .map_err(|err| BleError::Link(err.to_string()))?;
        for value in frames {
            self.inner.emit(RadioEvent::Notification {
                device_id: self.device_id.clone(),
                value,
            });
        }
        Ok(())
    }

    fn mtu(&self) -> Option<usize> {
        self.mtu
    }

    async fn is_connected(&self) -> BleResult<bool> {
        Ok(self.inner.connected.lock().as_deref() == Some(self.device_id.as_str()))
    }

    async fn disconnect(&mut self) -> BleResult<()> {
        let mut connected = self.inner.connected.lock();
        if connected.as_deref() == Some(self.device_id.as_str()) {
            *connected = None;
        }
        Ok(())
    }
}
