use std::collections::BTreeSet;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::profile::redact_device_id;
use crate::radio::{RadioEvent, RadioEventSink, RadioLink, RadioPeripheral};
use crate::{BleError, BleProfile, BleResult};

/// Overrides the MTU used for framing; btleplug does not expose the
/// negotiated value on every platform.
const MTU_OVERRIDE_ENV: &str = "HWK_BLE_MTU";

pub struct BtleplugPeripheral {
    peripheral: Peripheral,
    device_id: String,
    sink: RadioEventSink,
}

impl BtleplugPeripheral {
    pub(crate) fn new(peripheral: Peripheral, device_id: String, sink: RadioEventSink) -> Self {
        Self {
            peripheral,
            device_id,
            sink,
        }
    }
}

#[async_trait]
impl RadioPeripheral for BtleplugPeripheral {
    type Link = BtleplugLink;

    async fn discover(self, profile: &BleProfile) -> BleResult<BtleplugLink> {
        let peripheral = self.peripheral;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let redacted_device_id = redact_device_id(&self.device_id);
        debug!(
            device_id = %redacted_device_id,
            profile = profile.id,
            characteristic_count = characteristics.len(),
            "BLE discovered characteristics"
        );

        let write_char =
            find_characteristic(&characteristics, profile.service_uuid, profile.write_uuid)
                .ok_or_else(|| BleError::missing("write", *profile))?;
        let notify_char =
            find_characteristic(&characteristics, profile.service_uuid, profile.notify_uuid)
                .ok_or_else(|| BleError::missing("notify", *profile))?;

        debug!(
            device_id = %redacted_device_id,
            write_props = ?write_char.properties,
            notify_props = ?notify_char.properties,
            "BLE characteristics resolved"
        );

        peripheral.subscribe(&notify_char).await?;
        let mut notifications = peripheral.notifications().await?;
        let notify_uuid = notify_char.uuid;
        let device_id = self.device_id;
        let sink = self.sink;
        let forwarder = tokio::spawn(async move {
            while let Some(event) = notifications.next().await {
                if event.uuid != notify_uuid {
                    continue;
                }
                debug!(bytes = event.value.len(), "BLE notification received");
                let forwarded = sink.send(RadioEvent::Notification {
                    device_id: device_id.clone(),
                    value: event.value,
                });
                if forwarded.is_err() {
                    break;
                }
            }
            debug!("BLE notification stream ended");
        });

        let mtu = std::env::var(MTU_OVERRIDE_ENV)
            .ok()
            .and_then(|value| value.parse::<usize>().ok());
        if let Some(mtu) = mtu {
            debug!(mtu, "BLE MTU taken from {MTU_OVERRIDE_ENV}");
        }

        Ok(BtleplugLink {
            peripheral,
            write_char,
            notify_char,
            forwarder,
            mtu,
        })
    }
}

pub struct BtleplugLink {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
    forwarder: JoinHandle<()>,
    mtu: Option<usize>,
}

#[async_trait]
impl RadioLink for BtleplugLink {
    async fn write(&mut self, frame: &[u8]) -> BleResult<()> {
        debug!(bytes = frame.len(), "BLE write frame");
        self.peripheral
            .write(&self.write_char, frame, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    fn mtu(&self) -> Option<usize> {
        self.mtu
    }

    async fn is_connected(&self) -> BleResult<bool> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn disconnect(&mut self) -> BleResult<()> {
        self.forwarder.abort();
        if !self.peripheral.is_connected().await? {
            return Ok(());
        }
        self.peripheral.unsubscribe(&self.notify_char).await?;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

fn find_characteristic(
    characteristics: &BTreeSet<Characteristic>,
    service_uuid: Uuid,
    uuid: Uuid,
) -> Option<Characteristic> {
    characteristics
        .iter()
        .find(|c| c.service_uuid == service_uuid && c.uuid == uuid)
        .cloned()
}
