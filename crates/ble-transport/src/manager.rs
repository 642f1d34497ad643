use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::profile::redact_device_id;
use crate::radio::{Radio, RadioEvent, RadioEventSink};
use crate::session::BtleplugPeripheral;
use crate::{BleError, BleProfile, BleResult, Device};

/// [`Radio`] backed by the first adapter btleplug reports.
pub struct BtleplugRadio {
    adapter: Adapter,
    sink: Option<RadioEventSink>,
    event_task: Option<JoinHandle<()>>,
}

impl BtleplugRadio {
    pub async fn new() -> BleResult<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(BleError::AdapterUnavailable)?;
        Ok(Self {
            adapter,
            sink: None,
            event_task: None,
        })
    }

    fn sink(&self) -> BleResult<RadioEventSink> {
        self.sink
            .clone()
            .ok_or_else(|| BleError::Link("radio not attached".to_string()))
    }
}

#[async_trait]
impl Radio for BtleplugRadio {
    type Peripheral = BtleplugPeripheral;

    async fn attach(&mut self, sink: RadioEventSink) -> BleResult<()> {
        let mut events = self.adapter.events().await?;
        let adapter = self.adapter.clone();
        let forward = sink.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(event) = map_central_event(&adapter, event).await else {
                    continue;
                };
                if forward.send(event).is_err() {
                    break;
                }
            }
            debug!("BLE adapter event stream ended");
        });

        if let Some(previous) = self.event_task.replace(task) {
            previous.abort();
        }
        self.sink = Some(sink);
        Ok(())
    }

    async fn start_scan(&mut self, profile: &BleProfile) -> BleResult<()> {
        let filter = ScanFilter {
            services: vec![profile.service_uuid],
        };
        self.adapter.start_scan(filter).await?;
        Ok(())
    }

    async fn stop_scan(&mut self) -> BleResult<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&mut self, device_id: &str) -> BleResult<BtleplugPeripheral> {
        let peripheral = find_peripheral(&self.adapter, device_id).await?;
        if !peripheral.is_connected().await? {
            debug!(device_id = %redact_device_id(device_id), "BLE connecting");
            peripheral.connect().await?;
        }
        Ok(BtleplugPeripheral::new(
            peripheral,
            device_id.to_string(),
            self.sink()?,
        ))
    }
}

impl Drop for BtleplugRadio {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}

async fn find_peripheral(adapter: &Adapter, device_id: &str) -> BleResult<Peripheral> {
    adapter
        .peripherals()
        .await?
        .into_iter()
        .find(|peripheral| peripheral.id().to_string() == device_id)
        .ok_or_else(|| BleError::DeviceNotFound(device_id.to_string()))
}

async fn map_central_event(adapter: &Adapter, event: CentralEvent) -> Option<RadioEvent> {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            let peripheral = adapter.peripheral(&id).await.ok()?;
            match fetch_device(&peripheral).await {
                Ok(device) => device.map(RadioEvent::Discovered),
                Err(err) => {
                    warn!(error = %err, "BLE failed to read advertisement");
                    None
                }
            }
        }
        CentralEvent::DeviceDisconnected(id) => Some(RadioEvent::Disconnected {
            device_id: id.to_string(),
        }),
        CentralEvent::StateUpdate(CentralState::PoweredOff) => Some(RadioEvent::PoweredOff),
        _ => None,
    }
}

async fn fetch_device(peripheral: &Peripheral) -> BleResult<Option<Device>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };
    Ok(Some(Device::new(
        peripheral.id().to_string(),
        properties.local_name,
        properties.rssi,
    )))
}
