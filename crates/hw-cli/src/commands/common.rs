use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ble_transport::{
    BleProfile, BtleplugRadio, ConnectionState, Device, TransportConfig, TransportHandle,
};
use keyring::{FileStore, HardwareKeyring, KeyringManager};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::cli::DeviceArgs;
use crate::ui::prompt_line;

const DISCOVERY_POLL: Duration = Duration::from_millis(250);

/// Spawns the transport on the host's first Bluetooth adapter.
pub async fn spawn_transport(scan_secs: u64, timeout_secs: u64) -> Result<TransportHandle> {
    let radio = BtleplugRadio::new()
        .await
        .context("Bluetooth adapter unavailable")?;
    let config = TransportConfig::default()
        .with_scan_duration(Duration::from_secs(scan_secs))
        .with_command_timeout(Duration::from_secs(timeout_secs));
    TransportHandle::spawn(radio, BleProfile::nano_x(), config)
        .await
        .context("failed to start BLE transport")
}

/// Scans until the scan window closes, or until the requested device shows
/// up, and returns what was seen.
pub async fn discover(
    transport: &TransportHandle,
    scan_secs: u64,
    device_id: Option<&str>,
) -> Result<Vec<Device>> {
    transport.start_scanning().await.context("BLE scan failed")?;
    let deadline = Instant::now() + Duration::from_secs(scan_secs);

    loop {
        let devices = transport.discovered_devices().await?;
        let wanted_seen = device_id.is_some_and(|query| devices.iter().any(|d| d.id == query));
        let scanning = transport.state() == ConnectionState::Scanning;
        if wanted_seen || !scanning || Instant::now() >= deadline {
            transport.stop_scanning().await.ok();
            debug!(found = devices.len(), "discovery finished");
            return Ok(devices);
        }
        sleep(DISCOVERY_POLL).await;
    }
}

/// Finds, picks and connects a device, returning a transport ready for
/// commands.
pub async fn connect_device(args: &DeviceArgs) -> Result<TransportHandle> {
    let transport = spawn_transport(args.scan_secs, args.timeout_secs).await?;
    println!("Scanning for devices for up to {}s...", args.scan_secs);
    let devices = discover(&transport, args.scan_secs, args.device_id.as_deref()).await?;
    if devices.is_empty() {
        bail!("no devices found; make sure the device is unlocked and Bluetooth is on");
    }

    let device = select_device(devices, args.device_id.as_deref())?;
    println!("Connecting to {} ({})...", device.display_name(), device.id);
    transport
        .connect(device.id.clone())
        .await
        .with_context(|| format!("failed to connect to {}", device.id))?;
    Ok(transport)
}

pub async fn hardware_keyring(args: &DeviceArgs) -> Result<HardwareKeyring> {
    let transport = connect_device(args).await?;
    HardwareKeyring::new(transport, args.base_path.clone()).context("invalid --base-path")
}

pub async fn open_manager(storage: &Path) -> Result<KeyringManager> {
    let store = Arc::new(FileStore::new(storage));
    KeyringManager::restore(store, None)
        .await
        .with_context(|| format!("failed to load keyrings from {}", storage.display()))
}

pub fn select_device(mut devices: Vec<Device>, device_id: Option<&str>) -> Result<Device> {
    debug!(
        "select_device: candidates={}, device_id_filter={:?}",
        devices.len(),
        device_id
    );
    if let Some(query) = device_id {
        if let Some(idx) = devices.iter().position(|d| d.id == query) {
            return Ok(devices.remove(idx));
        }

        let matches: Vec<usize> = devices
            .iter()
            .enumerate()
            .filter(|(_, device)| device.id.contains(query))
            .map(|(idx, _)| idx)
            .collect();

        if matches.len() == 1 {
            return Ok(devices.remove(matches[0]));
        }
        if matches.is_empty() {
            bail!("no scanned device matched --device-id '{}'", query);
        }
        bail!(
            "--device-id '{}' matched multiple devices; use a full id",
            query
        );
    }

    if devices.len() == 1 {
        return Ok(devices.remove(0));
    }

    println!("Multiple devices found:");
    print_devices(&devices);
    let selected = prompt_device_selection(devices.len())?;
    Ok(devices.remove(selected))
}

pub fn print_devices(devices: &[Device]) {
    for (idx, device) in devices.iter().enumerate() {
        println!(
            "  {}. id={} name={} model={:?} rssi={}",
            idx + 1,
            device.id,
            device.display_name(),
            device.model,
            device
                .rssi
                .map(|v| v.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
}

/// `0x`-prefixed input is raw hex, anything else is taken as UTF-8 text.
pub fn parse_message(input: &str) -> Result<Vec<u8>> {
    match input.strip_prefix("0x") {
        Some(hex_part) => {
            hex::decode(hex_part).with_context(|| format!("invalid hex message '{input}'"))
        }
        None => Ok(input.as_bytes().to_vec()),
    }
}

pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let hex_part = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(hex_part).with_context(|| format!("invalid hex '{input}'"))
}

fn prompt_device_selection(total: usize) -> Result<usize> {
    loop {
        let input = prompt_line("Select device number: ")?;
        let number = input
            .parse::<usize>()
            .with_context(|| format!("invalid selection '{}'", input))?;
        if number == 0 || number > total {
            println!("Please enter a number between 1 and {}.", total);
            continue;
        }
        return Ok(number - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<Device> {
        vec![
            Device::new("AA:BB:CC:DD:EE:01", Some("Nano X 1A2B".into()), Some(-60)),
            Device::new("AA:BB:CC:DD:EE:02", Some("Stax 7".into()), None),
        ]
    }

    #[test]
    fn selects_exact_then_unique_partial_match() {
        let device = select_device(devices(), Some("AA:BB:CC:DD:EE:02")).unwrap();
        assert_eq!(device.name.as_deref(), Some("Stax 7"));

        let device = select_device(devices(), Some("EE:01")).unwrap();
        assert_eq!(device.id, "AA:BB:CC:DD:EE:01");
    }

    #[test]
    fn rejects_ambiguous_or_missing_match() {
        assert!(select_device(devices(), Some("AA:BB")).is_err());
        assert!(select_device(devices(), Some("FF:FF")).is_err());
    }

    #[test]
    fn single_device_needs_no_prompt() {
        let mut only = devices();
        only.truncate(1);
        assert_eq!(select_device(only, None).unwrap().id, "AA:BB:CC:DD:EE:01");
    }

    #[test]
    fn message_is_text_unless_hex_prefixed() {
        assert_eq!(parse_message("hello").unwrap(), b"hello".to_vec());
        assert_eq!(parse_message("0x68690a").unwrap(), b"hi\n".to_vec());
        assert!(parse_message("0xzz").is_err());
    }

    #[test]
    fn tx_hex_accepts_optional_prefix() {
        assert_eq!(parse_hex("0x02c0").unwrap(), vec![0x02, 0xc0]);
        assert_eq!(parse_hex("02c0").unwrap(), vec![0x02, 0xc0]);
    }
}
