use anyhow::Result;
use ble_transport::config::DEFAULT_COMMAND_TIMEOUT;
use tracing::debug;

use crate::cli::ScanArgs;
use crate::commands::common::{discover, print_devices, spawn_transport};

pub async fn run(args: ScanArgs) -> Result<()> {
    debug!("scan command: scan_secs={}", args.scan_secs);
    let transport = spawn_transport(args.scan_secs, DEFAULT_COMMAND_TIMEOUT.as_secs()).await?;

    println!("Scanning for devices for {}s...", args.scan_secs);
    let devices = discover(&transport, args.scan_secs, None).await?;
    transport.shutdown().await.ok();

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    print_devices(&devices);
    Ok(())
}
