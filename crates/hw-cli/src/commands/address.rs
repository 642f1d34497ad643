use anyhow::{Context, Result};
use tracing::info;

use crate::cli::AddressArgs;
use crate::commands::common::hardware_keyring;

pub async fn run(args: AddressArgs) -> Result<()> {
    info!(
        "address command started: index={} display={} base_path='{}'",
        args.index, args.display, args.device.base_path
    );
    let keyring = hardware_keyring(&args.device).await?;

    match keyring.app_configuration().await {
        Ok(configuration) => println!("Ethereum app {}", configuration.version()),
        Err(err) => info!("could not read app configuration: {err}"),
    }

    if args.display {
        println!("Confirm the address on the device...");
    }
    let account = keyring
        .fetch_address(args.index, args.display)
        .await
        .context("get-address failed")?;

    println!("Path: {}/{}", keyring.base_path(), args.index);
    println!("Address: {}", account.address);
    Ok(())
}
