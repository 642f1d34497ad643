use anyhow::{Context, Result};
use keyring::{HardwareKeyring, Signature};
use tracing::info;

use crate::cli::{DeviceArgs, SignMessageArgs, SignTxArgs};
use crate::commands::common::{hardware_keyring, parse_hex, parse_message};

pub async fn run_message(args: SignMessageArgs) -> Result<()> {
    let message = parse_message(&args.message)?;
    info!(
        "sign-message command started: index={} bytes={}",
        args.index,
        message.len()
    );
    let (keyring, address) = signer(&args.device, args.index).await?;

    println!("Confirm the message on the device...");
    let signature = keyring
        .sign_message(&address, &message)
        .await
        .context("sign-message failed")?;
    print_signature(&address, &signature);
    Ok(())
}

pub async fn run_transaction(args: SignTxArgs) -> Result<()> {
    let raw_tx = parse_hex(&args.tx)?;
    info!(
        "sign-tx command started: index={} bytes={}",
        args.index,
        raw_tx.len()
    );
    let (keyring, address) = signer(&args.device, args.index).await?;

    println!("Review the transaction on the device...");
    let signature = keyring
        .sign_transaction(&address, &raw_tx)
        .await
        .context("sign-tx failed")?;
    print_signature(&address, &signature);
    Ok(())
}

async fn signer(device: &DeviceArgs, index: u32) -> Result<(HardwareKeyring, String)> {
    let mut keyring = hardware_keyring(device).await?;
    let account = keyring
        .add_account(index, false)
        .await
        .context("get-address failed")?;
    Ok((keyring, account.address))
}

fn print_signature(address: &str, signature: &Signature) {
    println!("Signer: {address}");
    println!("Signature: {}", signature.to_hex());
    println!("  r: 0x{}", hex::encode(signature.r));
    println!("  s: 0x{}", hex::encode(signature.s));
    println!("  v: {}", signature.v);
}
