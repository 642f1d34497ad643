use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use keyring::DEFAULT_BASE_PATH;

#[derive(Parser, Debug)]
#[command(name = "hwk")]
#[command(about = "Ethereum signing with BLE hardware wallets")]
pub struct Cli {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Where keyrings are persisted. Defaults to `$HOME/.hwk`.
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Scan(ScanArgs),
    Address(AddressArgs),
    SignMessage(SignMessageArgs),
    SignTx(SignTxArgs),
    Accounts,
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[arg(long, default_value_t = 15)]
    pub scan_secs: u64,
}

/// Options shared by every command that talks to a device.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    #[arg(long, default_value_t = 15)]
    pub scan_secs: u64,
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
    #[arg(long)]
    pub device_id: Option<String>,
    #[arg(long, default_value = DEFAULT_BASE_PATH)]
    pub base_path: String,
}

#[derive(Args, Debug)]
pub struct AddressArgs {
    #[arg(long, default_value_t = 0)]
    pub index: u32,
    /// Show the address on the device for confirmation.
    #[arg(long, default_value_t = false)]
    pub display: bool,
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct SignMessageArgs {
    #[arg(long, default_value_t = 0)]
    pub index: u32,
    /// UTF-8 text, or `0x`-prefixed hex for raw bytes.
    #[arg(long)]
    pub message: String,
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct SignTxArgs {
    #[arg(long, default_value_t = 0)]
    pub index: u32,
    /// Unsigned serialized transaction, `0x`-prefixed hex.
    #[arg(long)]
    pub tx: String,
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    pub address: String,
}
