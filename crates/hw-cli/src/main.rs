mod cli;
mod commands;
mod config;
mod logging;
mod ui;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::storage_dir;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    let storage = storage_dir(cli.storage_dir.as_deref());

    match cli.command {
        Command::Scan(args) => commands::scan::run(args).await,
        Command::Address(args) => commands::address::run(args).await,
        Command::SignMessage(args) => commands::sign::run_message(args).await,
        Command::SignTx(args) => commands::sign::run_transaction(args).await,
        Command::Accounts => commands::accounts::run(&storage).await,
        Command::Watch(args) => commands::watch::run(args, &storage).await,
    }
}
