use std::path::Path;

use anyhow::Result;

use crate::commands::common::open_manager;

pub async fn run(storage: &Path) -> Result<()> {
    let manager = open_manager(storage).await?;
    if manager.keyrings().is_empty() {
        println!("No keyrings stored in {}.", storage.display());
        return Ok(());
    }

    for keyring in manager.keyrings() {
        let accounts = keyring.list_accounts();
        println!(
            "{} keyring {} ({} account(s))",
            keyring.kind(),
            keyring.id(),
            accounts.len()
        );
        for account in accounts {
            match account.index {
                Some(index) => println!("  {} #{index}", account.address),
                None => println!("  {}", account.address),
            }
        }
    }
    Ok(())
}
