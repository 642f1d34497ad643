use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::WatchArgs;
use crate::commands::common::open_manager;

pub async fn run(args: WatchArgs, storage: &Path) -> Result<()> {
    let mut manager = open_manager(storage).await?;
    let account = manager
        .add_watch_address(&args.address)
        .await
        .with_context(|| format!("cannot watch {}", args.address))?;
    info!(address = %account.address, "watch-only address stored");
    println!("Watching {}", account.address);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ADDRESS: &str = "0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826";

    #[tokio::test]
    async fn watched_address_is_persisted_checksummed() {
        let dir = tempdir().unwrap();
        run(
            WatchArgs {
                address: ADDRESS.to_string(),
            },
            dir.path(),
        )
        .await
        .unwrap();

        let manager = open_manager(dir.path()).await.unwrap();
        let accounts = manager.accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].address, "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826");
    }

    #[tokio::test]
    async fn watching_twice_fails() {
        let dir = tempdir().unwrap();
        let args = || WatchArgs {
            address: ADDRESS.to_string(),
        };
        run(args(), dir.path()).await.unwrap();
        assert!(run(args(), dir.path()).await.is_err());
    }
}
