use std::sync::Arc;

use ble_transport::TransportHandle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{self, Account};
use crate::error::{KeyringError, KeyringResult};
use crate::eth::Signature;
use crate::keyring::{Keyring, KeyringId, KeyringKind, STORAGE_PREFIX};
use crate::storage::KeyringStore;
use crate::watch_only::WatchOnlyKeyring;

pub const CURRENT_INDEX_SCHEMA_VERSION: u32 = 1;

pub fn index_key() -> String {
    format!("{STORAGE_PREFIX}/index")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexEntry {
    id: KeyringId,
    kind: KeyringKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyringIndex {
    schema_version: u32,
    keyrings: Vec<IndexEntry>,
}

/// Ordered set of keyrings. Requests are routed to the first keyring, in
/// registration order, that lists the requested address.
pub struct KeyringManager {
    store: Arc<dyn KeyringStore>,
    keyrings: Vec<Keyring>,
}

impl KeyringManager {
    pub fn new(store: Arc<dyn KeyringStore>) -> Self {
        Self {
            store,
            keyrings: Vec::new(),
        }
    }

    /// Rebuilds the manager from the persisted index. Hardware keyrings get
    /// `transport` attached.
    pub async fn restore(
        store: Arc<dyn KeyringStore>,
        transport: Option<TransportHandle>,
    ) -> KeyringResult<Self> {
        let mut manager = Self::new(store);
        let Some(bytes) = manager.store.load(&index_key()).await? else {
            debug!("no keyring index stored, starting empty");
            return Ok(manager);
        };

        let index: KeyringIndex = serde_json::from_slice(&bytes)?;
        if index.schema_version != CURRENT_INDEX_SCHEMA_VERSION {
            return Err(KeyringError::UnsupportedSchemaVersion {
                found: index.schema_version,
                supported: CURRENT_INDEX_SCHEMA_VERSION,
            });
        }

        for entry in index.keyrings {
            let key = crate::keyring::storage_key(entry.kind, entry.id);
            let keyring = match manager.store.load(&key).await? {
                Some(blob) => Keyring::deserialize(entry.kind, entry.id, &blob, transport.as_ref())?,
                None => match Keyring::empty(entry.kind, entry.id, transport.as_ref()) {
                    Some(keyring) => keyring,
                    None => {
                        warn!(keyring = %entry.id, kind = %entry.kind, "keyring blob missing, skipping");
                        continue;
                    }
                },
            };
            manager.keyrings.push(keyring);
        }

        info!(keyrings = manager.keyrings.len(), "keyrings restored");
        Ok(manager)
    }

    pub fn attach_transport(&mut self, transport: &TransportHandle) {
        for keyring in &mut self.keyrings {
            if let Keyring::Hardware(hardware) = keyring {
                hardware.attach_transport(transport.clone());
            }
        }
    }

    /// Registers `keyring` after every existing one and persists it.
    pub async fn add_keyring(&mut self, keyring: Keyring) -> KeyringResult<KeyringId> {
        let id = keyring.id();
        let kind = keyring.kind();
        if self.keyring(id).is_some() {
            return Err(KeyringError::KeyringExists(id));
        }
        account::ensure_unique(&keyring.list_accounts())?;

        self.save_keyring(&keyring).await?;
        self.keyrings.push(keyring);
        if let Err(err) = self.save_index().await {
            self.keyrings.pop();
            return Err(err);
        }
        info!(keyring = %id, kind = %kind, "keyring added");
        Ok(id)
    }

    pub async fn remove_keyring(&mut self, id: KeyringId) -> KeyringResult<Keyring> {
        let position = self.position(id)?;
        let keyring = self.keyrings.remove(position);
        if let Err(err) = self.save_index().await {
            self.keyrings.insert(position, keyring);
            return Err(err);
        }
        self.store.remove(&keyring.storage_key()).await?;
        info!(keyring = %id, "keyring removed");
        Ok(keyring)
    }

    pub fn keyring(&self, id: KeyringId) -> Option<&Keyring> {
        self.keyrings.iter().find(|keyring| keyring.id() == id)
    }

    pub fn keyrings(&self) -> &[Keyring] {
        &self.keyrings
    }

    /// Every listed account in dispatch order. An address held by several
    /// keyrings appears once per keyring.
    pub fn accounts(&self) -> Vec<Account> {
        self.keyrings
            .iter()
            .flat_map(|keyring| keyring.list_accounts())
            .collect()
    }

    pub async fn derive_accounts(
        &mut self,
        id: KeyringId,
        count: usize,
    ) -> KeyringResult<Vec<Account>> {
        let position = self.position(id)?;
        let derived = self.keyrings[position].derive_accounts(count).await?;
        self.save_keyring(&self.keyrings[position]).await?;
        Ok(derived)
    }

    /// Adds `address` to the first watch-only keyring, creating one when none
    /// is registered yet.
    pub async fn add_watch_address(&mut self, address: &str) -> KeyringResult<Account> {
        let existing = self
            .keyrings
            .iter()
            .position(|keyring| matches!(keyring, Keyring::WatchOnly(_)));

        if let Some(position) = existing
            && let Keyring::WatchOnly(watch) = &mut self.keyrings[position]
        {
            let account = watch.add_address(address)?;
            self.save_keyring(&self.keyrings[position]).await?;
            return Ok(account);
        }

        let mut watch = WatchOnlyKeyring::new();
        let account = watch.add_address(address)?;
        self.add_keyring(watch.into()).await?;
        Ok(account)
    }

    /// Removes `address` from the keyring that currently answers for it.
    pub async fn remove_account(&mut self, address: &str) -> KeyringResult<Account> {
        let position = self.position_for(address)?;
        let removed = self.keyrings[position].remove_account(address)?;
        self.save_keyring(&self.keyrings[position]).await?;
        info!(keyring = %self.keyrings[position].id(), address = %removed.address, "account removed");
        Ok(removed)
    }

    pub fn keyring_for(&self, address: &str) -> KeyringResult<&Keyring> {
        let position = self.position_for(address)?;
        Ok(&self.keyrings[position])
    }

    pub async fn sign_transaction(&self, address: &str, raw_tx: &[u8]) -> KeyringResult<Signature> {
        let keyring = self.dispatch(address)?;
        keyring.sign_transaction(address, raw_tx).await
    }

    pub async fn sign_message(&self, address: &str, message: &[u8]) -> KeyringResult<Signature> {
        let keyring = self.dispatch(address)?;
        keyring.sign_message(address, message).await
    }

    pub async fn sign_typed_data(&self, address: &str, json: &str) -> KeyringResult<Signature> {
        let keyring = self.dispatch(address)?;
        keyring.sign_typed_data(address, json).await
    }

    fn dispatch(&self, address: &str) -> KeyringResult<&Keyring> {
        let keyring = self.keyring_for(address)?;
        debug!(keyring = %keyring.id(), kind = %keyring.kind(), address, "dispatching request");
        Ok(keyring)
    }

    fn position(&self, id: KeyringId) -> KeyringResult<usize> {
        self.keyrings
            .iter()
            .position(|keyring| keyring.id() == id)
            .ok_or(KeyringError::KeyringNotFound(id))
    }

    fn position_for(&self, address: &str) -> KeyringResult<usize> {
        self.keyrings
            .iter()
            .position(|keyring| keyring.contains(address))
            .ok_or_else(|| KeyringError::AddressNotFound(address.to_string()))
    }

    async fn save_keyring(&self, keyring: &Keyring) -> KeyringResult<()> {
        let bytes = keyring.serialize()?;
        self.store.save(&keyring.storage_key(), &bytes).await
    }

    async fn save_index(&self) -> KeyringResult<()> {
        let index = KeyringIndex {
            schema_version: CURRENT_INDEX_SCHEMA_VERSION,
            keyrings: self
                .keyrings
                .iter()
                .map(|keyring| IndexEntry {
                    id: keyring.id(),
                    kind: keyring.kind(),
                })
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&index)?;
        self.store.save(&index_key(), &bytes).await
    }
}
