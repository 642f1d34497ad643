use serde::{Deserialize, Serialize};
use tracing::info;

use crate::account::{self, Account};
use crate::error::{KeyringError, KeyringResult};
use crate::eth::{Signature, checksum};
use crate::keyring::{KeyringId, KeyringKind};

/// Addresses tracked without any key material.
#[derive(Debug, Default)]
pub struct WatchOnlyKeyring {
    id: KeyringId,
    accounts: Vec<Account>,
}

#[derive(Serialize, Deserialize)]
struct WatchOnlySnapshot {
    #[serde(default)]
    accounts: Vec<Account>,
}

fn unsupported(operation: &'static str) -> KeyringError {
    KeyringError::unsupported(KeyringKind::WatchOnly, operation)
}

impl WatchOnlyKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_id(id: KeyringId) -> Self {
        Self {
            id,
            accounts: Vec::new(),
        }
    }

    pub fn id(&self) -> KeyringId {
        self.id
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        self.accounts.clone()
    }

    /// Tracks `address`, stored in checksummed form.
    pub fn add_address(&mut self, address: &str) -> KeyringResult<Account> {
        let address = checksum(address)?;
        if account::find(&self.accounts, &address).is_some() {
            return Err(KeyringError::DuplicateAddress(address));
        }
        let account = Account::watched(address);
        self.accounts.push(account.clone());
        info!(keyring = %self.id, address = %account.address, "watch-only address added");
        Ok(account)
    }

    pub fn remove_address(&mut self, address: &str) -> KeyringResult<Account> {
        let position = self
            .accounts
            .iter()
            .position(|account| account.matches(address))
            .ok_or_else(|| KeyringError::AccountNotFound(address.to_string()))?;
        Ok(self.accounts.remove(position))
    }

    pub fn derive_accounts(&mut self, _count: usize) -> KeyringResult<Vec<Account>> {
        Err(unsupported("deriving accounts"))
    }

    pub fn sign_transaction(&self, _address: &str, _raw_tx: &[u8]) -> KeyringResult<Signature> {
        Err(unsupported("signing transactions"))
    }

    pub fn sign_message(&self, _address: &str, _message: &[u8]) -> KeyringResult<Signature> {
        Err(unsupported("signing messages"))
    }

    pub fn sign_typed_data(&self, _address: &str, _json: &str) -> KeyringResult<Signature> {
        Err(unsupported("signing typed data"))
    }

    pub fn serialize(&self) -> KeyringResult<Vec<u8>> {
        Ok(serde_json::to_vec(&WatchOnlySnapshot {
            accounts: self.accounts.clone(),
        })?)
    }

    pub fn deserialize(id: KeyringId, bytes: &[u8]) -> KeyringResult<Self> {
        let snapshot: WatchOnlySnapshot = serde_json::from_slice(bytes)?;
        account::ensure_unique(&snapshot.accounts)?;
        Ok(Self {
            id,
            accounts: snapshot.accounts,
        })
    }
}
