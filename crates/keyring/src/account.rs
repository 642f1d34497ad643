use device_apdu::HARDENED;
use serde::{Deserialize, Serialize};

use crate::error::{KeyringError, KeyringResult};
use crate::eth::same_address;

/// An address held by a keyring, plus what the backend needs to sign for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    /// Last component of the derivation path for HD-style backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl Account {
    pub fn derived(address: impl Into<String>, index: u32) -> Self {
        Self {
            address: address.into(),
            index: Some(index),
        }
    }

    pub fn watched(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            index: None,
        }
    }

    pub fn matches(&self, address: &str) -> bool {
        same_address(&self.address, address)
    }
}

pub(crate) fn find<'a>(accounts: &'a [Account], address: &str) -> Option<&'a Account> {
    accounts.iter().find(|account| account.matches(address))
}

/// Rejects a list that holds the same address twice, in any letter case.
pub(crate) fn ensure_unique(accounts: &[Account]) -> KeyringResult<()> {
    for (position, account) in accounts.iter().enumerate() {
        if find(&accounts[..position], &account.address).is_some() {
            return Err(KeyringError::DuplicateAddress(account.address.clone()));
        }
    }
    Ok(())
}

/// Rejects duplicated addresses and account indices that cannot be the last,
/// unhardened component of a derivation path.
pub(crate) fn validate(accounts: &[Account]) -> KeyringResult<()> {
    ensure_unique(accounts)?;
    match accounts
        .iter()
        .find(|account| account.index.is_some_and(|index| index >= HARDENED))
    {
        Some(account) => Err(KeyringError::Derivation(format!(
            "account {} has out-of-range index",
            account.address
        ))),
        None => Ok(()),
    }
}

/// Next unused derivation index.
pub(crate) fn next_index(accounts: &[Account]) -> KeyringResult<u32> {
    match accounts.iter().filter_map(|account| account.index).max() {
        None => Ok(0),
        Some(index) => index
            .checked_add(1)
            .filter(|next| *next < HARDENED)
            .ok_or_else(|| KeyringError::Derivation("account index overflow".into())),
    }
}
