use std::fmt;
use std::str::FromStr;

use ble_transport::TransportHandle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Account;
use crate::error::{KeyringError, KeyringResult};
use crate::eth::Signature;
use crate::hardware::HardwareKeyring;
use crate::hd::HdKeyring;
use crate::multisig::MultisigKeyring;
use crate::watch_only::WatchOnlyKeyring;

pub const STORAGE_PREFIX: &str = "keyring";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyringId(Uuid);

impl KeyringId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyringId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KeyringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for KeyringId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyringKind {
    SoftwareHd,
    Hardware,
    WatchOnly,
    Multisig,
}

impl KeyringKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SoftwareHd => "software-hd",
            Self::Hardware => "hardware",
            Self::WatchOnly => "watch-only",
            Self::Multisig => "multisig",
        }
    }
}

impl fmt::Display for KeyringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `keyring/<kind>/<id>`
pub fn storage_key(kind: KeyringKind, id: KeyringId) -> String {
    format!("{STORAGE_PREFIX}/{kind}/{id}")
}

/// One unit of key custody. The set of backends is closed, so every
/// operation is an exhaustive match.
#[derive(Debug)]
pub enum Keyring {
    SoftwareHd(HdKeyring),
    Hardware(HardwareKeyring),
    WatchOnly(WatchOnlyKeyring),
    Multisig(MultisigKeyring),
}

impl Keyring {
    pub fn id(&self) -> KeyringId {
        match self {
            Self::SoftwareHd(keyring) => keyring.id(),
            Self::Hardware(keyring) => keyring.id(),
            Self::WatchOnly(keyring) => keyring.id(),
            Self::Multisig(keyring) => keyring.id(),
        }
    }

    pub fn kind(&self) -> KeyringKind {
        match self {
            Self::SoftwareHd(_) => KeyringKind::SoftwareHd,
            Self::Hardware(_) => KeyringKind::Hardware,
            Self::WatchOnly(_) => KeyringKind::WatchOnly,
            Self::Multisig(_) => KeyringKind::Multisig,
        }
    }

    pub fn storage_key(&self) -> String {
        storage_key(self.kind(), self.id())
    }

    /// Whether this backend holds key material it can sign with.
    pub fn can_sign(&self) -> bool {
        match self {
            Self::SoftwareHd(_) | Self::Hardware(_) => true,
            Self::WatchOnly(_) | Self::Multisig(_) => false,
        }
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        match self {
            Self::SoftwareHd(keyring) => keyring.list_accounts(),
            Self::Hardware(keyring) => keyring.list_accounts(),
            Self::WatchOnly(keyring) => keyring.list_accounts(),
            Self::Multisig(keyring) => keyring.list_accounts(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.list_accounts()
            .iter()
            .any(|account| account.matches(address))
    }

    /// Appends `count` new accounts and returns them.
    pub async fn derive_accounts(&mut self, count: usize) -> KeyringResult<Vec<Account>> {
        match self {
            Self::SoftwareHd(keyring) => keyring.derive_accounts(count),
            Self::Hardware(keyring) => keyring.derive_accounts(count).await,
            Self::WatchOnly(keyring) => keyring.derive_accounts(count),
            Self::Multisig(keyring) => keyring.derive_accounts(count),
        }
    }

    pub async fn sign_transaction(&self, address: &str, raw_tx: &[u8]) -> KeyringResult<Signature> {
        match self {
            Self::SoftwareHd(keyring) => keyring.sign_transaction(address, raw_tx),
            Self::Hardware(keyring) => keyring.sign_transaction(address, raw_tx).await,
            Self::WatchOnly(keyring) => keyring.sign_transaction(address, raw_tx),
            Self::Multisig(keyring) => keyring.sign_transaction(address, raw_tx),
        }
    }

    pub async fn sign_message(&self, address: &str, message: &[u8]) -> KeyringResult<Signature> {
        match self {
            Self::SoftwareHd(keyring) => keyring.sign_message(address, message),
            Self::Hardware(keyring) => keyring.sign_message(address, message).await,
            Self::WatchOnly(keyring) => keyring.sign_message(address, message),
            Self::Multisig(keyring) => keyring.sign_message(address, message),
        }
    }

    pub async fn sign_typed_data(&self, address: &str, json: &str) -> KeyringResult<Signature> {
        match self {
            Self::SoftwareHd(keyring) => keyring.sign_typed_data(address, json),
            Self::Hardware(keyring) => keyring.sign_typed_data(address, json).await,
            Self::WatchOnly(keyring) => keyring.sign_typed_data(address, json),
            Self::Multisig(keyring) => keyring.sign_typed_data(address, json),
        }
    }

    pub fn remove_account(&mut self, address: &str) -> KeyringResult<Account> {
        match self {
            Self::SoftwareHd(keyring) => keyring.remove_account(address),
            Self::Hardware(keyring) => keyring.remove_account(address),
            Self::WatchOnly(keyring) => keyring.remove_address(address),
            Self::Multisig(_) => Err(KeyringError::unsupported(
                KeyringKind::Multisig,
                "removing accounts",
            )),
        }
    }

    /// Serializes this keyring's own blob.
    pub fn serialize(&self) -> KeyringResult<Vec<u8>> {
        match self {
            Self::SoftwareHd(keyring) => keyring.serialize(),
            Self::Hardware(keyring) => keyring.serialize(),
            Self::WatchOnly(keyring) => keyring.serialize(),
            Self::Multisig(keyring) => keyring.serialize(),
        }
    }

    pub fn deserialize(
        kind: KeyringKind,
        id: KeyringId,
        bytes: &[u8],
        transport: Option<&TransportHandle>,
    ) -> KeyringResult<Self> {
        Ok(match kind {
            KeyringKind::SoftwareHd => Self::SoftwareHd(HdKeyring::deserialize(id, bytes)?),
            KeyringKind::Hardware => {
                Self::Hardware(HardwareKeyring::deserialize(id, bytes, transport.cloned())?)
            }
            KeyringKind::WatchOnly => Self::WatchOnly(WatchOnlyKeyring::deserialize(id, bytes)?),
            KeyringKind::Multisig => Self::Multisig(MultisigKeyring::deserialize(id, bytes)?),
        })
    }

    /// Keyring to use when no blob was ever stored. Backends that cannot exist
    /// without their key material or configuration return `None`.
    pub fn empty(
        kind: KeyringKind,
        id: KeyringId,
        transport: Option<&TransportHandle>,
    ) -> Option<Self> {
        match kind {
            KeyringKind::Hardware => Some(Self::Hardware(HardwareKeyring::with_id(
                id,
                transport.cloned(),
                crate::DEFAULT_BASE_PATH,
            ))),
            KeyringKind::WatchOnly => Some(Self::WatchOnly(WatchOnlyKeyring::with_id(id))),
            KeyringKind::SoftwareHd | KeyringKind::Multisig => None,
        }
    }
}

impl From<HdKeyring> for Keyring {
    fn from(keyring: HdKeyring) -> Self {
        Self::SoftwareHd(keyring)
    }
}

impl From<HardwareKeyring> for Keyring {
    fn from(keyring: HardwareKeyring) -> Self {
        Self::Hardware(keyring)
    }
}

impl From<WatchOnlyKeyring> for Keyring {
    fn from(keyring: WatchOnlyKeyring) -> Self {
        Self::WatchOnly(keyring)
    }
}

impl From<MultisigKeyring> for Keyring {
    fn from(keyring: MultisigKeyring) -> Self {
        Self::Multisig(keyring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_includes_kind_and_id() {
        let id: KeyringId = "6f9b6c1e-3a43-4f5e-9a0c-2b1d8e7f6a55".parse().unwrap();
        assert_eq!(
            storage_key(KeyringKind::WatchOnly, id),
            "keyring/watch-only/6f9b6c1e-3a43-4f5e-9a0c-2b1d8e7f6a55"
        );
    }

    #[test]
    fn kinds_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&KeyringKind::SoftwareHd).unwrap(),
            r#""software-hd""#
        );
        for kind in [
            KeyringKind::SoftwareHd,
            KeyringKind::Hardware,
            KeyringKind::WatchOnly,
            KeyringKind::Multisig,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn only_stateless_kinds_restore_empty() {
        let id = KeyringId::new();
        assert!(Keyring::empty(KeyringKind::WatchOnly, id, None).is_some());
        assert!(Keyring::empty(KeyringKind::Hardware, id, None).is_some());
        assert!(Keyring::empty(KeyringKind::SoftwareHd, id, None).is_none());
        assert!(Keyring::empty(KeyringKind::Multisig, id, None).is_none());
    }
}
