//! Key custody backends behind one contract, and a manager that routes each
//! request to the keyring holding the address.
//!
//! Backends: software HD ([`HdKeyring`]), BLE hardware signer
//! ([`HardwareKeyring`]), watch-only ([`WatchOnlyKeyring`]) and multisig
//! coordinator ([`MultisigKeyring`]). Keyrings serialize themselves; the
//! [`KeyringManager`] stores each blob through a [`KeyringStore`] together with
//! an ordered index.

pub mod account;
pub mod eip712;
pub mod error;
pub mod eth;
pub mod hardware;
pub mod hd;
pub mod hex;
pub mod keyring;
pub mod manager;
pub mod multisig;
pub mod storage;
pub mod watch_only;

#[cfg(test)]
mod testing;

pub use account::Account;
pub use eip712::TypedData;
pub use error::{KeyringError, KeyringErrorKind, KeyringResult};
pub use eth::Signature;
pub use hardware::HardwareKeyring;
pub use hd::HdKeyring;
pub use keyring::{Keyring, KeyringId, KeyringKind};
pub use manager::KeyringManager;
pub use multisig::MultisigKeyring;
pub use storage::{FileStore, KeyringStore, MemoryStore};
pub use watch_only::WatchOnlyKeyring;

/// BIP44 account path for Ethereum; account `n` lives at `<base>/n`.
pub const DEFAULT_BASE_PATH: &str = "m/44'/60'/0'/0";
