use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::{KeyringError, KeyringResult};
use crate::eth::{Signature, checksum};
use crate::keyring::{KeyringId, KeyringKind};
use crate::manager::KeyringManager;

/// A shared contract-wallet address controlled by `threshold` of `owners`.
///
/// The keyring only records the policy. Collecting owner signatures is left
/// to the caller, which can use [`MultisigKeyring::owners_held_by`] to find
/// which of them this wallet can produce.
#[derive(Debug, Clone)]
pub struct MultisigKeyring {
    id: KeyringId,
    address: String,
    owners: Vec<String>,
    threshold: usize,
}

#[derive(Serialize, Deserialize)]
struct MultisigSnapshot {
    address: String,
    owners: Vec<String>,
    threshold: usize,
}

fn unsupported(operation: &'static str) -> KeyringError {
    KeyringError::unsupported(KeyringKind::Multisig, operation)
}

impl MultisigKeyring {
    pub fn new(address: &str, owners: &[&str], threshold: usize) -> KeyringResult<Self> {
        let owners = owners
            .iter()
            .map(|owner| owner.to_string())
            .collect::<Vec<_>>();
        Self::with_id(KeyringId::new(), address, owners, threshold)
    }

    fn with_id(
        id: KeyringId,
        address: &str,
        owners: Vec<String>,
        threshold: usize,
    ) -> KeyringResult<Self> {
        if threshold == 0 || threshold > owners.len() {
            return Err(KeyringError::InvalidThreshold {
                threshold,
                owners: owners.len(),
            });
        }

        let mut checked: Vec<String> = Vec::with_capacity(owners.len());
        for owner in &owners {
            let owner = checksum(owner)?;
            if checked.contains(&owner) {
                return Err(KeyringError::DuplicateAddress(owner));
            }
            checked.push(owner);
        }

        Ok(Self {
            id,
            address: checksum(address)?,
            owners: checked,
            threshold,
        })
    }

    pub fn id(&self) -> KeyringId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn owners(&self) -> &[String] {
        &self.owners
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Only the shared address is listed; owners belong to other keyrings.
    pub fn list_accounts(&self) -> Vec<Account> {
        vec![Account::watched(self.address.clone())]
    }

    /// Owners for which `manager` holds a keyring able to sign.
    pub fn owners_held_by(&self, manager: &KeyringManager) -> Vec<String> {
        self.owners
            .iter()
            .filter(|owner| {
                manager
                    .keyring_for(owner)
                    .is_ok_and(|keyring| keyring.can_sign())
            })
            .cloned()
            .collect()
    }

    /// Whether `manager` alone can meet the signing threshold.
    pub fn is_satisfiable_by(&self, manager: &KeyringManager) -> bool {
        self.owners_held_by(manager).len() >= self.threshold
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
        Ok(serde_json::to_vec(&MultisigSnapshot {
            address: self.address.clone(),
            owners: self.owners.clone(),
            threshold: self.threshold,
        })?)
    }

    pub fn deserialize(id: KeyringId, bytes: &[u8]) -> KeyringResult<Self> {
        let snapshot: MultisigSnapshot = serde_json::from_slice(bytes)?;
        Self::with_id(id, &snapshot.address, snapshot.owners, snapshot.threshold)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::DEFAULT_BASE_PATH;
    use crate::hd::HdKeyring;
    use crate::storage::MemoryStore;
    use crate::testing::TEST_MNEMONIC;

    const SAFE: &str = "0x000000000000000000000000000000000000beef";
    const OWNER_A: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const OWNER_B: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const OWNER_C: &str = "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826";

    #[test]
    fn threshold_must_fit_owner_count() {
        assert!(matches!(
            MultisigKeyring::new(SAFE, &[OWNER_A, OWNER_B], 0),
            Err(KeyringError::InvalidThreshold { threshold: 0, owners: 2 })
        ));
        assert!(matches!(
            MultisigKeyring::new(SAFE, &[OWNER_A, OWNER_B], 3),
            Err(KeyringError::InvalidThreshold { threshold: 3, owners: 2 })
        ));
        let lower = OWNER_A.to_lowercase();
        assert!(matches!(
            MultisigKeyring::new(SAFE, &[OWNER_A, lower.as_str()], 1),
            Err(KeyringError::DuplicateAddress(_))
        ));
        assert!(MultisigKeyring::new(SAFE, &[OWNER_A, OWNER_B], 2).is_ok());
    }

    #[test]
    fn lists_only_shared_address_and_refuses_to_sign() {
        let mut keyring = MultisigKeyring::new(SAFE, &[OWNER_A, OWNER_B], 1).unwrap();
        let accounts = keyring.list_accounts();
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].matches(SAFE));

        assert!(matches!(
            keyring.sign_message(SAFE, b"hi"),
            Err(KeyringError::UnsupportedOperation {
                kind: KeyringKind::Multisig,
                ..
            })
        ));
        assert!(keyring.derive_accounts(1).is_err());
    }

    #[tokio::test]
    async fn owners_held_by_counts_signing_keyrings() {
        let mut manager = KeyringManager::new(Arc::new(MemoryStore::new()));
        let mut hd = HdKeyring::from_mnemonic(TEST_MNEMONIC, DEFAULT_BASE_PATH).unwrap();
        hd.derive_accounts(2).unwrap();
        manager.add_keyring(hd.into()).await.unwrap();

        let multisig = MultisigKeyring::new(SAFE, &[OWNER_A, OWNER_B, OWNER_C], 2).unwrap();
        assert_eq!(
            multisig.owners_held_by(&manager),
            vec![OWNER_A.to_string(), OWNER_B.to_string()]
        );
        assert!(multisig.is_satisfiable_by(&manager));

        let strict = MultisigKeyring::new(SAFE, &[OWNER_A, OWNER_C], 2).unwrap();
        assert!(!strict.is_satisfiable_by(&manager));
    }

    #[test]
    fn serialize_round_trip() {
        let keyring = MultisigKeyring::new(SAFE, &[OWNER_A, OWNER_B], 2).unwrap();
        let restored =
            MultisigKeyring::deserialize(keyring.id(), &keyring.serialize().unwrap()).unwrap();
        assert_eq!(restored.owners(), keyring.owners());
        assert_eq!(restored.threshold(), 2);
        assert_eq!(restored.address(), checksum(SAFE).unwrap());
    }
}
