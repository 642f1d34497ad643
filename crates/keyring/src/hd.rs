use std::fmt;

use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use k256::ecdsa::SigningKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::account::{self, Account};
use crate::eip712::TypedData;
use crate::error::{KeyringError, KeyringResult};
use crate::eth::{
    Signature, sign_personal_message, sign_prehash, sign_transaction_bytes,
    verifying_key_to_address,
};
use crate::keyring::{KeyringId, KeyringKind};

/// 128 bits of entropy give a 12-word mnemonic.
const GENERATED_ENTROPY_LEN: usize = 16;

/// Software keyring deriving secp256k1 keys from a BIP39 mnemonic.
pub struct HdKeyring {
    id: KeyringId,
    mnemonic: Zeroizing<String>,
    seed: Zeroizing<[u8; 64]>,
    base_path: String,
    accounts: Vec<Account>,
}

#[derive(Serialize, Deserialize)]
struct HdSnapshot {
    mnemonic: String,
    base_path: String,
    #[serde(default)]
    accounts: Vec<Account>,
}

impl HdKeyring {
    pub fn from_mnemonic(phrase: &str, base_path: impl Into<String>) -> KeyringResult<Self> {
        Self::with_id(KeyringId::new(), phrase, base_path.into(), Vec::new())
    }

    /// Creates a keyring around a fresh 12-word mnemonic.
    pub fn generate(base_path: impl Into<String>) -> KeyringResult<Self> {
        let mut entropy = Zeroizing::new([0u8; GENERATED_ENTROPY_LEN]);
        rand::thread_rng().fill_bytes(&mut entropy[..]);
        let mnemonic = Mnemonic::from_entropy(&entropy[..])
            .map_err(|err| KeyringError::InvalidMnemonic(err.to_string()))?;
        let phrase = Zeroizing::new(mnemonic.to_string());
        Self::from_mnemonic(&phrase, base_path)
    }

    fn with_id(
        id: KeyringId,
        phrase: &str,
        base_path: String,
        accounts: Vec<Account>,
    ) -> KeyringResult<Self> {
        let mnemonic = Mnemonic::parse_normalized(phrase)
            .map_err(|err| KeyringError::InvalidMnemonic(err.to_string()))?;
        device_apdu::parse_path(&base_path)?;
        account::validate(&accounts)?;

        Ok(Self {
            id,
            mnemonic: Zeroizing::new(mnemonic.to_string()),
            seed: Zeroizing::new(mnemonic.to_seed("")),
            base_path,
            accounts,
        })
    }

    pub fn id(&self) -> KeyringId {
        self.id
    }

    /// The recovery phrase, for backup screens.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        self.accounts.clone()
    }

    pub fn derive_accounts(&mut self, count: usize) -> KeyringResult<Vec<Account>> {
        let start = account::next_index(&self.accounts)?;
        let overflow = || KeyringError::Derivation("account index overflow".into());
        let count = u32::try_from(count).map_err(|_| overflow())?;
        let mut derived = Vec::new();
        for offset in 0..count {
            let index = start.checked_add(offset).ok_or_else(overflow)?;
            let key = self.signing_key(index)?;
            let address = verifying_key_to_address(key.verifying_key());
            debug!(index, address = %address, "derived software account");
            derived.push(Account::derived(address, index));
        }
        self.accounts.extend(derived.iter().cloned());
        info!(
            keyring = %self.id,
            added = derived.len(),
            total = self.accounts.len(),
            "software keyring accounts derived"
        );
        Ok(derived)
    }

    pub fn remove_account(&mut self, address: &str) -> KeyringResult<Account> {
        let position = self
            .accounts
            .iter()
            .position(|account| account.matches(address))
            .ok_or_else(|| KeyringError::AccountNotFound(address.to_string()))?;
        Ok(self.accounts.remove(position))
    }

    pub fn sign_transaction(&self, address: &str, raw_tx: &[u8]) -> KeyringResult<Signature> {
        let key = self.key_for(address)?;
        sign_transaction_bytes(&key, raw_tx)
    }

    pub fn sign_message(&self, address: &str, message: &[u8]) -> KeyringResult<Signature> {
        let key = self.key_for(address)?;
        sign_personal_message(&key, message)
    }

    pub fn sign_typed_data(&self, address: &str, json: &str) -> KeyringResult<Signature> {
        let key = self.key_for(address)?;
        let hash = TypedData::from_json(json)?.signing_hash()?;
        let mut signature = sign_prehash(&key, &hash)?;
        signature.v += 27;
        Ok(signature)
    }

    pub fn serialize(&self) -> KeyringResult<Vec<u8>> {
        let snapshot = HdSnapshot {
            mnemonic: self.mnemonic.to_string(),
            base_path: self.base_path.clone(),
            accounts: self.accounts.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot);
        drop(Zeroizing::new(snapshot.mnemonic));
        Ok(bytes?)
    }

    pub fn deserialize(id: KeyringId, bytes: &[u8]) -> KeyringResult<Self> {
        let snapshot: HdSnapshot = serde_json::from_slice(bytes)?;
        let mnemonic = Zeroizing::new(snapshot.mnemonic);
        Self::with_id(id, &mnemonic, snapshot.base_path, snapshot.accounts)
    }

    fn key_for(&self, address: &str) -> KeyringResult<SigningKey> {
        let index = account::find(&self.accounts, address)
            .and_then(|account| account.index)
            .ok_or_else(|| KeyringError::AccountNotFound(address.to_string()))?;
        self.signing_key(index)
    }

    fn signing_key(&self, index: u32) -> KeyringResult<SigningKey> {
        let path: DerivationPath = format!("{}/{index}", self.base_path)
            .parse()
            .map_err(|err: bip32::Error| KeyringError::Derivation(err.to_string()))?;
        let xprv = XPrv::derive_from_path(&self.seed[..], &path)
            .map_err(|err| KeyringError::Derivation(err.to_string()))?;
        Ok(xprv.private_key().clone())
    }
}

impl fmt::Debug for HdKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdKeyring")
            .field("id", &self.id)
            .field("kind", &KeyringKind::SoftwareHd)
            .field("base_path", &self.base_path)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}
