use ble_transport::{TransportError, TransportHandle};
use device_apdu::{
    AppConfiguration, decode_address, decode_app_configuration, decode_signature,
    encode_get_address, encode_get_app_configuration, encode_sign_message,
    encode_sign_transaction, encode_sign_typed_data, split_status,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{self, Account};
use crate::eip712::TypedData;
use crate::error::{KeyringError, KeyringResult};
use crate::eth::{Signature, checksum};
use crate::keyring::KeyringId;

/// Keyring whose keys live on a BLE signing device.
///
/// Every derive and sign call is forwarded over the transport; the keyring
/// itself only remembers which BIP44 index each address came from.
#[derive(Debug)]
pub struct HardwareKeyring {
    id: KeyringId,
    transport: Option<TransportHandle>,
    base_path: String,
    device_id: Option<String>,
    accounts: Vec<Account>,
}

#[derive(Serialize, Deserialize)]
struct HardwareSnapshot {
    base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(default)]
    accounts: Vec<Account>,
}

impl HardwareKeyring {
    pub fn new(transport: TransportHandle, base_path: impl Into<String>) -> KeyringResult<Self> {
        let base_path = base_path.into();
        device_apdu::parse_path(&base_path)?;
        Ok(Self::with_id(KeyringId::new(), Some(transport), base_path))
    }

    pub(crate) fn with_id(
        id: KeyringId,
        transport: Option<TransportHandle>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            id,
            transport,
            base_path: base_path.into(),
            device_id: None,
            accounts: Vec::new(),
        }
    }

    pub fn id(&self) -> KeyringId {
        self.id
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Id of the device the accounts were last derived from.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn attach_transport(&mut self, transport: TransportHandle) {
        self.transport = Some(transport);
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        self.accounts.clone()
    }

    /// Asks the device for the next `count` addresses after the highest known
    /// index. Addresses already held are skipped.
    pub async fn derive_accounts(&mut self, count: usize) -> KeyringResult<Vec<Account>> {
        let start = account::next_index(&self.accounts)?;
        let overflow = || KeyringError::Derivation("account index overflow".into());
        let count = u32::try_from(count).map_err(|_| overflow())?;
        // Accounts are only recorded once every address has been read.
        let mut derived: Vec<Account> = Vec::new();
        for offset in 0..count {
            let index = start.checked_add(offset).ok_or_else(overflow)?;
            let account = self.fetch_address(index, false).await?;
            if account::find(&self.accounts, &account.address).is_some()
                || account::find(&derived, &account.address).is_some()
            {
                warn!(index, address = %account.address, "device returned an address already held");
                continue;
            }
            derived.push(account);
        }
        self.accounts.extend(derived.iter().cloned());
        self.remember_device().await;
        info!(
            keyring = %self.id,
            added = derived.len(),
            total = self.accounts.len(),
            "hardware keyring accounts derived"
        );
        Ok(derived)
    }

    /// Fetches the address at `<base_path>/<index>` and records it.
    pub async fn add_account(&mut self, index: u32, display: bool) -> KeyringResult<Account> {
        if !display
            && let Some(existing) = self
                .accounts
                .iter()
                .find(|account| account.index == Some(index))
        {
            return Ok(existing.clone());
        }
        let account = self.fetch_address(index, display).await?;
        if account::find(&self.accounts, &account.address).is_none() {
            self.accounts.push(account.clone());
            self.remember_device().await;
        }
        Ok(account)
    }

    /// Reads one address from the device without recording it. With
    /// `display` set the device shows it for the user to confirm.
    pub async fn fetch_address(&self, index: u32, display: bool) -> KeyringResult<Account> {
        let path = format!("{}/{index}", self.base_path);
        let body = self.exchange(vec![encode_get_address(&path, display)?]).await?;
        let device_address = decode_address(&body)?;
        let address = checksum(&device_address.address)?;
        debug!(index, address = %address, "device address fetched");
        Ok(Account::derived(address, index))
    }

    pub async fn app_configuration(&self) -> KeyringResult<AppConfiguration> {
        let body = self.exchange(vec![encode_get_app_configuration()]).await?;
        let configuration = decode_app_configuration(&body)?;
        debug!(version = %configuration.version(), "applet configuration read");
        Ok(configuration)
    }

    pub async fn sign_transaction(&self, address: &str, raw_tx: &[u8]) -> KeyringResult<Signature> {
        self.connected_transport()?;
        if raw_tx.is_empty() {
            return Err(KeyringError::Signing("transaction is empty".into()));
        }
        let path = self.path_for(address)?;
        let apdus = encode_sign_transaction(&path, raw_tx)?;
        info!(commands = apdus.len(), "requesting transaction signature from device");
        self.signature(apdus).await
    }

    pub async fn sign_message(&self, address: &str, message: &[u8]) -> KeyringResult<Signature> {
        self.connected_transport()?;
        let path = self.path_for(address)?;
        let apdus = encode_sign_message(&path, message)?;
        info!(commands = apdus.len(), "requesting message signature from device");
        self.signature(apdus).await
    }

    /// The digest is computed here and only its two halves are sent.
    pub async fn sign_typed_data(&self, address: &str, json: &str) -> KeyringResult<Signature> {
        self.connected_transport()?;
        let path = self.path_for(address)?;
        let typed = TypedData::from_json(json)?;
        let apdu = encode_sign_typed_data(
            &path,
            &typed.domain_separator()?,
            &typed.message_hash()?,
        )?;
        info!(primary_type = %typed.primary_type, "requesting typed data signature from device");
        self.signature(vec![apdu]).await
    }

    pub fn remove_account(&mut self, address: &str) -> KeyringResult<Account> {
        let position = self
            .accounts
            .iter()
            .position(|account| account.matches(address))
            .ok_or_else(|| KeyringError::AccountNotFound(address.to_string()))?;
        Ok(self.accounts.remove(position))
    }

    pub fn serialize(&self) -> KeyringResult<Vec<u8>> {
        Ok(serde_json::to_vec(&HardwareSnapshot {
            base_path: self.base_path.clone(),
            device_id: self.device_id.clone(),
            accounts: self.accounts.clone(),
        })?)
    }

    pub fn deserialize(
        id: KeyringId,
        bytes: &[u8],
        transport: Option<TransportHandle>,
    ) -> KeyringResult<Self> {
        let snapshot: HardwareSnapshot = serde_json::from_slice(bytes)?;
        device_apdu::parse_path(&snapshot.base_path)?;
        account::validate(&snapshot.accounts)?;
        Ok(Self {
            id,
            transport,
            base_path: snapshot.base_path,
            device_id: snapshot.device_id,
            accounts: snapshot.accounts,
        })
    }

    fn connected_transport(&self) -> KeyringResult<&TransportHandle> {
        match &self.transport {
            Some(transport) if transport.state().is_connected() => Ok(transport),
            _ => Err(TransportError::NotConnected.into()),
        }
    }

    fn path_for(&self, address: &str) -> KeyringResult<String> {
        account::find(&self.accounts, address)
            .and_then(|account| account.index)
            .map(|index| format!("{}/{index}", self.base_path))
            .ok_or_else(|| KeyringError::AccountNotFound(address.to_string()))
    }

    async fn exchange(&self, apdus: Vec<Vec<u8>>) -> KeyringResult<Vec<u8>> {
        let transport = self.connected_transport()?;
        let response = transport.send_command_sequence(apdus).await?;
        Ok(split_status(&response)?.to_vec())
    }

    async fn signature(&self, apdus: Vec<Vec<u8>>) -> KeyringResult<Signature> {
        let body = self.exchange(apdus).await?;
        Ok(decode_signature(&body)?.into())
    }

    async fn remember_device(&mut self) {
        let Some(transport) = &self.transport else {
            return;
        };
        if let Ok(Some(link)) = transport.link_info().await {
            self.device_id = Some(link.device.id);
        }
    }
}
