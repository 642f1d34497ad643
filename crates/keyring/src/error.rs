use ble_transport::TransportError;
use device_apdu::{ProtocolError, StatusCategory, StatusWord};
use thiserror::Error;

use crate::keyring::{KeyringId, KeyringKind};

/// High-level category for a [`KeyringError`].
///
/// Lets callers tell "reconnect your device" apart from "user rejected" and
/// "no signer for this address" without matching every variant.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KeyringErrorKind {
    /// The BLE link is missing, dropped or misbehaving.
    Transport,
    /// The device answered with an error or an unparsable response.
    Device,
    /// The user declined the request on the device.
    UserRejected,
    /// The request itself was invalid.
    Validation,
    /// The device did not answer in time.
    Timeout,
    /// No held keyring can sign for the address.
    NoSigner,
    /// Reading or writing persisted keyrings failed.
    Storage,
}

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("device protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("account {0} not found in keyring")]
    AccountNotFound(String),
    #[error("no keyring holds address {0}")]
    AddressNotFound(String),
    #[error("keyring {0} not found")]
    KeyringNotFound(KeyringId),
    #[error("keyring {0} is already registered")]
    KeyringExists(KeyringId),
    #[error("{kind} keyring does not support {operation}")]
    UnsupportedOperation {
        kind: KeyringKind,
        operation: &'static str,
    },
    #[error("address {0} is already held by this keyring")]
    DuplicateAddress(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid hex '{value}': {reason}")]
    InvalidHex { value: String, reason: String },
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid typed data: {0}")]
    InvalidTypedData(String),
    #[error("threshold {threshold} is invalid for {owners} owners")]
    InvalidThreshold { threshold: usize, owners: usize },
    #[error("invalid storage key '{0}'")]
    InvalidStorageKey(String),
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("stored schema version {found} does not match supported version {supported}")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },
}

pub type KeyringResult<T> = std::result::Result<T, KeyringError>;

impl KeyringError {
    pub(crate) fn unsupported(kind: KeyringKind, operation: &'static str) -> Self {
        Self::UnsupportedOperation { kind, operation }
    }

    pub fn kind(&self) -> KeyringErrorKind {
        match self {
            Self::Transport(error) => classify_transport_error(error),
            Self::Protocol(error) => classify_protocol_error(error),
            Self::AccountNotFound(_)
            | Self::AddressNotFound(_)
            | Self::KeyringNotFound(_)
            | Self::UnsupportedOperation { .. } => KeyringErrorKind::NoSigner,
            Self::KeyringExists(_)
            | Self::DuplicateAddress(_)
            | Self::InvalidAddress(_)
            | Self::InvalidHex { .. }
            | Self::InvalidMnemonic(_)
            | Self::Derivation(_)
            | Self::Signing(_)
            | Self::InvalidTypedData(_)
            | Self::InvalidThreshold { .. } => KeyringErrorKind::Validation,
            Self::InvalidStorageKey(_)
            | Self::Io(_)
            | Self::Serde(_)
            | Self::UnsupportedSchemaVersion { .. } => KeyringErrorKind::Storage,
        }
    }

    /// Short uppercase code, suitable for JSON responses and structured logs.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            KeyringErrorKind::Transport => "TRANSPORT",
            KeyringErrorKind::Device => "DEVICE",
            KeyringErrorKind::UserRejected => "USER_REJECTED",
            KeyringErrorKind::Validation => "VALIDATION",
            KeyringErrorKind::Timeout => "TIMEOUT",
            KeyringErrorKind::NoSigner => "NO_SIGNER",
            KeyringErrorKind::Storage => "STORAGE",
        }
    }
}

fn classify_status(status: StatusWord) -> KeyringErrorKind {
    match status.category() {
        StatusCategory::UserRejected => KeyringErrorKind::UserRejected,
        _ => KeyringErrorKind::Device,
    }
}

fn classify_transport_error(error: &TransportError) -> KeyringErrorKind {
    match error {
        TransportError::Timeout => KeyringErrorKind::Timeout,
        TransportError::Apdu(code) => classify_status(StatusWord(*code)),
        TransportError::Frame(_) => KeyringErrorKind::Device,
        _ => KeyringErrorKind::Transport,
    }
}

fn classify_protocol_error(error: &ProtocolError) -> KeyringErrorKind {
    match error {
        ProtocolError::Apdu(status) => classify_status(*status),
        ProtocolError::InvalidResponse(_) => KeyringErrorKind::Device,
        ProtocolError::InvalidPath(_) | ProtocolError::DataTooLong(_) => {
            KeyringErrorKind::Validation
        }
    }
}
