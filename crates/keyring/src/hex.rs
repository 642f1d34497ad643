use crate::{KeyringError, KeyringResult};

/// Decodes `0x`-prefixed or bare hex; odd lengths get a leading zero nibble.
pub fn decode(value: &str) -> KeyringResult<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    if stripped.is_empty() {
        return Ok(Vec::new());
    }

    let padded = if !stripped.len().is_multiple_of(2) {
        format!("0{stripped}")
    } else {
        stripped.to_owned()
    };

    ::hex::decode(&padded).map_err(|err| KeyringError::InvalidHex {
        value: stripped.to_owned(),
        reason: err.to_string(),
    })
}

/// Decodes exactly `N` bytes.
pub fn decode_fixed<const N: usize>(value: &str) -> KeyringResult<[u8; N]> {
    let bytes = decode(value)?;
    bytes.as_slice().try_into().map_err(|_| KeyringError::InvalidHex {
        value: value.to_owned(),
        reason: format!("expected {N} bytes, got {}", bytes.len()),
    })
}

pub fn encode_prefixed(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", ::hex::encode(bytes))
}
