use device_apdu::DeviceSignature;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::{KeyringError, KeyringResult};
use crate::hex::encode_prefixed;

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";
/// Offset added to the recovery parity for legacy transactions and messages.
const LEGACY_V_OFFSET: u8 = 27;
/// First byte of an RLP list; anything below it is an EIP-2718 type byte.
const RLP_LIST_START: u8 = 0xc0;

pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// Recoverable secp256k1 signature in Ethereum layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    /// `r || s || v`, the layout wallets hand to JSON-RPC callers.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    pub fn to_hex(&self) -> String {
        encode_prefixed(self.to_bytes())
    }
}

impl From<DeviceSignature> for Signature {
    fn from(sig: DeviceSignature) -> Self {
        Self {
            r: sig.r,
            s: sig.s,
            v: sig.v,
        }
    }
}

/// EIP-191 `personal_sign` digest.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Whether `raw_tx` is an EIP-2718 typed envelope rather than a legacy RLP list.
pub fn is_typed_transaction(raw_tx: &[u8]) -> bool {
    raw_tx.first().is_some_and(|first| *first < RLP_LIST_START)
}

/// Signs a 32-byte digest, returning `v` as the bare recovery parity.
pub fn sign_prehash(key: &SigningKey, hash: &[u8; 32]) -> KeyringResult<Signature> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(hash)
        .map_err(|err| KeyringError::Signing(err.to_string()))?;
    Ok(Signature {
        r: signature.r().to_bytes().into(),
        s: signature.s().to_bytes().into(),
        v: recovery_id.to_byte(),
    })
}

/// Signs a personal message with `v = 27 + parity`.
pub fn sign_personal_message(key: &SigningKey, message: &[u8]) -> KeyringResult<Signature> {
    let mut signature = sign_prehash(key, &personal_message_hash(message))?;
    signature.v += LEGACY_V_OFFSET;
    Ok(signature)
}

/// Signs the keccak of a serialized transaction. Typed envelopes carry the
/// bare parity, legacy transactions `27 + parity`.
pub fn sign_transaction_bytes(key: &SigningKey, raw_tx: &[u8]) -> KeyringResult<Signature> {
    if raw_tx.is_empty() {
        return Err(KeyringError::Signing("transaction is empty".into()));
    }
    let mut signature = sign_prehash(key, &keccak256(raw_tx))?;
    if !is_typed_transaction(raw_tx) {
        signature.v += LEGACY_V_OFFSET;
    }
    Ok(signature)
}

pub fn normalize_recovery_id(v: u8) -> KeyringResult<RecoveryId> {
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - LEGACY_V_OFFSET,
        _ => {
            return Err(KeyringError::Signing(format!(
                "unsupported signature `v` value: {v}"
            )));
        }
    };
    RecoveryId::try_from(parity)
        .map_err(|err| KeyringError::Signing(format!("invalid recovery id: {err}")))
}

/// Recovers the checksummed signer address of `hash`.
pub fn recover_address(hash: &[u8; 32], signature: &Signature) -> KeyringResult<String> {
    let recovery_id = normalize_recovery_id(signature.v)?;
    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r);
    sig_bytes[32..].copy_from_slice(&signature.s);
    let ecdsa = EcdsaSignature::from_slice(&sig_bytes)
        .map_err(|err| KeyringError::Signing(format!("invalid signature bytes: {err}")))?;
    let verifying_key = VerifyingKey::recover_from_prehash(hash, &ecdsa, recovery_id)
        .map_err(|err| KeyringError::Signing(format!("failed to recover signer: {err}")))?;
    Ok(verifying_key_to_address(&verifying_key))
}

pub fn verifying_key_to_address(verifying_key: &VerifyingKey) -> String {
    let pubkey = verifying_key.to_encoded_point(false);
    // Uncompressed SEC1: 0x04 || x || y
    let hash = keccak256(&pubkey.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    to_checksum_address(&address)
}

/// Parses a `0x`-prefixed 20-byte address in any letter case.
pub fn parse_address(address: &str) -> KeyringResult<[u8; 20]> {
    let hex_part = address
        .trim()
        .strip_prefix("0x")
        .or_else(|| address.trim().strip_prefix("0X"))
        .ok_or_else(|| KeyringError::InvalidAddress(format!("{address} is missing 0x prefix")))?;
    if hex_part.len() != 40 {
        return Err(KeyringError::InvalidAddress(format!(
            "{address} must have 40 hex digits"
        )));
    }
    let mut out = [0u8; 20];
    ::hex::decode_to_slice(hex_part, &mut out)
        .map_err(|err| KeyringError::InvalidAddress(format!("{address}: {err}")))?;
    Ok(out)
}

/// Re-renders any valid address with its EIP-55 checksum.
pub fn checksum(address: &str) -> KeyringResult<String> {
    parse_address(address).map(|bytes| to_checksum_address(&bytes))
}

/// Case-insensitive address comparison.
pub fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = ::hex::encode(address);
    let mut result = String::with_capacity(42);
    result.push_str("0x");
    let hash = keccak256(lower.as_bytes());

    for (idx, ch) in lower.chars().enumerate() {
        if ch.is_ascii_digit() {
            result.push(ch);
            continue;
        }

        let hash_byte = hash[idx / 2];
        let nibble = if idx % 2 == 0 {
            (hash_byte >> 4) & 0x0f
        } else {
            hash_byte & 0x0f
        };

        if nibble >= 8 {
            result.push(ch.to_ascii_uppercase());
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cow_key() -> SigningKey {
        SigningKey::from_slice(&keccak256(b"cow")).unwrap()
    }

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            ::hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn checksum_matches_eip55_vectors() {
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert_eq!(checksum(&expected.to_lowercase()).unwrap(), expected);
        }
        assert!(checksum("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
        assert!(checksum("0x1234").is_err());
    }

    #[test]
    fn derives_address_from_key() {
        assert_eq!(
            verifying_key_to_address(cow_key().verifying_key()),
            "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"
        );
    }

    #[test]
    fn personal_signature_recovers_signer() {
        let key = cow_key();
        let signature = sign_personal_message(&key, b"hello").unwrap();
        assert!(signature.v == 27 || signature.v == 28);

        let recovered = recover_address(&personal_message_hash(b"hello"), &signature).unwrap();
        assert_eq!(recovered, "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826");
    }

    #[test]
    fn transaction_v_depends_on_envelope() {
        let key = cow_key();
        let typed = sign_transaction_bytes(&key, &[0x02, 0xc0]).unwrap();
        assert!(typed.v <= 1);
        let legacy = sign_transaction_bytes(&key, &[0xc0]).unwrap();
        assert!(legacy.v == 27 || legacy.v == 28);
        assert!(sign_transaction_bytes(&key, &[]).is_err());
    }

    #[test]
    fn signature_bytes_are_r_s_v() {
        let signature = Signature {
            r: [1; 32],
            s: [2; 32],
            v: 27,
        };
        let bytes = signature.to_bytes();
        assert_eq!(&bytes[..32], &[1; 32]);
        assert_eq!(&bytes[32..64], &[2; 32]);
        assert_eq!(bytes[64], 27);
        assert!(signature.to_hex().ends_with("1b"));
    }

    #[test]
    fn addresses_compare_case_insensitively() {
        assert!(same_address(
            "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826",
            "0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826"
        ));
        assert!(!same_address("0x01", "0x02"));
    }
}
