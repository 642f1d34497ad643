//! EIP-712 typed structured data hashing.
//!
//! Hardware devices in hashed mode only receive the domain separator and the
//! message hash, so both are computed here on the host.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::{BigInt, Sign};
use num_traits::{One, Zero};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{KeyringError, KeyringResult};
use crate::eth::{keccak256, parse_address};
use crate::hex::decode;

pub const DOMAIN_TYPE: &str = "EIP712Domain";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypeMember {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypedData {
    #[serde(default)]
    pub types: BTreeMap<String, Vec<TypeMember>>,
    #[serde(rename = "primaryType")]
    pub primary_type: String,
    pub domain: JsonValue,
    #[serde(default)]
    pub message: JsonValue,
}

fn invalid(reason: impl Into<String>) -> KeyringError {
    KeyringError::InvalidTypedData(reason.into())
}

impl TypedData {
    pub fn from_json(json: &str) -> KeyringResult<Self> {
        let parsed: TypedData =
            serde_json::from_str(json).map_err(|err| invalid(format!("invalid JSON: {err}")))?;

        if !parsed.types.contains_key(DOMAIN_TYPE) {
            return Err(invalid("types must include EIP712Domain"));
        }
        if parsed.primary_type == DOMAIN_TYPE {
            return Err(invalid("primaryType must not be EIP712Domain"));
        }
        if !parsed.types.contains_key(&parsed.primary_type) {
            return Err(invalid(format!(
                "types missing primaryType '{}'",
                parsed.primary_type
            )));
        }
        Ok(parsed)
    }

    pub fn domain_separator(&self) -> KeyringResult<[u8; 32]> {
        self.hash_struct(DOMAIN_TYPE, &self.domain)
    }

    pub fn message_hash(&self) -> KeyringResult<[u8; 32]> {
        self.hash_struct(&self.primary_type, &self.message)
    }

    /// `keccak256(0x19 0x01 || domainSeparator || hashStruct(message))`
    pub fn signing_hash(&self) -> KeyringResult<[u8; 32]> {
        let mut preimage = Vec::with_capacity(66);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&self.domain_separator()?);
        preimage.extend_from_slice(&self.message_hash()?);
        Ok(keccak256(preimage))
    }

    /// `Name(type1 field1,...)` followed by every referenced struct type,
    /// sorted by name.
    pub fn encode_type(&self, name: &str) -> KeyringResult<String> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(name, &mut deps)?;
        deps.remove(name);

        let mut out = self.encode_single_type(name)?;
        for dep in deps {
            out.push_str(&self.encode_single_type(&dep)?);
        }
        Ok(out)
    }

    pub fn type_hash(&self, name: &str) -> KeyringResult<[u8; 32]> {
        Ok(keccak256(self.encode_type(name)?))
    }

    pub fn hash_struct(&self, name: &str, value: &JsonValue) -> KeyringResult<[u8; 32]> {
        let members = self.members(name)?;
        let object = value
            .as_object()
            .ok_or_else(|| invalid(format!("value for {name} must be an object")))?;

        let mut encoded = Vec::with_capacity(32 * (members.len() + 1));
        encoded.extend_from_slice(&self.type_hash(name)?);
        for member in members {
            let field = object.get(&member.name).ok_or_else(|| {
                invalid(format!("{name} is missing field '{}'", member.name))
            })?;
            encoded.extend_from_slice(&self.encode_value(&member.type_name, field)?);
        }
        Ok(keccak256(encoded))
    }

    fn members(&self, name: &str) -> KeyringResult<&[TypeMember]> {
        self.types
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| invalid(format!("unknown struct type '{name}'")))
    }

    fn encode_single_type(&self, name: &str) -> KeyringResult<String> {
        let fields = self
            .members(name)?
            .iter()
            .map(|member| format!("{} {}", member.type_name, member.name))
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{name}({fields})"))
    }

    fn collect_dependencies(&self, name: &str, found: &mut BTreeSet<String>) -> KeyringResult<()> {
        if found.contains(name) {
            return Ok(());
        }
        found.insert(name.to_string());
        for member in self.members(name)? {
            let base = base_type(&member.type_name);
            if self.types.contains_key(base) {
                self.collect_dependencies(base, found)?;
            }
        }
        Ok(())
    }

    fn encode_value(&self, type_name: &str, value: &JsonValue) -> KeyringResult<[u8; 32]> {
        if let Some((inner, length)) = split_array(type_name)? {
            let items = value
                .as_array()
                .ok_or_else(|| invalid(format!("value for {type_name} must be an array")))?;
            if let Some(length) = length
                && items.len() != length
            {
                return Err(invalid(format!(
                    "{type_name} expects {length} items, got {}",
                    items.len()
                )));
            }
            let mut encoded = Vec::with_capacity(32 * items.len());
            for item in items {
                encoded.extend_from_slice(&self.encode_value(inner, item)?);
            }
            return Ok(keccak256(encoded));
        }

        if self.types.contains_key(type_name) {
            return self.hash_struct(type_name, value);
        }

        encode_atomic(type_name, value)
    }
}

/// Strips every array suffix: `Person[2][]` -> `Person`.
fn base_type(type_name: &str) -> &str {
    type_name.split('[').next().unwrap_or(type_name)
}

/// Splits the outermost array suffix: `uint8[3][]` -> (`uint8[3]`, None).
fn split_array(type_name: &str) -> KeyringResult<Option<(&str, Option<usize>)>> {
    let Some(stripped) = type_name.strip_suffix(']') else {
        return Ok(None);
    };
    let open = stripped
        .rfind('[')
        .ok_or_else(|| invalid(format!("malformed array type '{type_name}'")))?;
    let (inner, length) = (&stripped[..open], &stripped[open + 1..]);
    if length.is_empty() {
        return Ok(Some((inner, None)));
    }
    let length = length
        .parse::<usize>()
        .map_err(|_| invalid(format!("malformed array length in '{type_name}'")))?;
    Ok(Some((inner, Some(length))))
}

fn encode_atomic(type_name: &str, value: &JsonValue) -> KeyringResult<[u8; 32]> {
    match type_name {
        "string" => {
            let text = value
                .as_str()
                .ok_or_else(|| invalid("string value must be a JSON string"))?;
            Ok(keccak256(text.as_bytes()))
        }
        "bytes" => Ok(keccak256(decode(json_str(value, type_name)?)?)),
        "bool" => {
            let flag = match value {
                JsonValue::Bool(flag) => *flag,
                JsonValue::String(text) if text == "true" => true,
                JsonValue::String(text) if text == "false" => false,
                _ => return Err(invalid("bool value must be true or false")),
            };
            let mut word = [0u8; 32];
            word[31] = u8::from(flag);
            Ok(word)
        }
        "address" => {
            let address = parse_address(json_str(value, type_name)?)?;
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(&address);
            Ok(word)
        }
        _ => {
            if let Some(size) = type_name.strip_prefix("bytes") {
                return encode_fixed_bytes(type_name, size, value);
            }
            if let Some(bits) = type_name.strip_prefix("uint") {
                return encode_integer(type_name, bits, false, value);
            }
            if let Some(bits) = type_name.strip_prefix("int") {
                return encode_integer(type_name, bits, true, value);
            }
            Err(invalid(format!("unsupported type '{type_name}'")))
        }
    }
}

fn json_str<'a>(value: &'a JsonValue, type_name: &str) -> KeyringResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("{type_name} value must be a hex string")))
}

fn encode_fixed_bytes(type_name: &str, size: &str, value: &JsonValue) -> KeyringResult<[u8; 32]> {
    let size = size
        .parse::<usize>()
        .ok()
        .filter(|size| (1..=32).contains(size))
        .ok_or_else(|| invalid(format!("unsupported type '{type_name}'")))?;
    let bytes = decode(json_str(value, type_name)?)?;
    if bytes.len() > size {
        return Err(invalid(format!(
            "{type_name} value has {} bytes",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(&bytes);
    Ok(word)
}

fn encode_integer(
    type_name: &str,
    bits: &str,
    signed: bool,
    value: &JsonValue,
) -> KeyringResult<[u8; 32]> {
    let bits = if bits.is_empty() {
        256
    } else {
        bits.parse::<usize>()
            .ok()
            .filter(|bits| *bits > 0 && *bits <= 256 && bits % 8 == 0)
            .ok_or_else(|| invalid(format!("unsupported type '{type_name}'")))?
    };

    let number = parse_integer(value)?;
    let (min, max) = if signed {
        let half = BigInt::one() << (bits - 1);
        (-half.clone(), half - 1)
    } else {
        (BigInt::zero(), (BigInt::one() << bits) - 1)
    };
    if number < min || number > max {
        return Err(invalid(format!("{number} does not fit in {type_name}")));
    }

    let twos_complement = if number.sign() == Sign::Minus {
        number + (BigInt::one() << 256)
    } else {
        number
    };
    let (_, bytes) = twos_complement.to_bytes_be();
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

/// Accepts JSON integers and decimal or `0x` hex strings, optionally negative.
fn parse_integer(value: &JsonValue) -> KeyringResult<BigInt> {
    match value {
        JsonValue::Number(number) => number
            .as_i64()
            .map(BigInt::from)
            .or_else(|| number.as_u64().map(BigInt::from))
            .ok_or_else(|| invalid(format!("{number} is not an integer"))),
        JsonValue::String(text) => {
            let text = text.trim();
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            let parsed = match digits.strip_prefix("0x") {
                Some(hex_digits) => BigInt::parse_bytes(hex_digits.as_bytes(), 16),
                None => BigInt::parse_bytes(digits.as_bytes(), 10),
            }
            .ok_or_else(|| invalid(format!("'{text}' is not an integer")))?;
            Ok(if negative { -parsed } else { parsed })
        }
        other => Err(invalid(format!("{other} is not an integer"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::{Signature, recover_address};
    use crate::testing::MAIL_TYPED_DATA as MAIL;

    fn hex32(value: &str) -> [u8; 32] {
        crate::hex::decode_fixed(value).unwrap()
    }

    #[test]
    fn encodes_type_with_sorted_dependencies() {
        let data = TypedData::from_json(MAIL).unwrap();
        assert_eq!(
            data.encode_type("Mail").unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
        assert_eq!(
            data.type_hash("Mail").unwrap(),
            hex32("0xa0cedeb2dc280ba39b857546d74f5549c3a1d7bdc2dd96bf881f76108e23dac2")
        );
    }

    #[test]
    fn hashes_mail_example() {
        let data = TypedData::from_json(MAIL).unwrap();
        assert_eq!(
            data.domain_separator().unwrap(),
            hex32("0xf2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f")
        );
        assert_eq!(
            data.message_hash().unwrap(),
            hex32("0xc52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e")
        );
        assert_eq!(
            data.signing_hash().unwrap(),
            hex32("0xbe609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2")
        );
    }

    #[test]
    fn mail_signature_recovers_cow() {
        let data = TypedData::from_json(MAIL).unwrap();
        let signature = Signature {
            r: hex32("0x4355c47d63924e8a72e509b65029052eb6c299d53a04e167c5775fd466751c9d"),
            s: hex32("0x07299936d304c153f6443dfa05f40ff007d72911b6f72307f996231605b91562"),
            v: 28,
        };
        assert_eq!(
            recover_address(&data.signing_hash().unwrap(), &signature).unwrap(),
            "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"
        );
    }

    #[test]
    fn rejects_missing_domain_and_primary_type() {
        let err = TypedData::from_json(r#"{"types":{},"primaryType":"Mail","domain":{}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("EIP712Domain"));

        let err = TypedData::from_json(
            r#"{"types":{"EIP712Domain":[]},"primaryType":"Mail","domain":{}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("primaryType 'Mail'"));
    }

    #[test]
    fn integers_respect_width_and_sign() {
        assert_eq!(
            encode_atomic("int256", &JsonValue::from(-1)).unwrap(),
            [0xff; 32]
        );
        assert_eq!(
            encode_atomic("uint16", &JsonValue::from("0x0102")).unwrap()[30..],
            [0x01, 0x02]
        );
        assert!(encode_atomic("int8", &JsonValue::from(-128)).is_ok());
        assert!(encode_atomic("int8", &JsonValue::from(-129)).is_err());
        assert!(encode_atomic("uint8", &JsonValue::from(256)).is_err());
        assert!(encode_atomic("uint8", &JsonValue::from(-1)).is_err());
        assert!(encode_atomic("uint7", &JsonValue::from(1)).is_err());
    }

    #[test]
    fn fixed_bytes_are_right_padded() {
        let word = encode_atomic("bytes4", &JsonValue::from("0xdeadbeef")).unwrap();
        assert_eq!(&word[..4], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&word[4..], &[0; 28]);
        assert!(encode_atomic("bytes2", &JsonValue::from("0xdeadbeef")).is_err());
    }

    #[test]
    fn arrays_check_fixed_length() {
        let json = r#"{
            "types": {
                "EIP712Domain": [{ "name": "name", "type": "string" }],
                "Batch": [
                    { "name": "amounts", "type": "uint256[]" },
                    { "name": "pair", "type": "address[2]" }
                ]
            },
            "primaryType": "Batch",
            "domain": { "name": "Batcher" },
            "message": {
                "amounts": [1, "2", "0x03"],
                "pair": [
                    "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826",
                    "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"
                ]
            }
        }"#;
        let data = TypedData::from_json(json).unwrap();
        assert!(data.signing_hash().is_ok());
        assert_eq!(
            data.encode_type("Batch").unwrap(),
            "Batch(uint256[] amounts,address[2] pair)"
        );

        let mut short = data.clone();
        short.message["pair"] = serde_json::json!(["0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"]);
        assert!(short.message_hash().is_err());
    }
}
