use crate::error::{ProtocolError, ProtocolResult};
use crate::status::decode_status_word;

const SIGNATURE_LEN: usize = 65;
const CHAIN_CODE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub public_key: Vec<u8>,
    /// `0x`-prefixed hex address as reported by the device.
    pub address: String,
    pub chain_code: Option<[u8; CHAIN_CODE_LEN]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSignature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfiguration {
    pub flags: u8,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl AppConfiguration {
    pub fn version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Checks the trailing status word and returns the response body without it.
pub fn split_status(response: &[u8]) -> ProtocolResult<&[u8]> {
    let status = decode_status_word(response)?;
    status.into_result()?;
    Ok(&response[..response.len() - 2])
}

/// Decodes `pubKeyLen(1) | pubKey | addrLen(1) | addr | chainCode?`.
pub fn decode_address(body: &[u8]) -> ProtocolResult<DeviceAddress> {
    let mut reader = Reader::new(body);
    let public_key = reader.length_prefixed("public key")?.to_vec();
    let raw_address = reader.length_prefixed("address")?;
    let address = render_address(raw_address)?;

    let rest = reader.remaining();
    let chain_code = if rest.len() >= CHAIN_CODE_LEN {
        let mut code = [0u8; CHAIN_CODE_LEN];
        code.copy_from_slice(&rest[..CHAIN_CODE_LEN]);
        Some(code)
    } else {
        None
    };

    Ok(DeviceAddress {
        public_key,
        address,
        chain_code,
    })
}

/// Decodes `v(1) | r(32) | s(32)`.
pub fn decode_signature(body: &[u8]) -> ProtocolResult<DeviceSignature> {
    if body.len() < SIGNATURE_LEN {
        return Err(ProtocolError::InvalidResponse(format!(
            "signature response has {} bytes, expected at least {SIGNATURE_LEN}",
            body.len()
        )));
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&body[1..33]);
    s.copy_from_slice(&body[33..65]);
    Ok(DeviceSignature { v: body[0], r, s })
}

/// Decodes `flags(1) | major(1) | minor(1) | patch(1)`.
pub fn decode_app_configuration(body: &[u8]) -> ProtocolResult<AppConfiguration> {
    match body {
        [flags, major, minor, patch, ..] => Ok(AppConfiguration {
            flags: *flags,
            major: *major,
            minor: *minor,
            patch: *patch,
        }),
        _ => Err(ProtocolError::InvalidResponse(format!(
            "app configuration has {} bytes, expected 4",
            body.len()
        ))),
    }
}

fn render_address(raw: &[u8]) -> ProtocolResult<String> {
    match raw.len() {
        20 => Ok(format!("0x{}", hex::encode(raw))),
        40 => {
            let ascii = std::str::from_utf8(raw)
                .map_err(|_| ProtocolError::invalid_response("address is not ASCII"))?;
            if !ascii.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ProtocolError::invalid_response("address is not hex"));
            }
            Ok(format!("0x{ascii}"))
        }
        other => Err(ProtocolError::InvalidResponse(format!(
            "unexpected address length {other}"
        ))),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn length_prefixed(&mut self, field: &str) -> ProtocolResult<&'a [u8]> {
        let (len, rest) = self.bytes.split_first().ok_or_else(|| {
            ProtocolError::InvalidResponse(format!("missing {field} length"))
        })?;
        let len = *len as usize;
        if rest.len() < len {
            return Err(ProtocolError::InvalidResponse(format!(
                "{field} length {len} exceeds remaining {} bytes",
                rest.len()
            )));
        }
        let (value, rest) = rest.split_at(len);
        self.bytes = rest;
        Ok(value)
    }

    fn remaining(&self) -> &'a [u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusWord;

    fn address_body(address: &[u8], chain_code: Option<[u8; 32]>) -> Vec<u8> {
        let mut body = vec![65];
        body.extend_from_slice(&[0x04; 65]);
        body.push(address.len() as u8);
        body.extend_from_slice(address);
        if let Some(code) = chain_code {
            body.extend_from_slice(&code);
        }
        body
    }

    #[test]
    fn decodes_ascii_address_with_chain_code() {
        let ascii = b"5637c997d8aff61a4ec7d606f461c1c75f2b8120";
        let decoded = decode_address(&address_body(ascii, Some([7; 32]))).unwrap();
        assert_eq!(decoded.address, "0x5637c997d8aff61a4ec7d606f461c1c75f2b8120");
        assert_eq!(decoded.public_key.len(), 65);
        assert_eq!(decoded.chain_code, Some([7; 32]));
    }

    #[test]
    fn decodes_raw_address_bytes() {
        let decoded = decode_address(&address_body(&[0xab; 20], None)).unwrap();
        assert_eq!(decoded.address, format!("0x{}", "ab".repeat(20)));
        assert_eq!(decoded.chain_code, None);
    }

    #[test]
    fn rejects_lengths_past_buffer() {
        let mut body = address_body(b"5637c997d8aff61a4ec7d606f461c1c75f2b8120", None);
        body.truncate(70);
        assert!(matches!(
            decode_address(&body),
            Err(ProtocolError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_address(&[200, 1, 2]),
            Err(ProtocolError::InvalidResponse(_))
        ));
    }

    #[test]
    fn decodes_signature_layout() {
        let mut body = vec![27];
        body.extend_from_slice(&[1; 32]);
        body.extend_from_slice(&[2; 32]);
        let sig = decode_signature(&body).unwrap();
        assert_eq!(sig.v, 27);
        assert_eq!(sig.r, [1; 32]);
        assert_eq!(sig.s, [2; 32]);

        assert!(decode_signature(&body[..64]).is_err());
    }

    #[test]
    fn split_status_surfaces_device_error() {
        assert_eq!(split_status(&[1, 2, 0x90, 0x00]).unwrap(), &[1, 2]);
        assert_eq!(
            split_status(&[0x69, 0x85]),
            Err(ProtocolError::Apdu(StatusWord(0x6985)))
        );
    }

    #[test]
    fn decodes_app_configuration() {
        let config = decode_app_configuration(&[0x01, 1, 10, 4]).unwrap();
        assert_eq!(config.version(), "1.10.4");
        assert!(decode_app_configuration(&[1, 2]).is_err());
    }
}
