use crate::error::{ProtocolError, ProtocolResult};
use crate::path::encode_path;

/// Instruction class of the Ethereum applet.
pub const CLA: u8 = 0xe0;

pub const INS_GET_ADDRESS: u8 = 0x02;
pub const INS_SIGN_TRANSACTION: u8 = 0x04;
pub const INS_GET_APP_CONFIGURATION: u8 = 0x06;
pub const INS_SIGN_PERSONAL_MESSAGE: u8 = 0x08;
pub const INS_SIGN_EIP712_HASHED: u8 = 0x0c;

/// `Lc` is a single byte, so one command carries at most this much data.
pub const MAX_APDU_DATA: usize = 255;

const P1_FIRST_CHUNK: u8 = 0x00;
const P1_MORE_CHUNK: u8 = 0x80;
const P1_SILENT: u8 = 0x00;
const P1_DISPLAY: u8 = 0x01;
const P2_NO_CHAIN_CODE: u8 = 0x00;

/// A command APDU: `CLA INS P1 P2 Lc Data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl Apdu {
    pub fn new(ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> ProtocolResult<Self> {
        if data.len() > MAX_APDU_DATA {
            return Err(ProtocolError::DataTooLong(data.len()));
        }
        Ok(Self {
            cla: CLA,
            ins,
            p1,
            p2,
            data,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        out
    }

    /// Parses raw command bytes; used by device emulators and diagnostics.
    pub fn from_bytes(bytes: &[u8]) -> ProtocolResult<Self> {
        let (header, rest) = match bytes {
            [cla, ins, p1, p2, rest @ ..] => ([*cla, *ins, *p1, *p2], rest),
            _ => {
                return Err(ProtocolError::invalid_response(
                    "command shorter than 4-byte header",
                ));
            }
        };
        let data = match rest {
            [] => Vec::new(),
            [lc, data @ ..] if data.len() == *lc as usize => data.to_vec(),
            _ => {
                return Err(ProtocolError::invalid_response(
                    "command length byte does not match data",
                ));
            }
        };
        Ok(Self {
            cla: header[0],
            ins: header[1],
            p1: header[2],
            p2: header[3],
            data,
        })
    }
}

pub fn encode_get_address(path: &str, display: bool) -> ProtocolResult<Vec<u8>> {
    let p1 = if display { P1_DISPLAY } else { P1_SILENT };
    let apdu = Apdu::new(INS_GET_ADDRESS, p1, P2_NO_CHAIN_CODE, encode_path(path)?)?;
    Ok(apdu.to_bytes())
}

/// Builds the ordered command sequence that streams `raw_tx` to the device.
///
/// The first command starts with the encoded path; every command carries at
/// most [`MAX_APDU_DATA`] bytes.
pub fn encode_sign_transaction(path: &str, raw_tx: &[u8]) -> ProtocolResult<Vec<Vec<u8>>> {
    let mut payload = encode_path(path)?;
    payload.extend_from_slice(raw_tx);
    chunked(INS_SIGN_TRANSACTION, &payload)
}

/// Builds the ordered command sequence for an EIP-191 personal message.
///
/// The first command carries `path | len(u32 BE)` ahead of the message bytes.
pub fn encode_sign_message(path: &str, message: &[u8]) -> ProtocolResult<Vec<Vec<u8>>> {
    let len = u32::try_from(message.len()).map_err(|_| ProtocolError::DataTooLong(message.len()))?;
    let mut payload = encode_path(path)?;
    payload.extend_from_slice(&len.to_be_bytes());
    payload.extend_from_slice(message);
    chunked(INS_SIGN_PERSONAL_MESSAGE, &payload)
}

/// Builds the single command signing an EIP-712 digest from its two halves.
pub fn encode_sign_typed_data(
    path: &str,
    domain_separator: &[u8; 32],
    message_hash: &[u8; 32],
) -> ProtocolResult<Vec<u8>> {
    let mut data = encode_path(path)?;
    data.extend_from_slice(domain_separator);
    data.extend_from_slice(message_hash);
    let apdu = Apdu::new(INS_SIGN_EIP712_HASHED, P1_SILENT, 0x00, data)?;
    Ok(apdu.to_bytes())
}

pub fn encode_get_app_configuration() -> Vec<u8> {
    Apdu {
        cla: CLA,
        ins: INS_GET_APP_CONFIGURATION,
        p1: 0x00,
        p2: 0x00,
        data: Vec::new(),
    }
    .to_bytes()
}

fn chunked(ins: u8, payload: &[u8]) -> ProtocolResult<Vec<Vec<u8>>> {
    payload
        .chunks(MAX_APDU_DATA)
        .enumerate()
        .map(|(index, chunk)| {
            let p1 = if index == 0 {
                P1_FIRST_CHUNK
            } else {
                P1_MORE_CHUNK
            };
            Apdu::new(ins, p1, 0x00, chunk.to_vec()).map(|apdu| apdu.to_bytes())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "m/44'/60'/0'/0/0";

    #[test]
    fn get_address_header_and_path() {
        let bytes = encode_get_address(PATH, true).unwrap();
        assert_eq!(&bytes[..5], &[0xe0, 0x02, 0x01, 0x00, 21]);
        assert_eq!(bytes[5], 5);
        assert_eq!(bytes.len(), 5 + 21);

        let silent = encode_get_address(PATH, false).unwrap();
        assert_eq!(silent[2], 0x00);
    }

    #[test]
    fn short_transaction_fits_one_command() {
        let commands = encode_sign_transaction(PATH, &[0xde, 0xad]).unwrap();
        assert_eq!(commands.len(), 1);
        let apdu = Apdu::from_bytes(&commands[0]).unwrap();
        assert_eq!(apdu.ins, INS_SIGN_TRANSACTION);
        assert_eq!(apdu.p1, 0x00);
        assert_eq!(&apdu.data[21..], &[0xde, 0xad]);
    }

    #[test]
    fn long_message_is_chunked_with_continuation_flag() {
        let message = vec![0x42; 600];
        let commands = encode_sign_message(PATH, &message).unwrap();
        // 21 path bytes + 4 length bytes + 600 message bytes = 625
        assert_eq!(commands.len(), 3);

        let first = Apdu::from_bytes(&commands[0]).unwrap();
        assert_eq!(first.p1, 0x00);
        assert_eq!(first.data.len(), MAX_APDU_DATA);
        assert_eq!(&first.data[21..25], &600u32.to_be_bytes());

        let last = Apdu::from_bytes(&commands[2]).unwrap();
        assert_eq!(last.p1, 0x80);
        assert_eq!(last.data.len(), 625 - 2 * MAX_APDU_DATA);
    }

    #[test]
    fn typed_data_carries_both_hashes() {
        let bytes = encode_sign_typed_data(PATH, &[1; 32], &[2; 32]).unwrap();
        let apdu = Apdu::from_bytes(&bytes).unwrap();
        assert_eq!(apdu.ins, INS_SIGN_EIP712_HASHED);
        assert_eq!(apdu.data.len(), 21 + 64);
        assert_eq!(&apdu.data[21..53], &[1; 32]);
        assert_eq!(&apdu.data[53..], &[2; 32]);
    }

    #[test]
    fn from_bytes_rejects_bad_length() {
        assert!(Apdu::from_bytes(&[0xe0, 0x02]).is_err());
        assert!(Apdu::from_bytes(&[0xe0, 0x02, 0, 0, 3, 1]).is_err());
        assert_eq!(
            Apdu::from_bytes(&encode_get_app_configuration()).unwrap().data,
            Vec::<u8>::new()
        );
    }
}
