//! Shared fixtures: the well-known development mnemonic and an in-process
//! emulator of the signing applet for use with `MockRadio`.

use ble_transport::mock::MockRadio;
use ble_transport::{BleProfile, TransportConfig, TransportHandle};
use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use device_apdu::{
    Apdu, INS_GET_ADDRESS, INS_GET_APP_CONFIGURATION, INS_SIGN_EIP712_HASHED,
    INS_SIGN_PERSONAL_MESSAGE, INS_SIGN_TRANSACTION, MAX_APDU_DATA,
};
use k256::ecdsa::SigningKey;

use crate::eth::{
    Signature, sign_personal_message, sign_prehash, sign_transaction_bytes,
    verifying_key_to_address,
};

pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
pub const DEVICE_ID: &str = "AA:BB:CC:DD:EE:FF";

/// The EIP-712 reference "Mail" document.
pub const MAIL_TYPED_DATA: &str = r#"{
    "types": {
        "EIP712Domain": [
            { "name": "name", "type": "string" },
            { "name": "version", "type": "string" },
            { "name": "chainId", "type": "uint256" },
            { "name": "verifyingContract", "type": "address" }
        ],
        "Person": [
            { "name": "name", "type": "string" },
            { "name": "wallet", "type": "address" }
        ],
        "Mail": [
            { "name": "from", "type": "Person" },
            { "name": "to", "type": "Person" },
            { "name": "contents", "type": "string" }
        ]
    },
    "primaryType": "Mail",
    "domain": {
        "name": "Ether Mail",
        "version": "1",
        "chainId": 1,
        "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
    },
    "message": {
        "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
        "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
        "contents": "Hello, Bob!"
    }
}"#;

const OK: [u8; 2] = [0x90, 0x00];
const REJECTED: [u8; 2] = [0x69, 0x85];
const WRONG_INS: [u8; 2] = [0x6d, 0x00];
const APP_CONFIGURATION: [u8; 4] = [0x01, 1, 10, 4];

enum Stream {
    Message {
        path: Vec<u32>,
        expected: usize,
        data: Vec<u8>,
    },
    Transaction {
        path: Vec<u32>,
        data: Vec<u8>,
    },
}

/// Answers applet commands with keys derived from [`TEST_MNEMONIC`].
pub struct DeviceEmulator {
    seed: [u8; 64],
    reject_signing: bool,
    /// Address requests answered before the device starts refusing them.
    address_budget: Option<usize>,
    stream: Option<Stream>,
}

impl DeviceEmulator {
    pub fn new() -> Self {
        let mnemonic = Mnemonic::parse_normalized(TEST_MNEMONIC).unwrap();
        Self {
            seed: mnemonic.to_seed(""),
            reject_signing: false,
            address_budget: None,
            stream: None,
        }
    }

    /// Answers the first `served` address requests, then refuses the rest.
    pub fn refusing_addresses_after(served: usize) -> Self {
        Self {
            address_budget: Some(served),
            ..Self::new()
        }
    }

    /// Answers every signing command with "denied by user".
    pub fn rejecting() -> Self {
        Self {
            reject_signing: true,
            ..Self::new()
        }
    }

    pub fn install(mut self, radio: &MockRadio) {
        radio.set_responder(move |command| Some(self.respond(command)));
    }

    pub fn respond(&mut self, command: &[u8]) -> Vec<u8> {
        let apdu = Apdu::from_bytes(command).unwrap();
        match apdu.ins {
            INS_GET_ADDRESS if self.address_budget == Some(0) => REJECTED.to_vec(),
            INS_GET_ADDRESS => {
                if let Some(budget) = self.address_budget.as_mut() {
                    *budget -= 1;
                }
                let (path, _) = split_path(&apdu.data);
                let key = self.key_at(&path);
                let public_key = key.verifying_key().to_encoded_point(false);
                let address = verifying_key_to_address(key.verifying_key());
                let ascii = address.trim_start_matches("0x").to_lowercase();

                let mut out = vec![public_key.as_bytes().len() as u8];
                out.extend_from_slice(public_key.as_bytes());
                out.push(ascii.len() as u8);
                out.extend_from_slice(ascii.as_bytes());
                out.extend_from_slice(&OK);
                out
            }
            INS_GET_APP_CONFIGURATION => {
                let mut out = APP_CONFIGURATION.to_vec();
                out.extend_from_slice(&OK);
                out
            }
            _ if self.reject_signing => REJECTED.to_vec(),
            INS_SIGN_PERSONAL_MESSAGE => self.personal_chunk(&apdu),
            INS_SIGN_TRANSACTION => self.transaction_chunk(&apdu),
            INS_SIGN_EIP712_HASHED => {
                let (path, rest) = split_path(&apdu.data);
                let mut digest_input = vec![0x19, 0x01];
                digest_input.extend_from_slice(&rest[..64]);
                let hash = crate::eth::keccak256(&digest_input);
                let mut signature = sign_prehash(&self.key_at(&path), &hash).unwrap();
                signature.v += 27;
                signed(signature)
            }
            _ => WRONG_INS.to_vec(),
        }
    }

    fn personal_chunk(&mut self, apdu: &Apdu) -> Vec<u8> {
        if apdu.p1 == 0x00 {
            let (path, rest) = split_path(&apdu.data);
            let expected = u32::from_be_bytes(rest[..4].try_into().unwrap()) as usize;
            self.stream = Some(Stream::Message {
                path,
                expected,
                data: rest[4..].to_vec(),
            });
        } else if let Some(Stream::Message { data, .. }) = self.stream.as_mut() {
            data.extend_from_slice(&apdu.data);
        }

        match self.stream.take() {
            Some(Stream::Message {
                path,
                expected,
                data,
            }) if data.len() >= expected => {
                signed(sign_personal_message(&self.key_at(&path), &data).unwrap())
            }
            pending => {
                self.stream = pending;
                OK.to_vec()
            }
        }
    }

    fn transaction_chunk(&mut self, apdu: &Apdu) -> Vec<u8> {
        if apdu.p1 == 0x00 {
            let (path, rest) = split_path(&apdu.data);
            self.stream = Some(Stream::Transaction {
                path,
                data: rest.to_vec(),
            });
        } else if let Some(Stream::Transaction { data, .. }) = self.stream.as_mut() {
            data.extend_from_slice(&apdu.data);
        }

        if apdu.data.len() == MAX_APDU_DATA {
            return OK.to_vec();
        }
        match self.stream.take() {
            Some(Stream::Transaction { path, data }) => {
                signed(sign_transaction_bytes(&self.key_at(&path), &data).unwrap())
            }
            _ => WRONG_INS.to_vec(),
        }
    }

    fn key_at(&self, path: &[u32]) -> SigningKey {
        let rendered = path.iter().fold(String::from("m"), |mut acc, component| {
            let index = component & !device_apdu::HARDENED;
            if component & device_apdu::HARDENED != 0 {
                acc.push_str(&format!("/{index}'"));
            } else {
                acc.push_str(&format!("/{index}"));
            }
            acc
        });
        let path: DerivationPath = rendered.parse().unwrap();
        XPrv::derive_from_path(&self.seed[..], &path)
            .unwrap()
            .private_key()
            .clone()
    }
}

fn split_path(data: &[u8]) -> (Vec<u32>, &[u8]) {
    let count = data[0] as usize;
    let path = data[1..1 + count * 4]
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes(chunk.try_into().unwrap()))
        .collect();
    (path, &data[1 + count * 4..])
}

fn signed(signature: Signature) -> Vec<u8> {
    let mut out = vec![signature.v];
    out.extend_from_slice(&signature.r);
    out.extend_from_slice(&signature.s);
    out.extend_from_slice(&OK);
    out
}

/// Spawns a transport over `radio` and connects it to [`DEVICE_ID`].
pub async fn connected_transport(radio: &MockRadio) -> TransportHandle {
    let handle = TransportHandle::spawn(radio.clone(), BleProfile::nano_x(), TransportConfig::default())
        .await
        .unwrap();
    handle.connect(DEVICE_ID).await.unwrap();
    handle
}
