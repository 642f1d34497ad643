//! Pure encoders and decoders for the signing applet's APDU protocol.
//!
//! Nothing here performs I/O. Commands are returned as raw APDU byte buffers
//! ready to hand to a transport, and responses are parsed from the raw bytes
//! the transport returns (status word included).

pub mod command;
pub mod error;
pub mod path;
pub mod response;
pub mod status;

pub use command::{
    Apdu, CLA, INS_GET_ADDRESS, INS_GET_APP_CONFIGURATION, INS_SIGN_EIP712_HASHED,
    INS_SIGN_PERSONAL_MESSAGE, INS_SIGN_TRANSACTION, MAX_APDU_DATA, encode_get_address,
    encode_get_app_configuration, encode_sign_message, encode_sign_transaction,
    encode_sign_typed_data,
};
pub use error::{ProtocolError, ProtocolResult};
pub use path::{HARDENED, encode_path, parse_path};
pub use response::{
    AppConfiguration, DeviceAddress, DeviceSignature, decode_address, decode_app_configuration,
    decode_signature, split_status,
};
pub use status::{StatusCategory, StatusWord, decode_status_word};
