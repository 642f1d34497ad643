use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Coarse meaning of a status word, for callers that branch on the failure
/// rather than print it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    Success,
    UserRejected,
    DeviceLocked,
    WrongApplication,
    InvalidData,
    WrongLength,
    InvalidParameters,
    NotEnoughSpace,
    DataNotFound,
    Unknown,
}

/// 2-byte big-endian trailer of every device response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(pub u16);

const STATUS_TABLE: &[(u16, StatusCategory, &str)] = &[
    (0x9000, StatusCategory::Success, "success"),
    (0x6985, StatusCategory::UserRejected, "rejected by user on device"),
    (0x5515, StatusCategory::DeviceLocked, "device is locked, unlock it and retry"),
    (0x6982, StatusCategory::DeviceLocked, "security status not satisfied, device may be locked"),
    (0x6d00, StatusCategory::WrongApplication, "instruction not supported, open the Ethereum app"),
    (0x6e00, StatusCategory::WrongApplication, "class not supported, open the Ethereum app"),
    (0x6e01, StatusCategory::WrongApplication, "Ethereum app is not open"),
    (0x6511, StatusCategory::WrongApplication, "Ethereum app is not open"),
    (0x6a80, StatusCategory::InvalidData, "device rejected malformed data"),
    (0x6a84, StatusCategory::NotEnoughSpace, "device ran out of space for the request"),
    (0x6a88, StatusCategory::DataNotFound, "referenced data not found on device"),
    (0x6700, StatusCategory::WrongLength, "command has the wrong length"),
    (0x6b00, StatusCategory::InvalidParameters, "invalid command parameters"),
];

impl StatusWord {
    pub const SUCCESS: StatusWord = StatusWord(0x9000);

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn category(self) -> StatusCategory {
        lookup(self.0)
            .map(|(category, _)| category)
            .unwrap_or(StatusCategory::Unknown)
    }

    pub fn describe(self) -> String {
        match lookup(self.0) {
            Some((_, message)) => message.to_string(),
            None => format!("device returned error 0x{:04X}", self.0),
        }
    }

    pub fn into_result(self) -> ProtocolResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ProtocolError::Apdu(self))
        }
    }
}

fn lookup(code: u16) -> Option<(StatusCategory, &'static str)> {
    STATUS_TABLE
        .iter()
        .find(|(candidate, _, _)| *candidate == code)
        .map(|(_, category, message)| (*category, *message))
}

impl From<u16> for StatusWord {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Reads the status word from the last two bytes of `response`.
pub fn decode_status_word(response: &[u8]) -> ProtocolResult<StatusWord> {
    match response {
        [.., hi, lo] => Ok(StatusWord(u16::from_be_bytes([*hi, *lo]))),
        _ => Err(ProtocolError::invalid_response(format!(
            "response of {} bytes has no status word",
            response.len()
        ))),
    }
}
