use thiserror::Error;

use crate::status::StatusWord;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid BIP44 path: {0}")]
    InvalidPath(String),
    #[error("invalid device response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Apdu(StatusWord),
    #[error("command data too long: {0} bytes")]
    DataTooLong(usize),
}

impl ProtocolError {
    pub(crate) fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse(reason.into())
    }
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
