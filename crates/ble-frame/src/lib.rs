//! Framing helpers for carrying APDUs over a BLE GATT link.

pub mod frame;

pub use frame::{
    CHANNEL_ID, FrameError, FrameHeader, MIN_MTU, ReassemblyOutcome, ReassemblyState, TAG_APDU,
    encode_apdu,
};
