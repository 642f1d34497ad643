use thiserror::Error;

/// Channel id stamped on every frame of the APDU channel.
pub const CHANNEL_ID: u16 = 0x0101;
/// Tag identifying an APDU-carrying frame.
pub const TAG_APDU: u8 = 0x05;

const CONTINUATION_HEADER_LEN: usize = 5; // channel (2) + tag (1) + seq (2)
const FIRST_HEADER_LEN: usize = CONTINUATION_HEADER_LEN + 2; // + total length (2)
const MAX_APDU_LEN: usize = u16::MAX as usize;

/// Smallest link MTU that still leaves room for one payload byte in a first frame.
pub const MIN_MTU: usize = FIRST_HEADER_LEN + 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame_too_small: mtu {mtu} leaves no room for payload")]
    FrameTooSmall { mtu: usize },
    #[error("apdu_too_large: {0} bytes")]
    ApduTooLarge(usize),
    #[error("out_of_sequence: expected {expected}, got {actual}")]
    OutOfSequence { expected: u16, actual: u16 },
    #[error("invalid_frame: {0}")]
    InvalidFrame(&'static str),
}

/// Parsed header of a single link frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: u16,
    pub tag: u8,
    pub sequence: u16,
    /// Only present on the first frame (`sequence == 0`).
    pub total_len: Option<u16>,
}

impl FrameHeader {
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < CONTINUATION_HEADER_LEN {
            return Err(FrameError::InvalidFrame("frame shorter than header"));
        }
        let channel = u16::from_be_bytes([frame[0], frame[1]]);
        let tag = frame[2];
        let sequence = u16::from_be_bytes([frame[3], frame[4]]);
        let total_len = if sequence == 0 {
            if frame.len() < FIRST_HEADER_LEN {
                return Err(FrameError::InvalidFrame("first frame missing length field"));
            }
            Some(u16::from_be_bytes([frame[5], frame[6]]))
        } else {
            None
        };
        Ok(Self {
            channel,
            tag,
            sequence,
            total_len,
        })
    }

    fn header_len(&self) -> usize {
        if self.total_len.is_some() {
            FIRST_HEADER_LEN
        } else {
            CONTINUATION_HEADER_LEN
        }
    }
}

/// Splits `apdu` into zero-padded frames of exactly `mtu` bytes.
pub fn encode_apdu(apdu: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>, FrameError> {
    if mtu < MIN_MTU {
        return Err(FrameError::FrameTooSmall { mtu });
    }
    if apdu.len() > MAX_APDU_LEN {
        return Err(FrameError::ApduTooLarge(apdu.len()));
    }

    let mut frames = Vec::new();
    let mut remaining = apdu;
    let mut sequence: u16 = 0;

    loop {
        let mut frame = Vec::with_capacity(mtu);
        frame.extend_from_slice(&CHANNEL_ID.to_be_bytes());
        frame.push(TAG_APDU);
        frame.extend_from_slice(&sequence.to_be_bytes());
        if sequence == 0 {
            frame.extend_from_slice(&(apdu.len() as u16).to_be_bytes());
        }

        let take = remaining.len().min(mtu - frame.len());
        frame.extend_from_slice(&remaining[..take]);
        frame.resize(mtu, 0);
        frames.push(frame);
        remaining = &remaining[take..];

        if remaining.is_empty() {
            break;
        }
        sequence = sequence.wrapping_add(1);
    }

    Ok(frames)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyOutcome {
    Incomplete,
    Complete(Vec<u8>),
}

/// Per-exchange reassembly session.
///
/// A first frame always restarts the session. Any error resets it, so the
/// caller must replay the whole exchange.
#[derive(Debug, Default)]
pub struct ReassemblyState {
    expected_len: usize,
    buffer: Vec<u8>,
    last_sequence: Option<u16>,
}

impl ReassemblyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.expected_len = 0;
        self.buffer.clear();
        self.last_sequence = None;
    }

    /// True when no first frame has been accepted since the last reset.
    pub fn is_idle(&self) -> bool {
        self.last_sequence.is_none()
    }

    pub fn push(&mut self, frame: &[u8]) -> Result<ReassemblyOutcome, FrameError> {
        let header = match FrameHeader::parse(frame) {
            Ok(header) => header,
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };
        if header.channel != CHANNEL_ID {
            self.reset();
            return Err(FrameError::InvalidFrame("unexpected channel id"));
        }
        if header.tag != TAG_APDU {
            self.reset();
            return Err(FrameError::InvalidFrame("unexpected frame tag"));
        }

        let payload = &frame[header.header_len()..];
        match header.total_len {
            Some(total_len) => {
                self.reset();
                self.expected_len = total_len as usize;
                self.last_sequence = Some(0);
                self.buffer.extend_from_slice(payload);
            }
            None => {
                let expected = self
                    .last_sequence
                    .map(|last| last.wrapping_add(1))
                    .unwrap_or(0);
                if self.last_sequence.is_none() || header.sequence != expected {
                    self.reset();
                    return Err(FrameError::OutOfSequence {
                        expected,
                        actual: header.sequence,
                    });
                }
                self.last_sequence = Some(header.sequence);
                self.buffer.extend_from_slice(payload);
            }
        }

        if self.buffer.len() >= self.expected_len {
            let mut apdu = std::mem::take(&mut self.buffer);
            apdu.truncate(self.expected_len);
            self.reset();
            return Ok(ReassemblyOutcome::Complete(apdu));
        }
        Ok(ReassemblyOutcome::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reassemble(frames: &[Vec<u8>]) -> Option<Vec<u8>> {
        let mut state = ReassemblyState::new();
        for frame in frames {
            if let ReassemblyOutcome::Complete(apdu) = state.push(frame).unwrap() {
                return Some(apdu);
            }
        }
        None
    }

    proptest! {
        #[test]
        fn roundtrip(apdu in proptest::collection::vec(any::<u8>(), 0..2048), mtu in MIN_MTU..256usize) {
            let frames = encode_apdu(&apdu, mtu).unwrap();
            prop_assert!(frames.iter().all(|frame| frame.len() == mtu));
            let decoded = reassemble(&frames).expect("apdu should reassemble");
            prop_assert_eq!(decoded, apdu);
        }
    }

    #[test]
    fn first_frame_layout() {
        let frames = encode_apdu(&[0xe0, 0x02, 0x00, 0x00], 12).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            vec![0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x04, 0xe0, 0x02, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn continuation_frames_carry_incrementing_sequence() {
        let apdu: Vec<u8> = (0u8..20).collect();
        let frames = encode_apdu(&apdu, 10).unwrap();
        // 3 bytes in the first frame, 5 in each continuation.
        assert_eq!(frames.len(), 5);
        assert_eq!(&frames[1][..5], &[0x01, 0x01, 0x05, 0x00, 0x01]);
        assert_eq!(&frames[4][..5], &[0x01, 0x01, 0x05, 0x00, 0x04]);
        assert_eq!(&frames[4][5..], &[18, 19, 0, 0, 0]);
    }

    #[test]
    fn rejects_mtu_without_payload_room() {
        assert_eq!(
            encode_apdu(&[1, 2, 3], FIRST_HEADER_LEN),
            Err(FrameError::FrameTooSmall {
                mtu: FIRST_HEADER_LEN
            })
        );
    }

    #[test]
    fn empty_apdu_completes_on_first_frame() {
        let frames = encode_apdu(&[], MIN_MTU).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(reassemble(&frames), Some(Vec::new()));
    }

    #[test]
    fn out_of_order_frame_resets_session() {
        let apdu: Vec<u8> = (0u8..40).collect();
        let frames = encode_apdu(&apdu, 12).unwrap();
        let mut state = ReassemblyState::new();

        assert_eq!(state.push(&frames[0]), Ok(ReassemblyOutcome::Incomplete));
        let err = state.push(&frames[2]).unwrap_err();
        assert_eq!(
            err,
            FrameError::OutOfSequence {
                expected: 1,
                actual: 2
            }
        );
        assert!(state.is_idle());

        // Continuing the broken exchange is still rejected.
        assert!(matches!(
            state.push(&frames[1]),
            Err(FrameError::OutOfSequence { .. })
        ));

        // A fresh first frame starts cleanly.
        let mut result = None;
        for frame in &frames {
            if let ReassemblyOutcome::Complete(done) = state.push(frame).unwrap() {
                result = Some(done);
            }
        }
        assert_eq!(result, Some(apdu));
    }

    #[test]
    fn rejects_foreign_tag() {
        let mut frame = encode_apdu(&[1, 2, 3], 16).unwrap().remove(0);
        frame[2] = 0x08;
        let mut state = ReassemblyState::new();
        assert_eq!(
            state.push(&frame),
            Err(FrameError::InvalidFrame("unexpected frame tag"))
        );
    }
}
