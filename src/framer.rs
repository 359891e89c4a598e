//! The receive framer: a byte-oriented Mealy machine that extracts ACK
//! and DATA packets from the stream of bytes the DMA bridge publishes
//! into the receive ring. See §4.4 for the full state table this
//! implements.
//!
//! The framer only validates framing and checksums; it does not decide
//! whether a completed frame can be consumed from the ring (that
//! depends on the send window, which the framer has no access to). All
//! it returns is "here is a validated ACK/DATA frame of length N" —
//! [`crate::link::Link::tick`] owns the window check, the ring
//! advance, and the upcall.

use crate::checksum::Checksum;
use crate::error::ProtocolError;

/// States of the receive framer. Always `Start` at tick entry and exit
/// (§4.4, §8 P1); a partial parse never survives past the end of a
/// tick because the bytes it consumed are still sitting unread in the
/// ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramerState {
    Start,
    AckSeq,
    AckCksum,
    MsgSeq,
    MsgData,
    MsgCksum,
}

/// What happened as a result of feeding one more byte to the framer.
pub enum StepOutcome {
    /// No terminal event yet; keep feeding bytes.
    Continue,
    /// A single stray byte (the idle byte, `0x00`) was discarded at
    /// `START`. The caller must remove exactly one byte from the ring.
    Discarded,
    /// The length byte was illegal, or a checksum did not match.
    /// Recovery per §7: drain the whole ring, reset the framer (the
    /// framer is already back at `START` by the time this is
    /// returned).
    Error(ProtocolError),
    /// A bare ACK frame (3 bytes) validated successfully. The caller
    /// must advance the ring by 3 bytes, and — if
    /// `last_seen_by_peer` matches the outstanding DATA's sequence
    /// number — open the send window.
    Ack { last_seen_by_peer: u8 },
    /// A DATA frame validated successfully. `last_seen_by_peer` may
    /// open the send window exactly as for [`StepOutcome::Ack`]. The
    /// caller decides, only after applying that window update,
    /// whether the send-possible predicate holds: if so it must
    /// advance the ring by `frame_len` and either dispatch or re-ACK
    /// depending on `message_sequence_number`; if not, it must leave
    /// the bytes in the ring for the next tick.
    Data {
        last_seen_by_peer: u8,
        message_sequence_number: u8,
        frame_len: usize,
    },
}

/// The receive framer's per-frame scratch state, plus a fixed-capacity
/// payload buffer sized for the largest TFP message this link accepts.
pub struct Framer<const MAX_PAYLOAD: usize> {
    state: FramerState,
    checksum: Checksum,
    data_length: u8,
    seq_byte: u8,
    message: [u8; MAX_PAYLOAD],
    pos: usize,
}

impl<const MAX_PAYLOAD: usize> Framer<MAX_PAYLOAD> {
    /// Creates a framer at `START` with no partial parse pending.
    pub const fn new() -> Self {
        Framer {
            state: FramerState::Start,
            checksum: Checksum::new(),
            data_length: 0,
            seq_byte: 0,
            message: [0; MAX_PAYLOAD],
            pos: 0,
        }
    }

    /// Current state, for diagnostics and the P1 invariant check.
    pub const fn state(&self) -> FramerState {
        self.state
    }

    /// Forces the framer back to `START`, discarding any in-progress
    /// partial parse. Called at the end of every tick (§4.4) and after
    /// any protocol error.
    pub fn reset(&mut self) {
        self.state = FramerState::Start;
        self.pos = 0;
    }

    /// The decoded payload of the most recently completed DATA frame.
    /// Only meaningful immediately after a [`StepOutcome::Data`].
    pub fn payload(&self) -> &[u8] {
        &self.message[..self.pos]
    }

    /// Feeds one more byte to the framer.
    ///
    /// `min_frame_len`/`max_frame_len` are the configured DATA frame
    /// length bounds (`Config::MIN_DATA_FRAME`/`MAX_DATA_FRAME`).
    pub fn step(&mut self, byte: u8, min_frame_len: u8, max_frame_len: u8) -> StepOutcome {
        match self.state {
            FramerState::Start => {
                if byte == 0 {
                    StepOutcome::Discarded
                } else if byte == 3 {
                    self.checksum = Checksum::new();
                    self.checksum.update(byte);
                    self.state = FramerState::AckSeq;
                    StepOutcome::Continue
                } else if byte >= min_frame_len && byte <= max_frame_len {
                    self.checksum = Checksum::new();
                    self.checksum.update(byte);
                    self.data_length = byte;
                    self.state = FramerState::MsgSeq;
                    StepOutcome::Continue
                } else {
                    self.state = FramerState::Start;
                    StepOutcome::Error(ProtocolError::IllegalLength(byte))
                }
            }
            FramerState::AckSeq => {
                self.seq_byte = byte;
                self.checksum.update(byte);
                self.state = FramerState::AckCksum;
                StepOutcome::Continue
            }
            FramerState::AckCksum => {
                self.state = FramerState::Start;
                if byte != self.checksum.value() {
                    StepOutcome::Error(ProtocolError::ChecksumMismatch)
                } else {
                    StepOutcome::Ack {
                        last_seen_by_peer: (self.seq_byte & 0xF0) >> 4,
                    }
                }
            }
            FramerState::MsgSeq => {
                self.seq_byte = byte;
                self.checksum.update(byte);
                self.pos = 0;
                self.state = FramerState::MsgData;
                StepOutcome::Continue
            }
            FramerState::MsgData => {
                self.message[self.pos] = byte;
                self.pos += 1;
                self.checksum.update(byte);

                let payload_len = self.data_length as usize - 3;
                if self.pos == payload_len {
                    self.state = FramerState::MsgCksum;
                } else {
                    self.state = FramerState::MsgData;
                }
                StepOutcome::Continue
            }
            FramerState::MsgCksum => {
                self.state = FramerState::Start;
                if byte != self.checksum.value() {
                    return StepOutcome::Error(ProtocolError::ChecksumMismatch);
                }

                StepOutcome::Data {
                    last_seen_by_peer: (self.seq_byte & 0xF0) >> 4,
                    message_sequence_number: self.seq_byte & 0x0F,
                    frame_len: self.data_length as usize,
                }
            }
        }
    }
}

impl<const MAX_PAYLOAD: usize> Default for Framer<MAX_PAYLOAD> {
    fn default() -> Self {
        Self::new()
    }
}
