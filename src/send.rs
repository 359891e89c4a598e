//! The send engine: builds outgoing ACK and DATA frames into a
//! fixed-capacity buffer and tracks the single outstanding packet's
//! retransmit timer.
//!
//! Grounded on `spitfp_send_ack`, `spitfp_send_ack_and_message`, and
//! `spitfp_check_message_send_timeout` from the original bootloader
//! sources. The actual DMA arming is left to [`crate::transport`]; this
//! module only knows how to fill `buffer` and track
//! `current_sequence_number`/`last_send_time`.

use crate::checksum::Checksum;
use crate::config::Config;
use crate::error::SendError;

/// Builds and tracks the single outstanding send frame.
///
/// `MAX_FRAME` must be at least `Config::MAX_DATA_FRAME` for the
/// configuration this is paired with; [`crate::link::Link`] enforces
/// this with a `debug_assert_eq!` at construction since the two can't
/// be tied together on stable without `generic_const_exprs`.
pub struct SendEngine<const MAX_FRAME: usize> {
    buffer: [u8; MAX_FRAME],
    /// Length of the frame currently sitting in `buffer`, or 0 if the
    /// send window is free (mirrors `buffer_send_length`).
    len: usize,
    /// `current_sequence_number` from §4.5: the sequence number of the
    /// most recently sent (or about to be sent) DATA packet. Runs
    /// `1..=15`; 0 is reserved for ACK. Starts at `0` (no DATA packet
    /// sent yet) so the first `prepare_ack_and_message`'s pre-increment
    /// lands on `1`, matching §8 scenario 2's worked example exactly
    /// (see DESIGN.md's Open Question decision on this).
    current_sequence_number: u8,
    /// `last_sequence_number_seen`: the sequence number of the most
    /// recently accepted DATA packet from the peer, echoed in every
    /// frame we send.
    last_sequence_number_seen: u8,
    /// Timestamp (ms) at which the outstanding frame was last
    /// (re)armed for transmission. Meaningless while `len == 0`.
    last_send_time_ms: u32,
    /// Whether the frame currently in `buffer` is a DATA packet
    /// (`true`) or a bare ACK (`false`). Meaningless while `len == 0`.
    /// A bare ACK is never itself acknowledged by the peer — unlike
    /// `spitfp_send_ack_and_message`, the original `spitfp_send_ack`
    /// never touches `buffer_send_length` at all — so the window it
    /// occupies only needs the transport to report the hardware
    /// transfer complete to reopen, not a matching sequence echo; see
    /// `is_outstanding_data`/`clear_ack_once_transmitted`.
    is_data: bool,
}

impl<const MAX_FRAME: usize> SendEngine<MAX_FRAME> {
    /// Creates a send engine with no outstanding packet.
    pub const fn new() -> Self {
        SendEngine {
            buffer: [0; MAX_FRAME],
            len: 0,
            current_sequence_number: 0,
            last_sequence_number_seen: 0,
            last_send_time_ms: 0,
            is_data: false,
        }
    }

    /// The sequence number most recently assigned to an outgoing DATA
    /// packet.
    pub const fn current_sequence_number(&self) -> u8 {
        self.current_sequence_number
    }

    /// The sequence number of the most recently accepted incoming DATA
    /// packet, as echoed to the peer.
    pub const fn last_sequence_number_seen(&self) -> u8 {
        self.last_sequence_number_seen
    }

    /// Whether a new packet may be handed to
    /// [`SendEngine::send_ack_and_message`] (§4.5: at most one
    /// outstanding DATA packet).
    pub const fn send_possible(&self) -> bool {
        self.len == 0
    }

    /// The framed bytes currently waiting to go out, or an empty slice
    /// if nothing is pending.
    pub fn frame(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Records that the peer has told us a given sequence number (a
    /// DATA packet), without sending anything new. Used when the
    /// packet is a duplicate (§4.6): we only need to re-ACK, which
    /// shares the bare-ACK wire format.
    pub fn note_seen(&mut self, seq: u8) {
        self.last_sequence_number_seen = seq;
    }

    /// Builds a bare ACK frame (3 bytes) into `buffer` and marks the
    /// send window busy until the transport reports completion.
    ///
    /// Grounded on `spitfp_send_ack`. Does not touch
    /// `current_sequence_number`: an ACK never consumes a DATA
    /// sequence number.
    pub fn prepare_ack(&mut self) {
        let mut checksum = Checksum::new();
        self.buffer[0] = 3;
        checksum.update(self.buffer[0]);
        self.buffer[1] = self.last_sequence_number_seen << 4;
        checksum.update(self.buffer[1]);
        self.buffer[2] = checksum.value();
        self.len = 3;
        self.is_data = false;
    }

    /// Builds a DATA frame carrying `payload` and marks the send
    /// window busy. Advances `current_sequence_number` (wrapping
    /// `0xF -> 0x1`) per `spitfp_get_sequence_byte(st, true)`.
    ///
    /// Returns [`SendError::WindowBusy`] if a frame is already
    /// outstanding, or [`SendError::PayloadTooLarge`] if `payload`
    /// exceeds `Cfg::TFP_PAYLOAD_MAX`.
    pub fn prepare_ack_and_message<Cfg: Config>(
        &mut self,
        payload: &[u8],
    ) -> Result<(), SendError> {
        if !self.send_possible() {
            return Err(SendError::WindowBusy);
        }
        if payload.len() > Cfg::TFP_PAYLOAD_MAX {
            return Err(SendError::PayloadTooLarge(payload.len()));
        }

        self.current_sequence_number += 1;
        if self.current_sequence_number > 0xF {
            self.current_sequence_number = 1;
        }

        let frame_len = payload.len() + Cfg::PROTOCOL_OVERHEAD;
        let mut checksum = Checksum::new();

        self.buffer[0] = frame_len as u8;
        checksum.update(self.buffer[0]);

        self.buffer[1] = self.current_sequence_number | (self.last_sequence_number_seen << 4);
        checksum.update(self.buffer[1]);

        for (i, &b) in payload.iter().enumerate() {
            self.buffer[2 + i] = b;
            checksum.update(b);
        }

        self.buffer[frame_len - 1] = checksum.value();
        self.len = frame_len;
        self.is_data = true;
        Ok(())
    }

    /// Records that the outstanding frame has just been (re)armed for
    /// transmission, resetting the retransmit timer.
    pub fn mark_armed(&mut self, now_ms: u32) {
        self.last_send_time_ms = now_ms;
    }

    /// Clears the outstanding frame once the peer has ACKed it.
    pub fn clear_outstanding(&mut self) {
        self.len = 0;
    }

    /// Whether the outstanding frame, if any, is a DATA packet waiting
    /// on a matching peer ACK (as opposed to a bare ACK, which needs
    /// nothing more than the hardware handoff to complete).
    pub const fn is_outstanding_data(&self) -> bool {
        self.len > 0 && self.is_data
    }

    /// Frees the window once a bare ACK has been handed off to the
    /// transport. A no-op if nothing is outstanding or the outstanding
    /// frame is a DATA packet, which must survive until the peer's
    /// sequence echo matches it in `Link`'s tick loop.
    /// `transport_idle` should be the transport's own (hardware-only)
    /// `send_possible()`; the original `spitfp_send_ack` never sets
    /// `buffer_send_length` at all, so a bare ACK's window only exists
    /// here because this port reuses one outstanding-frame slot for
    /// both kinds of send — this is what lets that slot reopen for an
    /// ACK-only link without waiting on a sequence number that would
    /// otherwise never advance.
    pub fn clear_ack_once_transmitted(&mut self, transport_idle: bool) {
        if transport_idle && self.len > 0 && !self.is_data {
            self.len = 0;
        }
    }

    /// Whether the outstanding frame (if any) has sat unacknowledged
    /// long enough to warrant a retransmit, per
    /// `spitfp_check_message_send_timeout`. The original always
    /// retransmits a DMA-idle, non-empty outstanding frame immediately
    /// (timeout 0), since the master polls continuously and handles
    /// duplicates via the sequence number; `Cfg::RETRANSMIT_TIMEOUT_MS`
    /// generalizes that to a configurable grace period.
    pub fn needs_retransmit<Cfg: Config>(&self, now_ms: u32) -> bool {
        self.len > 0 && now_ms.wrapping_sub(self.last_send_time_ms) >= Cfg::RETRANSMIT_TIMEOUT_MS
    }
}

impl<const MAX_FRAME: usize> Default for SendEngine<MAX_FRAME> {
    fn default() -> Self {
        Self::new()
    }
}
