//! Error taxonomy for the SPITFP link (§7).
//!
//! Nothing here is ever escalated out of [`crate::link::Link::tick`] as a
//! hard error — recovery from [`ProtocolError`] is always local (drain
//! the ring, reset the framer) and is only observable through the trace
//! ring (see [`crate::trace`]).

/// A desync or corruption condition detected by the receive framer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The length byte at `START` was not `0`, `3`, or in `[11..83]`.
    IllegalLength(u8),
    /// The trailing checksum did not match the folded hash of the frame.
    ChecksumMismatch,
}

/// An error returned by the downward send contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
    /// A DATA packet is already outstanding; the one-packet window is
    /// closed. Calling [`crate::link::Link`]'s `send_ack_and_message`
    /// when `send_possible()` is `false` is a caller bug per §4.5; this
    /// crate reports it instead of panicking (see DESIGN.md).
    WindowBusy,
    /// The payload exceeds `Config::TFP_PAYLOAD_MAX`.
    PayloadTooLarge(usize),
}
