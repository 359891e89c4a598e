//! The two upcalls and the one downcall contract spec.md §1 and §6
//! name as external collaborators, expressed as traits so
//! [`crate::link::Link`] never depends on the concrete bootloader
//! message dispatcher this crate explicitly leaves out of scope.
//!
//! `uid`/`device_identifier` reconstruct the "get UID/device-id"
//! upcall spec.md's overview names without detailing its signature;
//! grounded on the original's `tfp_common_handle_message`, which
//! threads a `BootloaderStatus` carrying both values into every call.
//! The full `BootloaderStatus` struct — enumeration state, firmware
//! write offsets, the jump-to-firmware flag — is the upper-layer
//! dispatcher this crate does not implement (§1 Non-goals), so only
//! the two accessors it would have offered are reconstructed here.

use crate::error::SendError;

/// Implemented by the upper-layer TFP message dispatcher and handed to
/// [`crate::link::Link::new`].
pub trait MessageHandler {
    /// Called once per newly accepted DATA packet, synchronously.
    ///
    /// Must either call [`DownwardOps::send_ack_and_message`] through
    /// `ctx` with a response of at most `Config::TFP_PAYLOAD_MAX`
    /// bytes, or return without calling it — in which case the link
    /// synthesizes a bare ACK on the caller's behalf (§6). Must not
    /// block, and must not call `send_ack_and_message` more than once.
    fn handle_message(&mut self, payload: &[u8], ctx: &mut dyn DownwardOps);

    /// The device's Tinkerforge UID, as the upper layer's identity
    /// upcall would report it.
    fn uid(&self) -> u32;

    /// The device identifier the upper layer's enumeration messages
    /// advertise.
    fn device_identifier(&self) -> u16;
}

/// The downward send contract, handed to [`MessageHandler::handle_message`]
/// as `ctx`. Implemented internally by [`crate::link::Link`]; never
/// implemented by an integrator.
pub trait DownwardOps {
    /// Frames and arms a DATA packet carrying `payload`, piggybacking
    /// an ACK of the just-received message. Fails with
    /// [`SendError::WindowBusy`] if a packet is already outstanding
    /// (cannot happen when called from inside `handle_message`, since
    /// the link only invokes it while the window is open) or
    /// [`SendError::PayloadTooLarge`] if `payload` exceeds the
    /// configured maximum.
    fn send_ack_and_message(&mut self, payload: &[u8]) -> Result<(), SendError>;

    /// Frames and arms a bare ACK, without consuming a DATA sequence
    /// number.
    fn send_ack(&mut self);

    /// Whether the one-packet send window is currently open.
    fn send_possible(&self) -> bool;
}
