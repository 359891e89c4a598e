//! Compile-time configuration surface for the SPITFP link.
//!
//! Mirrors `config_spitfp.h` from the original bootloader sources: the
//! receive ring capacity, TFP payload bounds, protocol overhead, and the
//! retransmission timeout are all fixed at build time rather than
//! threaded through as runtime parameters.

use static_assertions::const_assert;

/// Compile-time configuration for a [`crate::link::Link`].
///
/// Implement this on a zero-sized type to override the defaults; see
/// [`DefaultConfig`].
pub trait Config {
    /// Capacity, in bytes, of the receive ring buffer. Must be at least
    /// `2 * (PROTOCOL_OVERHEAD + TFP_PAYLOAD_MAX)` so that one tick's
    /// worth of bytes can never wrap the consumer (§6).
    const RECV_RING_CAPACITY: usize;

    /// Minimum TFP payload length, in bytes.
    const TFP_PAYLOAD_MIN: usize;

    /// Maximum TFP payload length, in bytes.
    const TFP_PAYLOAD_MAX: usize;

    /// Bytes of framing overhead (length + seq byte + checksum).
    const PROTOCOL_OVERHEAD: usize;

    /// Upper bound in milliseconds on the retransmit timeout; 0 is legal
    /// and means "resend as soon as the hardware is idle again."
    const RETRANSMIT_TIMEOUT_MS: u32;

    /// Maximum length, in bytes, of a fully framed DATA packet.
    const MAX_DATA_FRAME: usize = Self::PROTOCOL_OVERHEAD + Self::TFP_PAYLOAD_MAX;

    /// Minimum length, in bytes, of a fully framed DATA packet.
    const MIN_DATA_FRAME: usize = Self::PROTOCOL_OVERHEAD + Self::TFP_PAYLOAD_MIN;
}

/// Default configuration, matching `config_spitfp.h`'s
/// `SPITFP_RECEIVE_BUFFER_SIZE` and the TFP message length bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultConfig;

impl Config for DefaultConfig {
    const RECV_RING_CAPACITY: usize = 1024;
    const TFP_PAYLOAD_MIN: usize = 8;
    const TFP_PAYLOAD_MAX: usize = 80;
    const PROTOCOL_OVERHEAD: usize = 3;
    const RETRANSMIT_TIMEOUT_MS: u32 = 0;
}

const_assert!(
    DefaultConfig::RECV_RING_CAPACITY >= 2 * DefaultConfig::MAX_DATA_FRAME
);
const_assert!(DefaultConfig::RETRANSMIT_TIMEOUT_MS <= 20);
const_assert!(DefaultConfig::TFP_PAYLOAD_MIN <= DefaultConfig::TFP_PAYLOAD_MAX);
