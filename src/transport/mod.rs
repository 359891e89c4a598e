//! The DMA bridge contract between the protocol core and the SPI
//! hardware.
//!
//! Split out as a trait so [`crate::link::Link`] can be driven by a
//! [`MockTransport`] in host-side tests without any real MMIO or DMAC
//! (the same separation the teacher keeps between `se::core`'s
//! polling logic and the raw `unsafe { &*self.registers }` access it
//! sits on top of).

#[cfg(feature = "hardware")]
pub mod hardware;
pub mod mock;

#[cfg(feature = "hardware")]
pub use hardware::HardwareTransport;
pub use mock::MockTransport;

/// Everything [`crate::link::Link`] needs from the SPI slave DMA
/// bridge, per §4.3.
pub trait SpiTfpTransport {
    /// The DMA's current write position in the receive ring's backing
    /// array, as an absolute index (not an offset). Derived from the
    /// DMA beat counter: `new_end = capacity - remaining - 1`, with
    /// `remaining == capacity` mapping to `capacity - 1`.
    fn rx_produced_index(&self) -> usize;

    /// Whether the TX descriptor chain has handed control back to the
    /// idle loop: `idle_loop.next == &idle_loop`. This is only the
    /// hardware half of the send-possible predicate — the logical
    /// half (`send_len == 0`) is tracked in [`crate::send::SendEngine`].
    fn send_possible(&self) -> bool;

    /// Arms `frame` for transmission: fills the one-shot descriptor's
    /// source pointer and byte count, then splices it into the idle
    /// loop. Implementors must perform the four-field critical
    /// section from §5 (interrupt mask around the descriptor-chain
    /// update) internally.
    fn arm_send(&mut self, frame: &[u8]);

    /// Called once the outstanding one-shot transfer completes
    /// (normally from the transfer-complete ISR). Restores the idle
    /// loop and disables the transfer-complete interrupt.
    fn on_tx_complete(&mut self);

    /// Services the SPI peripheral's ERROR flag, if set, by disabling
    /// and re-enabling the peripheral (§9 open question: the bounce
    /// variant is mandated). A no-op on transports that never observe
    /// spurious ERROR flags (e.g. [`MockTransport`]).
    fn handle_spi_errors(&mut self) -> bool {
        false
    }
}
