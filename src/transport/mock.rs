//! A host-testable [`SpiTfpTransport`] backed by plain fields instead
//! of MMIO, so the protocol core can be exercised without real
//! hardware.

use crate::transport::SpiTfpTransport;

/// A software stand-in for the SPI/DMAC bridge.
///
/// Bytes are injected into the RX side with [`MockTransport::feed_rx`]
/// (which advances `rx_produced_index` as if the DMA had written them)
/// and sent frames are captured in `sent` for assertions.
pub struct MockTransport<const MAX_FRAME: usize> {
    rx_produced_index: usize,
    rx_capacity: usize,
    window_open: bool,
    /// The most recent frame handed to [`SpiTfpTransport::arm_send`].
    pub sent: [u8; MAX_FRAME],
    pub sent_len: usize,
    /// Total number of frames armed over this transport's lifetime.
    pub send_count: u32,
    spi_error_pending: bool,
}

impl<const MAX_FRAME: usize> MockTransport<MAX_FRAME> {
    /// Creates a mock transport over an RX ring of `rx_capacity` bytes.
    pub const fn new(rx_capacity: usize) -> Self {
        MockTransport {
            rx_produced_index: 0,
            rx_capacity,
            window_open: true,
            sent: [0; MAX_FRAME],
            sent_len: 0,
            send_count: 0,
            spi_error_pending: false,
        }
    }

    /// Advances the simulated DMA write position by `n` bytes, as if
    /// the peer had just clocked in `n` more bytes. Wraps at
    /// `rx_capacity` like the real beat counter does.
    pub fn feed_rx(&mut self, n: usize) {
        self.rx_produced_index = (self.rx_produced_index + n) % self.rx_capacity;
    }

    /// Simulates the TX DMA finishing the outstanding one-shot
    /// transfer, as the real TCMPL ISR would report.
    pub fn complete_send(&mut self) {
        self.on_tx_complete();
    }

    /// Arranges for the next [`SpiTfpTransport::handle_spi_errors`]
    /// call to report (and clear) a pending SPI error.
    pub fn inject_spi_error(&mut self) {
        self.spi_error_pending = true;
    }
}

impl<const MAX_FRAME: usize> SpiTfpTransport for MockTransport<MAX_FRAME> {
    fn rx_produced_index(&self) -> usize {
        self.rx_produced_index
    }

    fn send_possible(&self) -> bool {
        self.window_open
    }

    fn arm_send(&mut self, frame: &[u8]) {
        self.sent[..frame.len()].copy_from_slice(frame);
        self.sent_len = frame.len();
        self.send_count += 1;
        self.window_open = false;
    }

    fn on_tx_complete(&mut self) {
        self.window_open = true;
    }

    fn handle_spi_errors(&mut self) -> bool {
        if self.spi_error_pending {
            self.spi_error_pending = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_rx_wraps_at_capacity() {
        let mut t: MockTransport<16> = MockTransport::new(8);
        t.feed_rx(5);
        assert_eq!(t.rx_produced_index(), 5);
        t.feed_rx(5);
        assert_eq!(t.rx_produced_index(), 2);
    }

    #[test]
    fn arm_send_closes_window_until_complete() {
        let mut t: MockTransport<16> = MockTransport::new(8);
        assert!(t.send_possible());
        t.arm_send(&[1, 2, 3]);
        assert!(!t.send_possible());
        assert_eq!(&t.sent[..t.sent_len], &[1, 2, 3]);
        t.complete_send();
        assert!(t.send_possible());
    }

    #[test]
    fn spi_error_reported_once() {
        let mut t: MockTransport<16> = MockTransport::new(8);
        assert!(!t.handle_spi_errors());
        t.inject_spi_error();
        assert!(t.handle_spi_errors());
        assert!(!t.handle_spi_errors());
    }
}
