//! MMIO-backed [`HardwareTransport`] for a SERCOM SPI slave paired with
//! a DMA controller driving the two-descriptor idle/one-shot chain
//! from §4.3.
//!
//! Register layouts follow the teacher's `register_bitfields!`/
//! `register_structs!` style (`spi/registers.rs`, `apb/dma/core.rs`),
//! narrowed down to exactly the fields `spitfp_enable_tx_dma`,
//! `spitfp_handle_spi_errors`, and the DMAC transfer-complete ISR touch
//! in the original bootloader sources. This module is the only place
//! in the crate that contains `unsafe` or touches real hardware state.

use tock_registers::{register_bitfields, register_structs, registers::*};

use crate::transport::SpiTfpTransport;

register_bitfields! {
    u8,

    /// Bitfields of the SERCOM SPI `INTFLAG` register.
    pub SPI_INTFLAG [
        /// Set when the peripheral has latched a framing/overflow
        /// error on the wire.
        ERROR OFFSET(7) NUMBITS(1) []
    ],

    /// Bitfields of the SERCOM SPI `CTRLA` register.
    pub SPI_CTRLA [
        /// Peripheral enable.
        ENABLE OFFSET(1) NUMBITS(1) []
    ],

    /// Bitfields of the SERCOM SPI `SYNCBUSY` register.
    pub SPI_SYNCBUSY [
        /// Set while an `ENABLE` write is being synchronized into the
        /// low-frequency clock domain.
        ENABLE OFFSET(1) NUMBITS(1) []
    ]
}

register_structs! {
    /// The subset of the SERCOM SPI register block this driver needs.
    #[allow(non_snake_case)]
    pub SpiRegisters {
        (0x00 => pub CTRLA: ReadWrite<u32, SPI_CTRLA::Register>),
        (0x04 => pub SYNCBUSY: ReadOnly<u32, SPI_SYNCBUSY::Register>),
        (0x08 => pub INTFLAG: ReadWrite<u8, SPI_INTFLAG::Register>),
        (0x09 => @END),
    }
}

register_structs! {
    /// One entry of the DMAC descriptor chain, matching
    /// `DmacDescriptor` from the original `dma.h`: next-pointer,
    /// source address, and beat count, nothing else this driver reads.
    #[allow(non_snake_case)]
    pub TransferDescriptor {
        (0x00 => pub BTCNT: ReadWrite<u16>),
        (0x02 => _reserved0: [ReadWrite<u8>; 2]),
        (0x04 => pub SRCADDR: ReadWrite<u32>),
        (0x08 => pub DESCADDR: ReadWrite<u32>),
        (0x0C => @END),
    }
}

register_structs! {
    /// Per-channel DMAC control registers this driver touches to arm
    /// and acknowledge the TX one-shot transfer.
    #[allow(non_snake_case)]
    pub DmacChannelRegisters {
        (0x00 => pub CHID: ReadWrite<u32>),
        (0x04 => pub CHINTFLAG: ReadWrite<u8>),
        (0x05 => pub CHINTENSET: ReadWrite<u8>),
        (0x06 => @END),
    }
}

/// The transfer-complete flag bit in `CHINTFLAG`/`CHINTENSET`.
const TCMPL: u8 = 1 << 1;

/// Drives a SERCOM SPI slave plus its DMAC TX/RX channel pair.
///
/// `rx_live_descriptor` is the DMAC's per-channel shadow descriptor for
/// the RX channel, whose `BTCNT` field live-counts down the beats
/// remaining in the current transfer — the register
/// `spitfp_update_ringbuffer_pointer` reads to derive `new_end`.
/// `rx_ring_capacity` is the capacity of the RX ring the DMAC was
/// programmed to fill.
pub struct HardwareTransport {
    spi: *const SpiRegisters,
    dmac_channel: *const DmacChannelRegisters,
    idle_descriptor: *const TransferDescriptor,
    oneshot_descriptor: *const TransferDescriptor,
    rx_live_descriptor: *const TransferDescriptor,
    /// Address of `idle_descriptor`, used to detect "handed back to
    /// idle" by comparing against `idle_descriptor.DESCADDR`.
    idle_descriptor_addr: u32,
    oneshot_descriptor_addr: u32,
    rx_ring_capacity: usize,
}

impl HardwareTransport {
    /// Wraps the given register blocks.
    ///
    /// # Safety
    /// The caller must ensure all five pointers reference the real,
    /// correctly mapped peripheral registers for the lifetime of this
    /// value, and that no other code concurrently accesses the same
    /// descriptors outside of `on_tx_complete`'s ISR context.
    pub const unsafe fn new(
        spi: *const SpiRegisters,
        dmac_channel: *const DmacChannelRegisters,
        idle_descriptor: *const TransferDescriptor,
        oneshot_descriptor: *const TransferDescriptor,
        rx_live_descriptor: *const TransferDescriptor,
        rx_ring_capacity: usize,
    ) -> Self {
        HardwareTransport {
            spi,
            dmac_channel,
            idle_descriptor,
            oneshot_descriptor,
            rx_live_descriptor,
            idle_descriptor_addr: idle_descriptor as u32,
            oneshot_descriptor_addr: oneshot_descriptor as u32,
            rx_ring_capacity,
        }
    }

    /// The DMAC RX channel's remaining-beats count, read from the
    /// hardware. Grounded on `spitfp_update_ringbuffer_pointer`, which
    /// derives `new_end` from this value.
    fn rx_remaining_beats(&self) -> usize {
        let live = unsafe { &*self.rx_live_descriptor };
        live.BTCNT.get() as usize
    }
}

impl SpiTfpTransport for HardwareTransport {
    fn rx_produced_index(&self) -> usize {
        let remaining = self.rx_remaining_beats();
        if remaining == self.rx_ring_capacity {
            self.rx_ring_capacity - 1
        } else {
            self.rx_ring_capacity - remaining - 1
        }
    }

    fn send_possible(&self) -> bool {
        let idle = unsafe { &*self.idle_descriptor };
        idle.DESCADDR.get() == self.idle_descriptor_addr
    }

    fn arm_send(&mut self, frame: &[u8]) {
        let oneshot = unsafe { &*self.oneshot_descriptor };
        oneshot.BTCNT.set(frame.len() as u16);
        oneshot.SRCADDR.set(frame.as_ptr() as u32 + frame.len() as u32);

        cortex_m::interrupt::free(|_| {
            let channel = unsafe { &*self.dmac_channel };
            channel.CHID.set(0);
            channel.CHINTFLAG.set(TCMPL);
            channel.CHINTENSET.set(TCMPL);

            let idle = unsafe { &*self.idle_descriptor };
            idle.DESCADDR.set(self.oneshot_descriptor_addr);
        });
    }

    fn on_tx_complete(&mut self) {
        let idle = unsafe { &*self.idle_descriptor };
        idle.DESCADDR.set(self.idle_descriptor_addr);

        let channel = unsafe { &*self.dmac_channel };
        channel.CHINTENSET.set(0);
    }

    fn handle_spi_errors(&mut self) -> bool {
        let spi = unsafe { &*self.spi };
        if !spi.INTFLAG.is_set(SPI_INTFLAG::ERROR) {
            return false;
        }

        spi.CTRLA.modify(SPI_CTRLA::ENABLE::CLEAR);
        while spi.SYNCBUSY.is_set(SPI_SYNCBUSY::ENABLE) {}
        spi.CTRLA.modify(SPI_CTRLA::ENABLE::SET);
        while spi.SYNCBUSY.is_set(SPI_SYNCBUSY::ENABLE) {}
        true
    }
}
