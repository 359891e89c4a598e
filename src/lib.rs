//! SPITFP: a reliable, framed, sequence-numbered transport that layers
//! Tinkerforge Protocol (TFP) request/response messages over a raw SPI
//! link between a bus master and a peripheral co-processor.
//!
//! This crate implements the slave side of the link: the receive
//! framer (§4.4), the send engine (§4.5), and the sequence/ACK
//! protocol that ties them together (§3, §4.6). SPI peripheral
//! bring-up, the upper-layer TFP message dispatcher, and NVM/firmware
//! handling are explicitly out of scope (§1) and are modeled here as
//! the [`transport::SpiTfpTransport`] and [`upcall::MessageHandler`]
//! traits an integrator implements.
//!
//! # Layout
//!
//! - [`checksum`]: Pearson-8 corruption check (§4.1).
//! - [`ringbuffer`]: the single-producer/single-consumer byte FIFO the
//!   RX DMA publishes into (§4.2).
//! - [`transport`]: the DMA bridge contract (§4.3), with a
//!   register-backed [`transport::HardwareTransport`] and a
//!   [`transport::MockTransport`] test double.
//! - [`framer`]: the receive Mealy machine (§4.4).
//! - [`send`]: the send engine and one-packet window (§4.5).
//! - [`link`]: the tick loop tying everything together (§4.6), plus
//!   the [`upcall::MessageHandler`]/[`upcall::DownwardOps`]/[`clock::Clock`]
//!   traits an integration implements or supplies.
//! - [`config`]: the compile-time configuration surface (§6).
//! - [`error`]: the error taxonomy (§7).
//! - [`trace`]: a fixed-capacity event ring used in place of a logging
//!   crate, appropriate for a `no_std` bootloader-sized binary.
#![no_std]

pub mod checksum;
pub mod clock;
pub mod config;
pub mod error;
pub mod framer;
pub mod link;
pub mod ringbuffer;
pub mod send;
pub mod trace;
pub mod transport;
pub mod upcall;

pub use clock::Clock;
pub use config::{Config, DefaultConfig};
pub use error::{ProtocolError, SendError};
pub use link::{Link, TickReport};
pub use upcall::{DownwardOps, MessageHandler};

/// A [`Link`] instantiated with [`DefaultConfig`]'s buffer sizes: a
/// 1024-byte receive ring, an 83-byte max frame, an 80-byte max
/// payload, and a 32-entry trace ring. Most integrators want this
/// alias rather than spelling out `Link`'s six type/const parameters.
pub type DefaultLink<T, Clk> = Link<T, Clk, DefaultConfig, 1024, 83, 80, 32>;
