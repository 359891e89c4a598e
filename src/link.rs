//! The link controller: owns the receive ring, framer, send engine,
//! and transport for one SPITFP link, and implements the tick loop's
//! order of operations from §4.6.
//!
//! Grounded on `spitfp_tick`'s top-level structure in the original
//! bootloader sources (service externals, handle SPI errors, check the
//! send timeout, update the ring producer, run the framer, force the
//! framer back to `START`). Where the original returns `void`, this
//! implementation returns a small [`TickReport`] for diagnostics and
//! tests — the same choice the teacher makes in `se::core::prepare_operation`/
//! `complete_operation`, which return a typed `Result` from what were
//! `void`, side-effect-only C routines.

use core::marker::PhantomData;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::SendError;
use crate::framer::{Framer, FramerState, StepOutcome};
use crate::ringbuffer::RingBuffer;
use crate::send::SendEngine;
use crate::trace::{Trace, TraceRing};
use crate::transport::SpiTfpTransport;
use crate::upcall::{DownwardOps, MessageHandler};

/// Diagnostic summary of one [`Link::tick`] call. Not part of the wire
/// or upcall contract (§6): purely for tests and integrator telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Bytes retired from the receive ring this tick (consumed into a
    /// completed frame, or discarded at `START`).
    pub bytes_consumed: usize,
    /// Number of DATA packets newly dispatched to [`MessageHandler::handle_message`].
    pub messages_dispatched: u32,
    /// Number of protocol errors encountered (and recovered from) this
    /// tick.
    pub protocol_errors: u32,
    /// Whether a validated frame was left in the ring because the send
    /// window was busy.
    pub send_window_busy: bool,
    /// Whether the outstanding packet was retransmitted this tick.
    pub retransmitted: bool,
    /// Whether the SPI peripheral's ERROR flag was observed and
    /// bounced this tick.
    pub spi_error_bounced: bool,
}

/// One SPITFP link.
///
/// `RING` is the receive ring capacity, `MAX_FRAME` the largest framed
/// DATA packet (`Cfg::MAX_DATA_FRAME`), `MAX_PAYLOAD` the largest TFP
/// payload (`Cfg::TFP_PAYLOAD_MAX`), and `TRACE_CAP` the depth of the
/// observability ring (§2 ambient stack). These can't be derived from
/// `Cfg`'s associated consts on stable Rust (no `generic_const_exprs`),
/// so [`Link::new`] asserts them consistent in debug builds — the same
/// workaround [`crate::send::SendEngine`] and [`crate::framer::Framer`]
/// already take individually.
pub struct Link<
    T,
    Clk,
    Cfg,
    const RING: usize,
    const MAX_FRAME: usize,
    const MAX_PAYLOAD: usize,
    const TRACE_CAP: usize,
> where
    T: SpiTfpTransport,
    Clk: Clock,
    Cfg: Config,
{
    ring: RingBuffer<RING>,
    framer: Framer<MAX_PAYLOAD>,
    send: SendEngine<MAX_FRAME>,
    transport: T,
    clock: Clk,
    trace: TraceRing<TRACE_CAP>,
    _cfg: PhantomData<Cfg>,
}

impl<T, Clk, Cfg, const RING: usize, const MAX_FRAME: usize, const MAX_PAYLOAD: usize, const TRACE_CAP: usize>
    Link<T, Clk, Cfg, RING, MAX_FRAME, MAX_PAYLOAD, TRACE_CAP>
where
    T: SpiTfpTransport,
    Clk: Clock,
    Cfg: Config,
{
    /// Creates a link over the given transport and clock, with an
    /// empty ring, a fresh framer, and no outstanding send.
    pub fn new(transport: T, clock: Clk) -> Self {
        debug_assert_eq!(RING, Cfg::RECV_RING_CAPACITY, "RING must match Cfg::RECV_RING_CAPACITY");
        debug_assert_eq!(MAX_FRAME, Cfg::MAX_DATA_FRAME, "MAX_FRAME must match Cfg::MAX_DATA_FRAME");
        debug_assert_eq!(MAX_PAYLOAD, Cfg::TFP_PAYLOAD_MAX, "MAX_PAYLOAD must match Cfg::TFP_PAYLOAD_MAX");

        let mut trace = TraceRing::new();
        trace.push(Trace::Init);

        Link {
            ring: RingBuffer::new(),
            framer: Framer::new(),
            send: SendEngine::new(),
            transport,
            clock,
            trace,
            _cfg: PhantomData,
        }
    }

    /// The trace ring recording this link's observable history (§2
    /// ambient stack), for an integrator to drain however it logs.
    pub fn trace(&self) -> &TraceRing<TRACE_CAP> {
        &self.trace
    }

    /// Shared access to the transport, e.g. for a test to drive a
    /// [`crate::transport::MockTransport`] directly.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport, e.g. for a test to feed RX
    /// bytes or inject an SPI error via
    /// [`crate::transport::MockTransport`].
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Writes `bytes` directly into the receive ring's backing array,
    /// as the RX DMA would. On real hardware this never runs — the DMA
    /// writes the backing array's memory directly and the link only
    /// ever learns about it through [`SpiTfpTransport::rx_produced_index`].
    /// For [`crate::transport::MockTransport`]-driven tests there is no
    /// real DMA, so this plus a matching `transport_mut().feed_rx(n)`
    /// call simulates one.
    pub fn inject_rx_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.ring.push(b);
        }
    }

    /// Current outbound sequence number (`current_sequence_number`,
    /// §3), for tests and diagnostics.
    pub fn current_sequence_number(&self) -> u8 {
        self.send.current_sequence_number()
    }

    /// Last DATA sequence number accepted from the peer
    /// (`last_sequence_number_seen`, §3), for tests and diagnostics.
    pub fn last_sequence_number_seen(&self) -> u8 {
        self.send.last_sequence_number_seen()
    }

    /// The receive framer's current state (§8 P1: must be `Start` at
    /// every tick exit). For tests and diagnostics only — nothing in
    /// `Link` reads this back.
    pub fn framer_state(&self) -> FramerState {
        self.framer.state()
    }

    /// Whether the one-packet send window is open (§4.5): both the
    /// logical half (`send_len == 0`, tracked in `SendEngine`) and the
    /// hardware handoff half (`idle_loop.next == &idle_loop`, tracked
    /// in the transport) must hold, per §4.3's `spitfp_is_send_possible`.
    ///
    /// The logical half frees differently depending on what's
    /// outstanding: a DATA packet only once the peer's sequence echo
    /// matches (`apply_ack`), a bare ACK as soon as the transport
    /// reports the handoff done (`SendEngine::clear_ack_once_transmitted`,
    /// checked once per `tick`) — otherwise an ACK-only link, whose
    /// `current_sequence_number` never advances, could never see a
    /// matching echo and would wedge its own window shut forever.
    pub fn send_possible(&self) -> bool {
        self.send.send_possible() && self.transport.send_possible()
    }

    /// Frames and arms a DATA packet from outside the upcall path
    /// (e.g. the upper layer pushing an unsolicited message). Shares
    /// the exact framing [`DownwardOps::send_ack_and_message`] uses.
    pub fn send_ack_and_message(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.dispatch_ack_and_message(payload)
    }

    /// Frames and arms a bare ACK from outside the upcall path.
    pub fn send_ack(&mut self) {
        self.dispatch_ack();
    }

    /// Runs one tick: services the SPI error flag, retransmits the
    /// outstanding packet if due, republishes the ring producer
    /// position, and drains every currently-buffered byte through the
    /// framer, dispatching to `handler` as DATA packets complete.
    ///
    /// Implements §4.6's order of operations exactly; forces the
    /// framer back to `START` at exit regardless of how the loop below
    /// terminated (§8 P1).
    pub fn tick<H: MessageHandler>(&mut self, handler: &mut H) -> TickReport {
        let mut report = TickReport::default();

        if self.transport.handle_spi_errors() {
            report.spi_error_bounced = true;
            self.trace.push(Trace::SpiErrorBounce);
        }

        // A bare ACK isn't itself acknowledged, so its slot in the
        // single-outstanding-frame window frees as soon as the
        // transport hands it off, not when a sequence echo matches.
        self.send.clear_ack_once_transmitted(self.transport.send_possible());

        let now = self.clock.now_ms();
        if self.send.needs_retransmit::<Cfg>(now) && self.transport.send_possible() {
            self.transport.arm_send(self.send.frame());
            self.send.mark_armed(now);
            report.retransmitted = true;
            self.trace.push(Trace::Retransmitted);
        }

        self.ring.set_end(self.transport.rx_produced_index());

        self.run_framer(handler, &mut report);

        self.framer.reset();
        report
    }

    /// Drives the framer over every byte currently buffered.
    ///
    /// `offset` is a read cursor into the unread region that is *not*
    /// retired from the ring until a frame fully commits — mirroring
    /// `spitfp_tick`'s local `num_to_remove_from_ringbuffer` accumulator,
    /// which the original only feeds into `ringbuffer_remove` once per
    /// completed (and, for DATA, send-possible) frame. `peek_at` always
    /// reads relative to the ring's current `start`, so advancing the
    /// ring itself on every `Continue` — rather than just the cursor —
    /// would permanently drop a DATA frame's bytes before the
    /// send-possible gate had a chance to defer them to the next tick.
    fn run_framer<H: MessageHandler>(&mut self, handler: &mut H, report: &mut TickReport) {
        let mut offset = 0usize;

        while offset < self.ring.used() {
            let byte = self.ring.peek_at(offset);
            let outcome = self.framer.step(byte, Cfg::MIN_DATA_FRAME as u8, Cfg::MAX_DATA_FRAME as u8);
            offset += 1;

            match outcome {
                StepOutcome::Continue => {}
                StepOutcome::Discarded => {
                    self.ring.advance(offset);
                    report.bytes_consumed += offset;
                    offset = 0;
                }
                StepOutcome::Error(e) => {
                    let drained = self.ring.used();
                    self.ring.drain_all();
                    report.bytes_consumed += drained;
                    report.protocol_errors += 1;
                    self.trace.push(Trace::ProtocolError(e));
                    offset = 0;
                }
                StepOutcome::Ack { last_seen_by_peer } => {
                    self.ring.advance(offset);
                    report.bytes_consumed += offset;
                    offset = 0;
                    self.apply_ack(last_seen_by_peer);
                }
                StepOutcome::Data { last_seen_by_peer, message_sequence_number, .. } => {
                    // The high-nibble ACK-of-our-DATA check runs
                    // unconditionally, before the send-possible gate —
                    // `spitfp_tick`'s MESSAGE_CHECKSUM case clears
                    // `buffer_send_length` first and only then
                    // evaluates `spitfp_is_send_possible`, so a DATA
                    // frame's piggybacked ACK can be the very thing
                    // that frees the window in this same tick.
                    self.apply_ack(last_seen_by_peer);

                    if !self.send_possible() {
                        // Leave the whole frame in the ring untouched;
                        // the next tick re-parses it from scratch (§4.4
                        // MSG_CKSUM / NOT send_possible()).
                        report.send_window_busy = true;
                        self.trace.push(Trace::SendWindowBusy);
                        break;
                    }

                    self.ring.advance(offset);
                    report.bytes_consumed += offset;
                    offset = 0;

                    if message_sequence_number != self.send.last_sequence_number_seen() {
                        self.send.note_seen(message_sequence_number);
                        self.trace.push(Trace::DataAccepted(message_sequence_number));
                        report.messages_dispatched += 1;
                        self.dispatch_message(handler);
                    } else {
                        self.trace.push(Trace::DataDuplicate(message_sequence_number));
                        self.dispatch_ack();
                    }
                }
            }
        }
    }

    /// Opens the send window if `last_seen_by_peer` (the peer's echo
    /// of our last-sent sequence number, carried in both ACK and DATA
    /// frames) matches the sequence number of our outstanding DATA
    /// packet. Any other value is a stray or unrelated ACK and is
    /// silently ignored (§4.4).
    fn apply_ack(&mut self, last_seen_by_peer: u8) {
        if last_seen_by_peer == self.send.current_sequence_number() {
            self.send.clear_outstanding();
            self.trace.push(Trace::AckAccepted(last_seen_by_peer));
        } else {
            self.trace.push(Trace::AckIgnored);
        }
    }

    fn dispatch_message<H: MessageHandler>(&mut self, handler: &mut H) {
        let Link { framer, send, transport, clock, trace, .. } = self;
        let payload = framer.payload();
        let mut ops: LinkDownwardOps<'_, T, Clk, Cfg, MAX_FRAME, TRACE_CAP> =
            LinkDownwardOps { send, transport, clock, trace, _cfg: PhantomData };
        handler.handle_message(payload, &mut ops);

        // §6: if the handler returned without queuing a response, the
        // link synthesizes the bare ACK on its behalf.
        if self.send.send_possible() {
            self.dispatch_ack();
        }
    }

    fn dispatch_ack(&mut self) {
        self.send.prepare_ack();
        let now = self.clock.now_ms();
        self.transport.arm_send(self.send.frame());
        self.send.mark_armed(now);
        self.trace.push(Trace::Armed(0));
    }

    fn dispatch_ack_and_message(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.send.prepare_ack_and_message::<Cfg>(payload)?;
        let now = self.clock.now_ms();
        self.transport.arm_send(self.send.frame());
        self.send.mark_armed(now);
        self.trace.push(Trace::Armed(self.send.current_sequence_number()));
        Ok(())
    }
}

/// The [`DownwardOps`] implementation handed to [`MessageHandler::handle_message`],
/// borrowing only the fields of [`Link`] it needs so the payload slice
/// (borrowed from the framer) and the send path can coexist.
struct LinkDownwardOps<'a, T, Clk, Cfg, const MAX_FRAME: usize, const TRACE_CAP: usize>
where
    T: SpiTfpTransport,
    Clk: Clock,
    Cfg: Config,
{
    send: &'a mut SendEngine<MAX_FRAME>,
    transport: &'a mut T,
    clock: &'a Clk,
    trace: &'a mut TraceRing<TRACE_CAP>,
    _cfg: PhantomData<Cfg>,
}

impl<'a, T, Clk, Cfg, const MAX_FRAME: usize, const TRACE_CAP: usize> DownwardOps
    for LinkDownwardOps<'a, T, Clk, Cfg, MAX_FRAME, TRACE_CAP>
where
    T: SpiTfpTransport,
    Clk: Clock,
    Cfg: Config,
{
    fn send_ack_and_message(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.send.prepare_ack_and_message::<Cfg>(payload)?;
        self.transport.arm_send(self.send.frame());
        self.send.mark_armed(self.clock.now_ms());
        self.trace.push(Trace::Armed(self.send.current_sequence_number()));
        Ok(())
    }

    fn send_ack(&mut self) {
        self.send.prepare_ack();
        self.transport.arm_send(self.send.frame());
        self.send.mark_armed(self.clock.now_ms());
        self.trace.push(Trace::Armed(0));
    }

    fn send_possible(&self) -> bool {
        self.send.send_possible() && self.transport.send_possible()
    }
}
