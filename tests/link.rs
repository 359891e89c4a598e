//! Integration tests driving `Link` end-to-end through `MockTransport`,
//! covering §8's six concrete scenarios.

use std::vec::Vec;

use spitfp::checksum::checksum as pearson;
use spitfp::clock::TestClock;
use spitfp::config::{Config, DefaultConfig};
use spitfp::transport::MockTransport;
use spitfp::upcall::{DownwardOps, MessageHandler};
use spitfp::{DefaultLink, Link};

type TestTransport = MockTransport<83>;
type TestLink = DefaultLink<TestTransport, TestClock>;

fn new_link() -> TestLink {
    Link::new(TestTransport::new(DefaultConfig::RECV_RING_CAPACITY), TestClock::new())
}

fn feed(link: &mut TestLink, bytes: &[u8]) {
    link.inject_rx_bytes(bytes);
    link.transport_mut().feed_rx(bytes.len());
}

fn ack_frame(last_seen: u8) -> [u8; 3] {
    let mut buf = [3u8, last_seen << 4, 0];
    buf[2] = pearson(&buf[..2]);
    buf
}

fn data_frame(seq: u8, last_seen: u8, payload: &[u8]) -> heapless_vec::Vec83 {
    let mut buf = heapless_vec::Vec83::new();
    buf.push((payload.len() + 3) as u8);
    buf.push(seq | (last_seen << 4));
    for &b in payload {
        buf.push(b);
    }
    let cksum = pearson(buf.as_slice());
    buf.push(cksum);
    buf
}

/// A tiny fixed-capacity byte vec, since these tests want a `Vec`-like
/// builder but the crate under test is `no_std` and these integration
/// tests should not reach for `std::vec::Vec` just to build 83-byte
/// frames.
mod heapless_vec {
    pub struct Vec83 {
        buf: [u8; 83],
        len: usize,
    }

    impl Vec83 {
        pub fn new() -> Self {
            Vec83 { buf: [0; 83], len: 0 }
        }

        pub fn push(&mut self, byte: u8) {
            self.buf[self.len] = byte;
            self.len += 1;
        }

        pub fn as_slice(&self) -> &[u8] {
            &self.buf[..self.len]
        }
    }
}

/// A `MessageHandler` test double that records every payload it
/// receives and optionally queues a canned response.
struct RecordingHandler {
    received: Vec<Vec<u8>>,
    respond_with: Option<Vec<u8>>,
}

impl RecordingHandler {
    fn new() -> Self {
        RecordingHandler { received: Vec::new(), respond_with: None }
    }

    fn respond_with(mut self, payload: &[u8]) -> Self {
        self.respond_with = Some(payload.to_vec());
        self
    }
}

impl MessageHandler for RecordingHandler {
    fn handle_message(&mut self, payload: &[u8], ctx: &mut dyn DownwardOps) {
        self.received.push(payload.to_vec());
        if let Some(resp) = self.respond_with.clone() {
            ctx.send_ack_and_message(&resp).expect("window must be open inside handle_message");
        }
    }

    fn uid(&self) -> u32 {
        0xDEAD_BEEF
    }

    fn device_identifier(&self) -> u16 {
        2100
    }
}

#[test]
fn scenario_1_bare_ack_wire_bytes() {
    // last_sequence_number_seen = 5; expect [0x03, 0x50, T[T[3] ^ 0x50]].
    let mut link = new_link();
    // Drive a DATA packet in first so last_sequence_number_seen becomes 5.
    let payload = [0u8; 8];
    feed(&mut link, data_frame(1, 0, &payload).as_slice());
    let mut handler = RecordingHandler::new();
    link.tick(&mut handler);
    assert_eq!(link.last_sequence_number_seen(), 1);

    // Directly exercise send_ack with a fabricated last_seen of 5 via
    // repeated accepted DATA frames up to seq 5 (low nibble space is
    // 1..=15, so use seq=5 directly since any valid DATA sets it).
    let mut link2 = new_link();
    feed(&mut link2, data_frame(5, 0, &[0u8; 8]).as_slice());
    let mut handler2 = RecordingHandler::new();
    link2.tick(&mut handler2);
    assert_eq!(link2.last_sequence_number_seen(), 5);

    link2.send_ack();
    let expected = ack_frame(5);
    assert_eq!(&link2.transport().sent[..link2.transport().sent_len], &expected);
}

#[test]
fn scenario_2_first_data_send() {
    let mut link = new_link();
    assert!(link.send_possible());
    let payload = [0xAAu8, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x11, 0x22];
    link.send_ack_and_message(&payload).unwrap();

    assert_eq!(link.current_sequence_number(), 1);
    assert!(!link.send_possible());

    let sent = link.transport().sent;
    let sent_len = link.transport().sent_len;
    assert_eq!(sent_len, 11);
    assert_eq!(sent[0], 11);
    assert_eq!(sent[1], 0x01);
    assert_eq!(&sent[2..10], &payload);
    assert_eq!(sent[10], pearson(&sent[..10]));
}

#[test]
fn scenario_3_ack_handling_opens_window() {
    let mut link = new_link();
    link.send_ack_and_message(&[0u8; 8]).unwrap();
    assert_eq!(link.current_sequence_number(), 1);
    assert!(!link.send_possible());

    // Feed the ack while the transport is still mid-transfer (as it is
    // right after arming): with `RETRANSMIT_TIMEOUT_MS == 0`, completing
    // the transfer first would make this same tick's retransmit check
    // fire before the ack is even parsed, re-arming the transport and
    // leaving it busy again. Only once the ack has cleared the logical
    // half does completing the transfer actually open the window.
    feed(&mut link, &ack_frame(1));
    let mut handler = RecordingHandler::new();
    let report = link.tick(&mut handler);
    link.transport_mut().complete_send();

    assert!(link.send_possible());
    assert_eq!(report.messages_dispatched, 0);
    assert!(handler.received.is_empty());
}

#[test]
fn scenario_4_duplicate_data_dispatches_handler_once() {
    let mut link = new_link();
    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let frame = data_frame(7, 0, &payload);

    let mut handler = RecordingHandler::new();
    feed(&mut link, frame.as_slice());
    link.tick(&mut handler);
    assert_eq!(handler.received.len(), 1);
    assert_eq!(link.last_sequence_number_seen(), 7);

    // Re-arm the transport so the window looks open for the retry,
    // mirroring the master retransmitting after a lost ACK.
    link.transport_mut().complete_send();
    feed(&mut link, frame.as_slice());
    link.tick(&mut handler);

    assert_eq!(handler.received.len(), 1, "handler must not be invoked twice for a duplicate");
    assert_eq!(link.last_sequence_number_seen(), 7);
}

#[test]
fn scenario_5_desync_on_illegal_length() {
    let mut link = new_link();
    feed(&mut link, &[0x05, 0x00, 0x00, 0x00, 0x00]);
    let mut handler = RecordingHandler::new();
    let report = link.tick(&mut handler);

    assert_eq!(report.protocol_errors, 1);
    assert!(handler.received.is_empty());
}

#[test]
fn scenario_6_checksum_corruption_is_dropped() {
    let mut link = new_link();
    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let frame = data_frame(3, 0, &payload);
    let mut bytes = [0u8; 83];
    let len = frame.as_slice().len();
    bytes[..len].copy_from_slice(frame.as_slice());
    bytes[len - 1] ^= 1;

    feed(&mut link, &bytes[..len]);
    let mut handler = RecordingHandler::new();
    let report = link.tick(&mut handler);

    assert_eq!(report.protocol_errors, 1);
    assert!(handler.received.is_empty());
}

#[test]
fn handler_response_is_piggybacked_as_ack_and_message() {
    let mut link = new_link();
    let payload = [9u8; 8];
    feed(&mut link, data_frame(1, 0, &payload).as_slice());

    let mut handler = RecordingHandler::new().respond_with(&[1, 2, 3]);
    link.tick(&mut handler);

    assert_eq!(handler.received.len(), 1);
    assert!(!link.send_possible(), "handler's response should occupy the send window");
    let sent = link.transport().sent;
    let sent_len = link.transport().sent_len;
    assert_eq!(sent_len, 3 + 3);
    assert_eq!(&sent[2..5], &[1, 2, 3]);
}

#[test]
fn handler_declining_to_respond_gets_a_synthesized_bare_ack() {
    let mut link = new_link();
    let payload = [9u8; 8];
    feed(&mut link, data_frame(4, 0, &payload).as_slice());

    let mut handler = RecordingHandler::new();
    link.tick(&mut handler);

    assert_eq!(handler.received.len(), 1);
    let sent = link.transport().sent;
    let sent_len = link.transport().sent_len;
    assert_eq!(sent_len, 3);
    assert_eq!(sent[0], 3);
    assert_eq!(sent[1] >> 4, 4);
}

#[test]
fn window_busy_defers_data_frame_to_next_tick() {
    let mut link = new_link();

    // Put a bare ACK in flight so the combined send-possible predicate
    // is closed purely on the transport (hardware) half.
    link.send_ack();
    assert!(!link.send_possible());

    let payload = [5u8; 8];
    feed(&mut link, data_frame(2, 0, &payload).as_slice());
    let mut handler = RecordingHandler::new();
    let report = link.tick(&mut handler);

    assert!(report.send_window_busy);
    assert!(handler.received.is_empty(), "frame must be left for a later tick");

    // The transport reports the bare ACK's one-shot transfer done. A
    // bare ACK's slot frees on that alone — no peer echo needed, unlike
    // an outstanding DATA packet (see `SendEngine::clear_ack_once_transmitted`).
    link.transport_mut().complete_send();
    link.tick(&mut handler);

    assert_eq!(handler.received.len(), 1, "the deferred frame dispatches once the window reopens");
}

#[test]
fn retransmission_reuses_identical_bytes() {
    let mut link = new_link();
    link.send_ack_and_message(&[7, 8, 9]).unwrap();
    let first = {
        let sent = link.transport().sent;
        let len = link.transport().sent_len;
        let mut out = [0u8; 83];
        out[..len].copy_from_slice(&sent[..len]);
        (out, len)
    };

    link.transport_mut().complete_send();
    let report = link.tick(&mut RecordingHandler::new());
    assert!(report.retransmitted);

    let second = {
        let sent = link.transport().sent;
        let len = link.transport().sent_len;
        (sent, len)
    };
    assert_eq!(first.1, second.1);
    assert_eq!(&first.0[..first.1], &second.0[..second.1]);
}
