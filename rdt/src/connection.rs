//! Per-connection state machine.
//!
//! A [`Connection`] owns everything needed for one accepted flow:
//! - sequence numbers for both directions (`seq_no` outbound, `ack_no` inbound),
//! - the retransmission queue of sent-but-unacknowledged segments,
//! - the single retransmission timer bound to the head of that queue,
//! - RTT statistics ([`crate::rtt`]) and the congestion window
//!   ([`crate::congestion`]),
//! - the application's receive callback.
//!
//! Connections are created only by the
//! [`Demultiplexer`](crate::demux::Demultiplexer) when a SYN arrives, and
//! inbound segments reach them only through it.
//!
//! # Receive path
//!
//! Only the segment whose sequence number equals `ack_no` is processed;
//! anything else is dropped and recovery is left to the peer's timer.  An
//! accepted segment is handled as exactly one of, in this priority:
//!
//! | Segment          | Effect                                               |
//! |------------------|------------------------------------------------------|
//! | FIN              | ACK it, report an empty payload                      |
//! | ACK, no payload  | sample RTT, pop the queue head, grow the window      |
//! | anything else    | ACK it, report the payload                           |
//!
//! # Send path
//!
//! [`Connection::send`] cuts the data into MSS-sized segments, transmits each
//! one immediately and appends it to the retransmission queue.  On timeout
//! only the queue head is retransmitted, and its send timestamp is cleared so
//! that its eventual ACK yields no RTT sample (Karn's algorithm).

use std::collections::VecDeque;
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::Config;
use crate::congestion::Window;
use crate::error::Discard;
use crate::network::Network;
use crate::rtt::RttEstimator;
use crate::segment::{fix_checksum, flags, make_header, MAX_MSS};
use crate::state::ConnectionState;
use crate::timer::{TimerHandle, Timers};

/// The 4-tuple identifying a connection, seen from the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub peer_addr: Ipv4Addr,
    pub peer_port: u16,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.peer_addr, self.peer_port, self.local_addr, self.local_port
        )
    }
}

/// Application handler for inbound data.
///
/// An empty payload signals that the stream ended: either the peer sent FIN or
/// the connection was closed locally.
pub type ReceiveCallback = Box<dyn FnMut(&mut Connection, &[u8])>;

/// A transmitted segment awaiting acknowledgement.
#[derive(Debug, Clone)]
struct Unacked {
    /// Exact bytes put on the wire, checksum included.
    segment: Vec<u8>,
    dest: Ipv4Addr,
    /// `None` once the segment has been retransmitted.
    sent_at: Option<Instant>,
}

/// One accepted RDT connection.
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,

    /// Next sequence number this side will send.
    seq_no: u32,
    /// Next sequence number expected from the peer.
    ack_no: u32,

    unacked: VecDeque<Unacked>,
    /// The one live retransmission timer; `Some` iff `unacked` is non-empty.
    timer: Option<TimerHandle>,
    rtt: RttEstimator,
    window: Window,

    /// Outbound bytes not yet cut into segments.
    pending_output: Vec<u8>,
    mss: usize,

    on_receive: Option<ReceiveCallback>,
    network: Rc<dyn Network>,
    timers: Rc<dyn Timers>,
}

impl Connection {
    /// State for a connection whose SYN carried `peer_seq`, answering with
    /// initial sequence number `isn`.
    pub(crate) fn new(
        id: ConnectionId,
        peer_seq: u32,
        isn: u32,
        config: &Config,
        network: Rc<dyn Network>,
        timers: Rc<dyn Timers>,
    ) -> Self {
        Self {
            id,
            state: ConnectionState::Open,
            seq_no: isn,
            ack_no: peer_seq.wrapping_add(1),
            unacked: VecDeque::new(),
            timer: None,
            rtt: RttEstimator::new(config.initial_timeout),
            window: Window::new(config.initial_window),
            pending_output: Vec::new(),
            mss: config.mss.clamp(1, MAX_MSS),
            on_receive: None,
            network,
            timers,
        }
    }

    // -----------------------------------------------------------------------
    // Application API
    // -----------------------------------------------------------------------

    /// Install the handler invoked for every delivered payload.
    pub fn register_receiver<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Connection, &[u8]) + 'static,
    {
        self.on_receive = Some(Box::new(callback));
    }

    /// Queue `data` for reliable delivery.
    ///
    /// Every MSS-sized chunk is transmitted right away; the congestion window
    /// is tracked but does not hold segments back.
    pub fn send(&mut self, data: &[u8]) {
        if self.state == ConnectionState::Closed {
            log::warn!("[conn] {} send of {} bytes on closed connection", self.id, data.len());
            return;
        }
        self.pending_output.extend_from_slice(data);

        while !self.pending_output.is_empty() {
            let n = self.pending_output.len().min(self.mss);
            let chunk: Vec<u8> = self.pending_output.drain(..n).collect();

            let segment = self.build(flags::ACK, &chunk);
            self.network.send(segment.clone(), self.id.peer_addr);
            log::trace!("[conn] {} → DATA seq={} len={}", self.id, self.seq_no, n);

            self.seq_no = self.seq_no.wrapping_add(n as u32);
            self.unacked.push_back(Unacked {
                segment,
                dest: self.id.peer_addr,
                sent_at: Some(Instant::now()),
            });
            self.window.on_send();
            if self.timer.is_none() {
                self.arm_timer();
            }
        }
    }

    /// Send FIN and close without waiting for the peer.
    ///
    /// The receive callback sees an empty payload, and the demultiplexer drops
    /// the connection afterwards.  Closing twice is a no-op.
    ///
    /// When called from inside the receive callback itself (the usual reply
    /// to a peer FIN), that callback is not re-entered: it is already
    /// handling the end of the stream.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.transmit(flags::FIN);
        self.cancel_timer();
        self.state = ConnectionState::Closed;
        log::debug!("[conn] {} → FIN seq={} ack={}; closed", self.id, self.seq_no, self.ack_no);
        self.deliver(&[]);
    }

    // -----------------------------------------------------------------------
    // Network-facing entry points
    // -----------------------------------------------------------------------

    /// Process one inbound segment already matched to this connection.
    pub fn on_segment(
        &mut self,
        seq: u32,
        ack: u32,
        flag_bits: u16,
        payload: &[u8],
    ) -> Result<(), Discard> {
        if self.state == ConnectionState::Closed {
            return Err(Discard::UnknownConnection(self.id));
        }
        if seq != self.ack_no {
            return Err(Discard::OutOfSequence {
                expected: self.ack_no,
                got: seq,
            });
        }

        if flag_bits & flags::FIN == flags::FIN {
            self.ack_no = seq.wrapping_add(1);
            self.seq_no = ack;
            self.transmit(flags::ACK);
            log::debug!("[conn] {} ← FIN; → ACK ack={}", self.id, self.ack_no);
            self.deliver(&[]);
            return Ok(());
        }

        if flag_bits & flags::ACK == flags::ACK && payload.is_empty() {
            self.ack_no = seq;
            self.seq_no = ack;
            self.on_ack();
            return Ok(());
        }

        self.ack_no = seq.wrapping_add(payload.len() as u32);
        self.seq_no = ack;
        self.transmit(flags::ACK);
        log::trace!("[conn] {} ← DATA len={}; → ACK ack={}", self.id, payload.len(), self.ack_no);
        self.deliver(payload);
        Ok(())
    }

    /// Retransmission timeout: resend the queue head and halve the window.
    ///
    /// The caller is responsible for only invoking this for the handle
    /// returned by [`armed_timer`](Self::armed_timer).
    pub fn timeout(&mut self) {
        // The expiry being handled is spent either way.
        self.cancel_timer();
        if self.unacked.is_empty() {
            return;
        }

        self.window.on_timeout();
        let (segment, dest) = match self.unacked.front_mut() {
            Some(head) => {
                head.sent_at = None;
                (head.segment.clone(), head.dest)
            }
            None => return,
        };
        self.network.send(segment, dest);
        log::debug!(
            "[conn] {} timeout; retransmitting head, cwnd={} rto={:?}",
            self.id,
            self.window.get(),
            self.rtt.timeout()
        );
        self.arm_timer();
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Next outbound sequence number.
    pub fn seq_no(&self) -> u32 {
        self.seq_no
    }

    /// Next sequence number expected from the peer.
    pub fn ack_no(&self) -> u32 {
        self.ack_no
    }

    /// Segments transmitted and not yet acknowledged.
    pub fn unacked_len(&self) -> usize {
        self.unacked.len()
    }

    /// Bytes of the oldest unacknowledged segment, as sent.
    pub fn unacked_head(&self) -> Option<&[u8]> {
        self.unacked.front().map(|e| e.segment.as_slice())
    }

    pub fn congestion_window(&self) -> u32 {
        self.window.get()
    }

    pub fn window_occupancy(&self) -> u32 {
        self.window.occupancy()
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Current retransmission timeout.
    pub fn timeout_interval(&self) -> Duration {
        self.rtt.timeout()
    }

    /// Handle of the live retransmission timer, if any.
    pub fn armed_timer(&self) -> Option<TimerHandle> {
        self.timer
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Transmit a payload-less segment with the current seq/ack numbers.
    pub(crate) fn transmit(&self, flag_bits: u16) {
        self.network.send(self.build(flag_bits, &[]), self.id.peer_addr);
    }

    fn build(&self, flag_bits: u16, payload: &[u8]) -> Vec<u8> {
        let mut segment = make_header(
            self.id.local_port,
            self.id.peer_port,
            self.seq_no,
            self.ack_no,
            flag_bits,
        );
        segment.extend_from_slice(payload);
        fix_checksum(&segment, self.id.local_addr, self.id.peer_addr)
    }

    fn on_ack(&mut self) {
        let sent_at = match self.unacked.front() {
            Some(head) => head.sent_at,
            None => return,
        };
        match sent_at {
            Some(sent_at) => self.rtt.sample(sent_at.elapsed()),
            None => log::trace!("[conn] {} ACK of retransmitted segment; no RTT sample", self.id),
        }

        self.cancel_timer();
        self.unacked.pop_front();
        self.window.on_ack();
        log::trace!(
            "[conn] {} ← ACK; in_flight={} cwnd={}",
            self.id,
            self.unacked.len(),
            self.window.get()
        );

        if !self.unacked.is_empty() {
            self.arm_timer();
        }
    }

    /// Cancel-then-replace: there is never more than one live timer.
    fn arm_timer(&mut self) {
        self.cancel_timer();
        self.timer = Some(self.timers.schedule_after(self.rtt.timeout(), self.id));
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            self.timers.cancel(handle);
        }
    }

    fn deliver(&mut self, payload: &[u8]) {
        if let Some(mut callback) = self.on_receive.take() {
            callback(self, payload);
            // The callback may have installed a replacement.
            if self.on_receive.is_none() {
                self.on_receive = Some(callback);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("seq_no", &self.seq_no)
            .field("ack_no", &self.ack_no)
            .field("unacked", &self.unacked.len())
            .field("timer", &self.timer)
            .field("cwnd", &self.window.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::segment::{calc_checksum, payload, read_header, HEADER_LEN};
    use crate::testing::{ManualTimers, RecordingNetwork};

    const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const PEER_ISN: u32 = 1000;
    const ISN: u32 = 500;

    fn id() -> ConnectionId {
        ConnectionId {
            peer_addr: PEER,
            peer_port: 5000,
            local_addr: LOCAL,
            local_port: 7000,
        }
    }

    struct Fixture {
        conn: Connection,
        net: Rc<RecordingNetwork>,
        timers: Rc<ManualTimers>,
    }

    fn fixture(config: Config) -> Fixture {
        let net = Rc::new(RecordingNetwork::default());
        let timers = Rc::new(ManualTimers::default());
        let conn = Connection::new(id(), PEER_ISN, ISN, &config, net.clone(), timers.clone());
        Fixture { conn, net, timers }
    }

    /// Connection that records every delivered payload.
    fn recording(config: Config) -> (Fixture, Rc<RefCell<Vec<Vec<u8>>>>) {
        let mut fx = fixture(config);
        let got = Rc::new(RefCell::new(Vec::new()));
        let sink = got.clone();
        fx.conn
            .register_receiver(move |_, data| sink.borrow_mut().push(data.to_vec()));
        (fx, got)
    }

    fn mss(n: usize) -> Config {
        Config {
            mss: n,
            ..Config::new(7000)
        }
    }

    /// Peer's next in-order sequence number.
    const PEER_NEXT: u32 = PEER_ISN + 1;

    #[test]
    fn new_connection_numbers() {
        let fx = fixture(Config::default());
        assert_eq!(fx.conn.ack_no(), PEER_NEXT);
        assert_eq!(fx.conn.seq_no(), ISN);
        assert_eq!(fx.conn.congestion_window(), 1);
        assert_eq!(fx.conn.timeout_interval(), Duration::from_secs(1));
        assert!(fx.conn.is_open());
    }

    #[test]
    fn send_segments_by_mss() {
        let mut fx = fixture(mss(3));
        fx.conn.send(b"ABCDEFG");

        let sent = fx.net.take();
        let payloads: Vec<&[u8]> = sent
            .iter()
            .map(|(seg, _)| payload(seg, &read_header(seg).unwrap()))
            .collect();
        assert_eq!(payloads, vec![&b"ABC"[..], b"DEF", b"G"]);

        let seqs: Vec<u32> = sent.iter().map(|(s, _)| read_header(s).unwrap().seq).collect();
        assert_eq!(seqs, vec![ISN, ISN + 3, ISN + 6]);
        assert_eq!(fx.conn.seq_no(), ISN + 7);
        assert_eq!(fx.conn.unacked_len(), 3);
        assert_eq!(fx.conn.window_occupancy(), 3);

        for (seg, dest) in &sent {
            let h = read_header(seg).unwrap();
            assert_eq!(*dest, PEER);
            assert!(h.has(flags::ACK));
            assert_eq!(h.ack, PEER_NEXT);
            assert_eq!((h.src_port, h.dst_port), (7000, 5000));
            assert_eq!(calc_checksum(seg, LOCAL, PEER), 0);
        }
    }

    #[test]
    fn send_arms_exactly_one_timer() {
        let mut fx = fixture(mss(3));
        fx.conn.send(b"ABCDEFG");
        assert_eq!(fx.timers.live().len(), 1);
        assert_eq!(fx.conn.armed_timer(), Some(fx.timers.live()[0].0));
        assert_eq!(fx.timers.live()[0].1, Duration::from_secs(1));

        // A second send keeps the head's timer.
        let armed = fx.conn.armed_timer();
        fx.conn.send(b"HI");
        assert_eq!(fx.conn.armed_timer(), armed);
        assert_eq!(fx.timers.live().len(), 1);
    }

    #[test]
    fn consecutive_sends_keep_all_data() {
        let mut fx = fixture(mss(4));
        fx.conn.send(b"hello ");
        fx.conn.send(b"world");
        let sent: Vec<u8> = fx
            .net
            .take()
            .iter()
            .flat_map(|(seg, _)| payload(seg, &read_header(seg).unwrap()).to_vec())
            .collect();
        assert_eq!(sent, b"hello world");
        assert_eq!(fx.conn.seq_no(), ISN + 11);
    }

    #[test]
    fn data_segment_is_acked_and_delivered() {
        let (mut fx, got) = recording(Config::default());
        fx.conn.on_segment(PEER_NEXT, ISN + 1, flags::ACK, b"ping").unwrap();

        assert_eq!(fx.conn.ack_no(), PEER_NEXT + 4);
        assert_eq!(fx.conn.seq_no(), ISN + 1);
        assert_eq!(*got.borrow(), vec![b"ping".to_vec()]);

        let sent = fx.net.take();
        assert_eq!(sent.len(), 1);
        let (seg, _) = &sent[0];
        let h = read_header(seg).unwrap();
        assert!(h.has(flags::ACK));
        assert_eq!((h.seq, h.ack), (ISN + 1, PEER_NEXT + 4));
        assert_eq!(seg.len(), HEADER_LEN);
    }

    #[test]
    fn out_of_order_segment_changes_nothing() {
        let (mut fx, got) = recording(mss(3));
        fx.conn.send(b"abc");
        fx.net.take();
        let before = (fx.conn.seq_no(), fx.conn.ack_no(), fx.conn.unacked_len());

        let err = fx.conn.on_segment(PEER_NEXT + 10, ISN + 3, flags::ACK, b"late");
        assert_eq!(
            err,
            Err(Discard::OutOfSequence {
                expected: PEER_NEXT,
                got: PEER_NEXT + 10
            })
        );
        let err = fx.conn.on_segment(PEER_NEXT - 1, ISN + 3, flags::ACK, b"");
        assert!(err.is_err());

        assert_eq!(before, (fx.conn.seq_no(), fx.conn.ack_no(), fx.conn.unacked_len()));
        assert_eq!(fx.conn.congestion_window(), 1);
        assert!(got.borrow().is_empty());
        assert!(fx.net.take().is_empty());
    }

    #[test]
    fn acks_drain_queue_and_grow_window() {
        let mut fx = fixture(mss(2));
        fx.conn.send(b"aabbcc");
        assert_eq!(fx.conn.unacked_len(), 3);

        for k in 1..=3u32 {
            fx.conn
                .on_segment(PEER_NEXT, ISN + 2 * k, flags::ACK, b"")
                .unwrap();
        }
        assert_eq!(fx.conn.unacked_len(), 0);
        assert_eq!(fx.conn.congestion_window(), 1 + 3);
        assert_eq!(fx.conn.window_occupancy(), 0);
        assert_eq!(fx.conn.armed_timer(), None);
        assert!(fx.timers.live().is_empty());
        assert!(fx.conn.rtt().estimated().is_some());
    }

    #[test]
    fn ack_rearms_timer_for_next_head() {
        let mut fx = fixture(mss(2));
        fx.conn.send(b"aabb");
        let first = fx.conn.armed_timer().unwrap();

        fx.conn.on_segment(PEER_NEXT, ISN + 2, flags::ACK, b"").unwrap();
        let second = fx.conn.armed_timer().unwrap();
        assert_ne!(first, second);
        assert_eq!(fx.timers.live().len(), 1);
        assert!(fx.timers.cancelled().contains(&first));
        assert_eq!(fx.timers.live()[0].1, fx.conn.timeout_interval());
    }

    #[test]
    fn ack_with_empty_queue_only_updates_numbers() {
        let mut fx = fixture(Config::default());
        fx.conn.on_segment(PEER_NEXT, ISN + 1, flags::ACK, b"").unwrap();
        assert_eq!(fx.conn.seq_no(), ISN + 1);
        assert_eq!(fx.conn.congestion_window(), 1);
        assert_eq!(fx.conn.armed_timer(), None);
        assert!(fx.net.take().is_empty());
    }

    #[test]
    fn timeout_halves_window_and_resends_head() {
        let config = Config {
            initial_window: 8,
            mss: 3,
            ..Config::default()
        };
        let mut fx = fixture(config);
        fx.conn.send(b"ABCDEF");
        let original = fx.net.take()[0].0.clone();
        let armed = fx.conn.armed_timer();

        fx.conn.timeout();

        assert_eq!(fx.conn.congestion_window(), 4);
        let resent = fx.net.take();
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].0, original);
        assert_eq!(resent[0].1, PEER);
        assert_eq!(fx.conn.unacked_head(), Some(&original[..]));
        assert_eq!(fx.conn.unacked_len(), 2);
        assert_ne!(fx.conn.armed_timer(), armed);
        assert_eq!(fx.timers.live().len(), 1);
    }

    #[test]
    fn timeout_with_nothing_outstanding_is_noop() {
        let mut fx = fixture(Config {
            initial_window: 8,
            ..Config::default()
        });
        fx.conn.timeout();
        assert_eq!(fx.conn.congestion_window(), 8);
        assert!(fx.net.take().is_empty());
        assert!(fx.timers.live().is_empty());
    }

    #[test]
    fn retransmitted_segment_gives_no_rtt_sample() {
        let mut fx = fixture(mss(2));
        fx.conn.send(b"aabb");

        // First segment acknowledged normally: one sample.
        fx.conn.on_segment(PEER_NEXT, ISN + 2, flags::ACK, b"").unwrap();
        let after_first = fx.conn.rtt().clone();
        assert!(after_first.estimated().is_some());

        // Second segment times out, then its ACK arrives.
        fx.conn.timeout();
        fx.conn.on_segment(PEER_NEXT, ISN + 4, flags::ACK, b"").unwrap();

        assert_eq!(*fx.conn.rtt(), after_first);
        assert_eq!(fx.conn.unacked_len(), 0);
        assert_eq!(fx.conn.congestion_window(), 2);
    }

    #[test]
    fn retransmitted_first_segment_leaves_estimator_empty() {
        let mut fx = fixture(mss(4));
        fx.conn.send(b"data");
        fx.conn.timeout();
        fx.conn.on_segment(PEER_NEXT, ISN + 4, flags::ACK, b"").unwrap();
        assert_eq!(fx.conn.rtt().estimated(), None);
        assert_eq!(fx.conn.timeout_interval(), Duration::from_secs(1));
    }

    #[test]
    fn peer_fin_is_acked_and_reported_empty() {
        let (mut fx, got) = recording(Config::default());
        fx.conn.on_segment(PEER_NEXT, ISN + 1, flags::FIN, b"ignored").unwrap();

        assert_eq!(fx.conn.ack_no(), PEER_NEXT + 1);
        assert_eq!(fx.conn.seq_no(), ISN + 1);
        assert_eq!(*got.borrow(), vec![Vec::<u8>::new()]);
        assert!(fx.conn.is_open());

        let sent = fx.net.take();
        let h = read_header(&sent[0].0).unwrap();
        assert!(h.has(flags::ACK));
        assert!(!h.has(flags::FIN));
        assert_eq!((h.seq, h.ack), (ISN + 1, PEER_NEXT + 1));
    }

    #[test]
    fn close_sends_fin_and_reports_empty() {
        let (mut fx, got) = recording(mss(4));
        fx.conn.send(b"bye!");
        fx.net.take();

        fx.conn.close();
        let sent = fx.net.take();
        assert_eq!(sent.len(), 1);
        let h = read_header(&sent[0].0).unwrap();
        assert!(h.has(flags::FIN));
        assert_eq!((h.seq, h.ack), (ISN + 4, PEER_NEXT));
        assert_eq!(*got.borrow(), vec![Vec::<u8>::new()]);
        assert_eq!(fx.conn.state(), ConnectionState::Closed);
        assert_eq!(fx.conn.armed_timer(), None);
        assert!(fx.timers.live().is_empty());

        // Idempotent, and the closed connection ignores further traffic.
        fx.conn.close();
        fx.conn.send(b"more");
        assert!(fx.net.take().is_empty());
        assert_eq!(
            fx.conn.on_segment(PEER_NEXT, ISN + 4, flags::ACK, b"x"),
            Err(Discard::UnknownConnection(id()))
        );
        assert_eq!(got.borrow().len(), 1);
    }

    #[test]
    fn callback_may_reply_on_same_connection() {
        let mut fx = fixture(Config::default());
        fx.conn.register_receiver(|conn, data| {
            if !data.is_empty() {
                conn.send(&data.to_ascii_uppercase());
            }
        });
        fx.conn.on_segment(PEER_NEXT, ISN + 1, flags::ACK, b"echo").unwrap();

        let sent = fx.net.take();
        assert_eq!(sent.len(), 2);
        let (ack, reply) = (&sent[0].0, &sent[1].0);
        assert_eq!(ack.len(), HEADER_LEN);
        assert_eq!(payload(reply, &read_header(reply).unwrap()), b"ECHO");
        assert_eq!(read_header(reply).unwrap().seq, ISN + 1);
    }

    #[test]
    fn oversized_mss_is_clamped() {
        let mut fx = fixture(mss(200_000));
        fx.conn.send(&vec![0xff; 200_000]);

        let sent = fx.net.take();
        assert_eq!(sent.len(), 200_000usize.div_ceil(MAX_MSS));
        let mut total = 0;
        for (seg, _) in &sent {
            assert!(seg.len() <= usize::from(u16::MAX));
            assert_eq!(calc_checksum(seg, LOCAL, PEER), 0);
            total += payload(seg, &read_header(seg).unwrap()).len();
        }
        assert_eq!(total, 200_000);
        assert_eq!(fx.conn.seq_no(), ISN + 200_000);
    }

    #[test]
    fn zero_mss_still_makes_progress() {
        let mut fx = fixture(mss(0));
        fx.conn.send(b"ab");
        assert_eq!(fx.net.take().len(), 2);
    }

    #[test]
    fn close_inside_callback_reports_end_once() {
        let mut fx = fixture(Config::default());
        let calls = Rc::new(RefCell::new(Vec::new()));
        let log = calls.clone();
        fx.conn.register_receiver(move |conn, data| {
            log.borrow_mut().push(data.to_vec());
            if data.is_empty() {
                conn.close();
            }
        });

        fx.conn.on_segment(PEER_NEXT, ISN, flags::FIN, b"").unwrap();
        assert_eq!(*calls.borrow(), vec![Vec::<u8>::new()]);
        assert_eq!(fx.conn.state(), ConnectionState::Closed);

        let sent = fx.net.take();
        assert_eq!(sent.len(), 2);
        assert!(read_header(&sent[1].0).unwrap().has(flags::FIN));
    }

    #[test]
    fn dropping_connection_cancels_timer() {
        let mut fx = fixture(Config::default());
        fx.conn.send(b"x");
        let armed = fx.conn.armed_timer().unwrap();
        drop(fx.conn);
        assert!(fx.timers.cancelled().contains(&armed));
    }
}
