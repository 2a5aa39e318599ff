use log::{debug, trace};

use crate::err::LenError;
use crate::tcp::{
    ControlBlock, Flags, RecvRing, RejectError, RetransmitRing, RingError, SeqNum, State,
};
use crate::transport::{TcpFrame, TcpOption};
use crate::validate::{AnnotatedError, Validator};

/// Maximum segment size advertised in the SYN of an active open.
const DEFAULT_MSS: u16 = 1460;

/// Errors surfaced by the [`Handler`] API.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HandlerError {
    /// The connection is closed (also returned after a received RST or
    /// an abort once buffered data ran out).
    Closed,
    /// The frame is not addressed to this connection.
    PortMismatch { expected: u16, found: u16 },
    /// The frame failed field validation.
    InvalidFrame(AnnotatedError),
    /// The buffer is too small for a TCP header.
    Len(LenError),
    /// The control block refused the segment.
    Reject(RejectError),
    /// The retransmission ring refused the operation.
    Ring(RingError),
    /// The output buffer cannot hold the segment to emit.
    ShortBuffer { required: usize, len: usize },
    /// Ill-formed caller configuration.
    InvalidConfig(&'static str),
}

impl core::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use HandlerError::*;
        match self {
            Closed => write!(f, "connection closed"),
            PortMismatch { expected, found } => {
                write!(f, "port {found} does not match connection port {expected}")
            }
            InvalidFrame(err) => write!(f, "invalid frame: {err}"),
            Len(err) => write!(f, "{err}"),
            Reject(err) => write!(f, "segment rejected: {err}"),
            Ring(err) => write!(f, "retransmission ring: {err}"),
            ShortBuffer { required, len } => {
                write!(f, "output buffer of {len} byte(s) cannot hold {required} byte(s)")
            }
            InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandlerError::InvalidFrame(_) => None,
            HandlerError::Len(err) => Some(err),
            HandlerError::Reject(err) => Some(err),
            HandlerError::Ring(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LenError> for HandlerError {
    fn from(err: LenError) -> HandlerError {
        HandlerError::Len(err)
    }
}

impl From<RejectError> for HandlerError {
    fn from(err: RejectError) -> HandlerError {
        HandlerError::Reject(err)
    }
}

impl From<RingError> for HandlerError {
    fn from(err: RingError) -> HandlerError {
        HandlerError::Ring(err)
    }
}

/// Glue between wire TCP frames and the sequence space machinery: owns
/// a [`ControlBlock`], the outbound [`RetransmitRing`] and the inbound
/// [`RecvRing`], and tracks the connection's ports plus a generation
/// counter that invalidates stale waiters after an abort.
///
/// The handler never touches IP headers. Checksums are left zeroed in
/// emitted frames; the caller folds the pseudo header through the IP
/// views since only it knows the addresses in play.
#[derive(Debug, Default)]
pub struct Handler {
    tcb: ControlBlock,
    tx: RetransmitRing,
    rx: RecvRing,
    local_port: u16,
    remote_port: u16,
    /// Initial send sequence number of an active open whose SYN was
    /// not emitted yet.
    pending_syn: Option<SeqNum>,
    /// Incremented on every abort; a waiter that captured the previous
    /// value must treat its result as closed.
    conn_id: u64,
    /// Keepalive probes seen (they never reach the control block).
    keepalives: u64,
}

impl Handler {
    /// Creates a handler with the given outbound buffer & packet table
    /// and an inbound buffer of `rx_capacity` bytes.
    pub fn new(
        tx_buf: Vec<u8>,
        max_packets: usize,
        rx_capacity: usize,
    ) -> Result<Handler, HandlerError> {
        if rx_capacity == 0 {
            return Err(HandlerError::InvalidConfig(
                "receive buffer must not be empty",
            ));
        }
        Ok(Handler {
            tcb: ControlBlock::new(),
            tx: RetransmitRing::new(tx_buf, max_packets)?,
            rx: RecvRing::new(rx_capacity),
            local_port: 0,
            remote_port: 0,
            pending_syn: None,
            conn_id: 0,
            keepalives: 0,
        })
    }

    #[inline]
    pub fn state(&self) -> State {
        self.tcb.state()
    }

    #[inline]
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// The remote port, or 0 while unknown (listening).
    #[inline]
    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Generation counter; bumped by [`Handler::abort`].
    #[inline]
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Number of keepalive probes received.
    #[inline]
    pub fn keepalives(&self) -> u64 {
        self.keepalives
    }

    /// Bytes buffered for [`Handler::read`].
    #[inline]
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Access to the underlying control block (sequence numbers,
    /// windows, state predicates).
    #[inline]
    pub fn tcb(&self) -> &ControlBlock {
        &self.tcb
    }

    /// Window to advertise: the free receive buffer, clamped to what
    /// the 16 bit wire field can carry.
    fn advertised_window(&self) -> u32 {
        (self.rx.free()).min(usize::from(u16::MAX)) as u32
    }

    /// Passive open: listen on `local_port` with the given initial send
    /// sequence number.
    pub fn open_listen(&mut self, local_port: u16, iss: SeqNum) -> Result<(), HandlerError> {
        if local_port == 0 {
            return Err(HandlerError::InvalidConfig("local port must be non-zero"));
        }
        self.tcb.open(iss, self.advertised_window())?;
        self.local_port = local_port;
        self.remote_port = 0;
        self.pending_syn = None;
        Ok(())
    }

    /// Active open towards `remote_port`. The SYN (with its MSS option)
    /// is emitted by the next [`Handler::send`] call.
    pub fn open_active(
        &mut self,
        local_port: u16,
        remote_port: u16,
        iss: SeqNum,
    ) -> Result<(), HandlerError> {
        if local_port == 0 || remote_port == 0 {
            return Err(HandlerError::InvalidConfig("ports must be non-zero"));
        }
        if self.tcb.state() != State::Closed {
            return Err(HandlerError::InvalidConfig("connection already open"));
        }
        self.tcb
            .send(crate::tcp::Segment::syn(iss, self.advertised_window()))?;
        self.local_port = local_port;
        self.remote_port = remote_port;
        self.pending_syn = Some(iss);
        Ok(())
    }

    /// Processes an inbound TCP frame (starting at the TCP header).
    ///
    /// Payload accepted by the control block is copied into the receive
    /// ring; the ring is never cleared by state transitions, so data
    /// stays readable after the connection closed.
    pub fn recv(&mut self, wire: &mut [u8]) -> Result<(), HandlerError> {
        if self.tcb.state() == State::Closed && self.pending_syn.is_none() {
            return Err(HandlerError::Closed);
        }

        let frame = TcpFrame::from_slice(wire)?;
        let mut v = Validator::new();
        frame.validate_except_crc(&mut v);
        if let Err(err) = v.result() {
            return Err(HandlerError::InvalidFrame(err));
        }
        if frame.destination_port() != self.local_port {
            return Err(HandlerError::PortMismatch {
                expected: self.local_port,
                found: frame.destination_port(),
            });
        }
        if self.remote_port != 0 && frame.source_port() != self.remote_port {
            return Err(HandlerError::PortMismatch {
                expected: self.remote_port,
                found: frame.source_port(),
            });
        }

        let payload_len = frame.payload().len().min(self.rx.free());
        let seg = frame.segment(payload_len as u32);

        // keepalive probes are answered by the caller re-sending the
        // current ack, the sequence space must not see them
        if seg.flags == Flags::ACK
            && seg.datalen == 0
            && SeqNum::size_of(seg.seq, self.tcb.rcv_nxt()) == 1
            && seg.ack == self.tcb.snd_nxt()
        {
            self.keepalives += 1;
            trace!("handler: keepalive probe #{}", self.keepalives);
            return Ok(());
        }

        let was_syn = seg.flags.contains(Flags::SYN);
        self.tcb.recv(seg)?;

        if seg.flags.contains(Flags::ACK) && self.tx.sent() > 0 {
            // duplicate acknowledgments are stale for the ring, that is
            // not an error at this layer
            match self.tx.recv_ack(seg.ack) {
                Ok(()) | Err(RingError::StaleAck { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        if payload_len > 0 {
            let copied = self.rx.write(&frame.payload()[..payload_len]);
            debug_assert_eq!(payload_len, copied);
        }
        if was_syn && self.remote_port == 0 {
            self.remote_port = frame.source_port();
            debug!("handler: remote port {} latched", self.remote_port);
        }
        if self.tcb.state() != State::Closed {
            let wnd = self.advertised_window();
            let _ = self.tcb.set_recv_window(wnd);
        }
        Ok(())
    }

    /// Emits the next outbound segment into `out` and returns its
    /// length, or `Ok(0)` when there is nothing to transmit. The
    /// checksum field is left zero for the caller to fill.
    pub fn send(&mut self, out: &mut [u8]) -> Result<usize, HandlerError> {
        if let Some(iss) = self.pending_syn {
            return self.send_client_syn(out, iss);
        }
        if self.tcb.state() == State::Closed {
            return Err(HandlerError::Closed);
        }
        if out.len() < TcpFrame::LEN {
            return Err(HandlerError::ShortBuffer {
                required: TcpFrame::LEN,
                len: out.len(),
            });
        }

        let available = self.tx.unsent().min(out.len() - TcpFrame::LEN) as u32;
        let seg = match self.tcb.pending_segment(available) {
            Some(seg) => seg,
            None => return Ok(0),
        };

        let total = TcpFrame::LEN + seg.datalen as usize;
        if seg.datalen > 0 {
            let n = self
                .tx
                .make_packet(&mut out[TcpFrame::LEN..total], seg.seq)?;
            debug_assert_eq!(seg.datalen as usize, n);
        }

        let state_before = self.tcb.state();
        self.tcb.send(seg)?;

        let mut frame = TcpFrame::from_slice(&mut out[..total])?;
        frame.set_source_port(self.local_port);
        frame.set_destination_port(self.remote_port);
        frame.set_data_offset(TcpFrame::MIN_DATA_OFFSET);
        frame.set_segment(&seg);
        frame.set_checksum(0);
        frame.set_urgent_pointer(0);

        if state_before == State::TimeWait && self.tcb.state() == State::Closed {
            // the connection ended; ports go away but buffered inbound
            // data stays readable
            self.local_port = 0;
            self.remote_port = 0;
        }
        Ok(total)
    }

    /// Emits the opening SYN of an active open, carrying an MSS option
    /// (data offset 6).
    fn send_client_syn(&mut self, out: &mut [u8], iss: SeqNum) -> Result<usize, HandlerError> {
        const SYN_LEN: usize = TcpFrame::LEN + 4;
        if out.len() < SYN_LEN {
            return Err(HandlerError::ShortBuffer {
                required: SYN_LEN,
                len: out.len(),
            });
        }
        let seg = crate::tcp::Segment::syn(iss, self.tcb.rcv_wnd());
        // the MSS option occupies the 4 bytes after the fixed header
        let written = TcpOption::MaximumSegmentSize(DEFAULT_MSS)
            .write(&mut out[TcpFrame::LEN..SYN_LEN])
            .unwrap_or(0);
        debug_assert_eq!(SYN_LEN - TcpFrame::LEN, written);

        let mut frame = TcpFrame::from_slice(&mut out[..SYN_LEN])?;
        frame.set_source_port(self.local_port);
        frame.set_destination_port(self.remote_port);
        frame.set_data_offset(6);
        frame.set_segment(&seg);
        frame.set_checksum(0);
        frame.set_urgent_pointer(0);
        self.pending_syn = None;
        trace!("handler: client SYN emitted with iss {}", iss);
        Ok(SYN_LEN)
    }

    /// Copies buffered inbound payload into `dst`. A closed connection
    /// first drains its buffer and only then reports
    /// [`HandlerError::Closed`].
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize, HandlerError> {
        let n = self.rx.read(dst);
        if n == 0 && !dst.is_empty() && self.tcb.state() == State::Closed {
            return Err(HandlerError::Closed);
        }
        if self.tcb.state() != State::Closed {
            let wnd = self.advertised_window();
            let _ = self.tcb.set_recv_window(wnd);
        }
        Ok(n)
    }

    /// Appends bytes to the outbound stream. Fails once the connection
    /// no longer accepts outbound data.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, HandlerError> {
        if !self.tcb.state().tx_data_open() {
            return Err(HandlerError::Closed);
        }
        Ok(self.tx.write(bytes))
    }

    /// Starts the local side of the teardown.
    pub fn close(&mut self) -> Result<(), HandlerError> {
        self.tcb.close().map_err(HandlerError::from)
    }

    /// Tears the connection down immediately: bumps the generation
    /// counter, resets the control block and drops both buffers.
    pub fn abort(&mut self) {
        self.conn_id = self.conn_id.wrapping_add(1);
        self.tcb.abort();
        self.tx.clear();
        self.rx.clear();
        self.local_port = 0;
        self.remote_port = 0;
        self.pending_syn = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tcp::Segment;

    fn pair() -> (Handler, Handler) {
        let mut a = Handler::new(vec![0; 2048], 8, 2048).unwrap();
        let mut b = Handler::new(vec![0; 2048], 8, 2048).unwrap();
        b.open_listen(80, SeqNum::new(300)).unwrap();
        a.open_active(1234, 80, SeqNum::new(100)).unwrap();
        (a, b)
    }

    /// Shuttles frames between the two handlers until both run dry.
    fn pump(a: &mut Handler, b: &mut Handler) {
        let mut buf = [0u8; 1600];
        loop {
            let mut moved = false;
            if let Ok(n) = a.send(&mut buf) {
                if n > 0 {
                    b.recv(&mut buf[..n]).unwrap();
                    moved = true;
                }
            }
            if let Ok(n) = b.send(&mut buf) {
                if n > 0 {
                    a.recv(&mut buf[..n]).unwrap();
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }
    }

    fn established_pair() -> (Handler, Handler) {
        let (mut a, mut b) = pair();
        pump(&mut a, &mut b);
        assert_eq!(State::Established, a.state());
        assert_eq!(State::Established, b.state());
        (a, b)
    }

    #[test]
    fn client_syn_carries_mss_option() {
        let (mut a, _b) = pair();
        let mut buf = [0u8; 64];
        let n = a.send(&mut buf).unwrap();
        assert_eq!(24, n);

        let frame = TcpFrame::from_slice(&mut buf[..n]).unwrap();
        assert_eq!(6, frame.data_offset());
        assert!(frame.syn());
        assert_eq!(1234, frame.source_port());
        assert_eq!(80, frame.destination_port());
        assert_eq!(
            TcpOption::MaximumSegmentSize(DEFAULT_MSS),
            frame.options_iterator().next().unwrap().unwrap()
        );
    }

    #[test]
    fn handshake_and_data_exchange() {
        let (mut a, mut b) = established_pair();
        // b latched the client's source port from the SYN
        assert_eq!(1234, b.remote_port());

        assert_eq!(12, a.write(b"hello world\n").unwrap());
        pump(&mut a, &mut b);

        let mut dst = [0u8; 64];
        assert_eq!(12, b.read(&mut dst).unwrap());
        assert_eq!(b"hello world\n", &dst[..12]);

        // the echo direction
        assert_eq!(12, b.write(b"HELLO WORLD\n").unwrap());
        pump(&mut a, &mut b);
        assert_eq!(12, a.read(&mut dst).unwrap());
        assert_eq!(b"HELLO WORLD\n", &dst[..12]);

        // everything acknowledged, nothing left in flight
        assert_eq!(a.tcb().snd_una(), a.tcb().snd_nxt());
        assert_eq!(b.tcb().snd_una(), b.tcb().snd_nxt());
    }

    #[test]
    fn port_mismatch_rejected() {
        let (mut a, mut b) = pair();
        let mut buf = [0u8; 64];
        let n = a.send(&mut buf).unwrap();
        {
            let mut frame = TcpFrame::from_slice(&mut buf[..n]).unwrap();
            frame.set_destination_port(81);
        }
        assert!(matches!(
            b.recv(&mut buf[..n]),
            Err(HandlerError::PortMismatch { expected: 80, found: 81 })
        ));
    }

    #[test]
    fn zero_port_frame_rejected() {
        let (_a, mut b) = pair();
        let mut buf = [0u8; 20];
        {
            let mut frame = TcpFrame::from_slice(&mut buf).unwrap();
            frame.set_source_port(0);
            frame.set_destination_port(80);
            frame.set_data_offset(5);
            frame.set_flags(Flags::SYN);
        }
        assert!(matches!(
            b.recv(&mut buf),
            Err(HandlerError::InvalidFrame(_))
        ));
    }

    #[test]
    fn keepalive_counted_without_state_change() {
        let (mut a, mut b) = established_pair();
        let rcv_nxt = b.tcb().rcv_nxt();
        let snd_nxt = b.tcb().snd_nxt();

        let mut buf = [0u8; 20];
        {
            let mut frame = TcpFrame::from_slice(&mut buf).unwrap();
            frame.set_source_port(1234);
            frame.set_destination_port(80);
            frame.set_data_offset(5);
            frame.set_segment(&Segment {
                seq: rcv_nxt.add(u32::MAX), // rcv.nxt - 1
                ack: snd_nxt,
                datalen: 0,
                wnd: 1000,
                flags: Flags::ACK,
            });
        }
        b.recv(&mut buf).unwrap();
        assert_eq!(1, b.keepalives());
        assert_eq!(rcv_nxt, b.tcb().rcv_nxt());
        assert_eq!(State::Established, b.state());
        let _ = a;
    }

    #[test]
    fn buffered_data_survives_close() {
        let (mut a, mut b) = established_pair();

        // b sends 44 bytes that a buffers but does not read yet
        let payload = [0x55u8; 44];
        b.write(&payload).unwrap();
        pump(&mut a, &mut b);
        assert_eq!(44, a.buffered());

        // full teardown: b closes; a acknowledges, follows up with its
        // own FIN and runs CLOSE-WAIT, LAST-ACK, CLOSED
        b.close().unwrap();
        pump(&mut a, &mut b);
        assert_eq!(State::Closed, a.state());
        assert_eq!(State::Closed, b.state());

        // the buffered bytes must still come out, then Closed
        let mut dst = [0u8; 64];
        assert_eq!(44, a.read(&mut dst).unwrap());
        assert_eq!(&payload[..], &dst[..44]);
        assert_eq!(Err(HandlerError::Closed), a.read(&mut dst));
    }

    #[test]
    fn abort_bumps_generation() {
        let (mut a, _b) = established_pair();
        let before = a.conn_id();
        a.abort();
        assert_eq!(before + 1, a.conn_id());
        assert_eq!(State::Closed, a.state());
        assert_eq!(0, a.local_port());
        let mut dst = [0u8; 4];
        assert_eq!(Err(HandlerError::Closed), a.read(&mut dst));
        assert_eq!(Err(HandlerError::Closed), a.write(b"x"));
    }

    #[test]
    fn write_after_fin_rejected() {
        let (mut a, mut b) = established_pair();
        a.close().unwrap();
        pump(&mut a, &mut b);
        assert_eq!(Err(HandlerError::Closed), a.write(b"late"));
    }

    #[test]
    fn rst_closes_and_surfaces_on_next_call() {
        let (mut a, mut b) = established_pair();
        let mut buf = [0u8; 20];
        {
            let mut frame = TcpFrame::from_slice(&mut buf).unwrap();
            frame.set_source_port(1234);
            frame.set_destination_port(80);
            frame.set_data_offset(5);
            frame.set_segment(&Segment {
                seq: b.tcb().rcv_nxt(),
                ack: SeqNum::ZERO,
                datalen: 0,
                wnd: 0,
                flags: Flags::RST,
            });
        }
        b.recv(&mut buf).unwrap();
        assert_eq!(State::Closed, b.state());
        let mut out = [0u8; 64];
        assert_eq!(Err(HandlerError::Closed), b.send(&mut out));
        let _ = a;
    }
}
