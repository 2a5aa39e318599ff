use log::{debug, trace};

use crate::tcp::{Flags, Segment, SeqNum, State};

/// Largest window either side may advertise (no window scaling).
pub const MAX_WINDOW: u32 = 1 << 16;

/// Distance the initial send sequence number is moved when a reset
/// returns a passive connection to LISTEN, so the next handshake does
/// not reuse sequence numbers of the aborted one.
const ISS_REOPEN_JUMP: u32 = 1 << 10;

/// Reasons the control block refuses to process a segment.
///
/// A rejection is not fatal: the segment is dropped, pending flags may
/// have been amended (e.g. a challenge ACK was queued) and the caller
/// may continue using the control block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectError {
    /// The window field exceeds what a TCP header can carry.
    WindowTooLarge { wnd: u32 },
    /// The control block is closed.
    ClosedPipe,
    /// The segment was dropped without further detail.
    PacketDrop,
    /// The acknowledgment number does not match the expected one.
    AckNotNext { ack: SeqNum, expected: SeqNum },
    /// The sequence number is outside the valid window.
    SeqNotInWindow { seq: SeqNum, nxt: SeqNum, wnd: u32 },
    /// The end of the segment is outside the valid window.
    LastNotInWindow { last: SeqNum, nxt: SeqNum, wnd: u32 },
    /// The receive window is zero and the segment carries data.
    ZeroWindow { seq: SeqNum, nxt: SeqNum },
    /// The segment is inside the window but not at the expected
    /// sequence number (no out-of-order reassembly).
    RequireSequential { seq: SeqNum, nxt: SeqNum },
    /// The connection is already shutting down.
    ConnectionClosing,
    /// The caller supplied an ill-formed configuration or segment.
    InvalidConfig(&'static str),
    /// The outgoing segment violates the send state.
    InvalidSegment(&'static str),
}

impl core::fmt::Display for RejectError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use RejectError::*;
        match self {
            WindowTooLarge { wnd } => {
                write!(f, "window of {wnd} exceeds the 16 bit window field")
            }
            ClosedPipe => write!(f, "control block is closed"),
            PacketDrop => write!(f, "segment dropped"),
            AckNotNext { ack, expected } => {
                write!(f, "acknowledgment {ack} does not match expected {expected}")
            }
            SeqNotInWindow { seq, nxt, wnd } => {
                write!(f, "sequence {seq} outside window [{nxt}, {nxt}+{wnd})")
            }
            LastNotInWindow { last, nxt, wnd } => {
                write!(f, "segment end {last} outside window [{nxt}, {nxt}+{wnd})")
            }
            ZeroWindow { seq, nxt } => {
                write!(f, "data at {seq} not acceptable in zero window (next {nxt})")
            }
            RequireSequential { seq, nxt } => {
                write!(f, "sequence {seq} not at expected {nxt} (no reassembly)")
            }
            ConnectionClosing => write!(f, "connection closing"),
            InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
            InvalidSegment(reason) => write!(f, "invalid segment: {reason}"),
        }
    }
}

impl std::error::Error for RejectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Send sequence space of RFC 9293 section 3.3.1.
#[derive(Clone, Copy, Debug, Default)]
struct SendSpace {
    /// Initial send sequence number.
    iss: SeqNum,
    /// Oldest unacknowledged sequence number.
    una: SeqNum,
    /// Next sequence number to be sent.
    nxt: SeqNum,
    /// Window the peer advertised to us.
    wnd: u32,
}

/// Receive sequence space of RFC 9293 section 3.3.1.
#[derive(Clone, Copy, Debug, Default)]
struct RecvSpace {
    /// Initial receive sequence number.
    irs: SeqNum,
    /// Next sequence number expected from the peer.
    nxt: SeqNum,
    /// Window we advertise to the peer.
    wnd: u32,
}

/// The Transmission Control Block: a pure, I/O free implementation of
/// the RFC 9293 connection state machine over [`Segment`] values.
///
/// `recv` ingests segment summaries of inbound frames, `pending_segment`
/// & `send` produce and commit outbound ones. The owner is responsible
/// for moving the actual payload bytes; the control block only tracks
/// sequence space.
#[derive(Debug, Default)]
pub struct ControlBlock {
    state: State,
    snd: SendSpace,
    rcv: RecvSpace,
    /// Sequence number used for a queued RST (the offending segment's
    /// acknowledgment number).
    rst_ptr: SeqNum,
    /// Control flags queued for the next two outgoing segments.
    /// Slot 1 is only used to queue the FIN|ACK that follows the
    /// CLOSE-WAIT acknowledgment.
    pending: [Flags; 2],
    /// A challenge ACK has priority over any other pending segment.
    challenge_ack: bool,
}

impl ControlBlock {
    pub fn new() -> ControlBlock {
        ControlBlock::default()
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn iss(&self) -> SeqNum {
        self.snd.iss
    }

    #[inline]
    pub fn irs(&self) -> SeqNum {
        self.rcv.irs
    }

    #[inline]
    pub fn snd_una(&self) -> SeqNum {
        self.snd.una
    }

    #[inline]
    pub fn snd_nxt(&self) -> SeqNum {
        self.snd.nxt
    }

    /// Window the peer advertised to us.
    #[inline]
    pub fn snd_wnd(&self) -> u32 {
        self.snd.wnd
    }

    #[inline]
    pub fn rcv_nxt(&self) -> SeqNum {
        self.rcv.nxt
    }

    /// Window we advertise to the peer.
    #[inline]
    pub fn rcv_wnd(&self) -> u32 {
        self.rcv.wnd
    }

    /// Bytes (plus SYN/FIN) sent but not yet acknowledged.
    #[inline]
    pub fn in_flight(&self) -> u32 {
        SeqNum::size_of(self.snd.una, self.snd.nxt)
    }

    /// How much more the peer is currently willing to accept. Saturates
    /// at zero when the peer shrank its window below what is already in
    /// flight.
    #[inline]
    pub fn max_send(&self) -> u32 {
        self.snd.wnd.saturating_sub(self.in_flight())
    }

    /// True if a control segment is waiting to be emitted.
    pub fn has_pending(&self) -> bool {
        self.challenge_ack || !self.pending[0].is_empty()
    }

    /// Adjusts the advertised receive window (e.g. after the owner
    /// drained its receive buffer).
    pub fn set_recv_window(&mut self, wnd: u32) -> Result<(), RejectError> {
        if wnd > MAX_WINDOW {
            return Err(RejectError::WindowTooLarge { wnd });
        }
        self.rcv.wnd = wnd;
        Ok(())
    }

    /// Passive open: bind the control block to an initial send sequence
    /// number and an advertised receive window and start listening.
    pub fn open(&mut self, iss: SeqNum, wnd: u32) -> Result<(), RejectError> {
        if wnd == 0 {
            return Err(RejectError::InvalidConfig("receive window must be non-zero"));
        }
        if wnd > MAX_WINDOW {
            return Err(RejectError::WindowTooLarge { wnd });
        }
        if !matches!(self.state, State::Closed | State::Listen) {
            return Err(RejectError::InvalidConfig(
                "open requires a closed or listening control block",
            ));
        }
        *self = ControlBlock {
            state: State::Listen,
            snd: SendSpace {
                iss,
                una: iss,
                nxt: iss,
                wnd: 0,
            },
            rcv: RecvSpace {
                irs: SeqNum::ZERO,
                nxt: SeqNum::ZERO,
                wnd,
            },
            rst_ptr: SeqNum::ZERO,
            pending: [Flags::NONE; 2],
            challenge_ack: false,
        };
        debug!("tcb: listening with iss {} window {}", iss, wnd);
        Ok(())
    }

    /// Unconditionally tears the connection down. No RST is queued, the
    /// owner is expected to have signalled the peer already (or to not
    /// care).
    pub fn abort(&mut self) {
        debug!("tcb: abort in state {}", self.state);
        *self = ControlBlock::default();
    }

    /// Computes the next segment to transmit, or `None` when there is
    /// nothing to send. `payload_len` is the number of payload bytes
    /// the owner could attach; the returned segment's `datalen` is the
    /// amount that actually fits the peer's window.
    ///
    /// The segment is not committed: pending flags stay queued until
    /// [`ControlBlock::send`] confirms the transmission.
    pub fn pending_segment(&mut self, payload_len: u32) -> Option<Segment> {
        if self.challenge_ack {
            self.challenge_ack = false;
            trace!("tcb: emitting challenge ack {}", self.rcv.nxt);
            return Some(Segment {
                seq: self.snd.nxt,
                ack: self.rcv.nxt,
                datalen: 0,
                wnd: self.rcv.wnd,
                flags: Flags::ACK,
            });
        }

        let mut payload_len = if self.state.tx_data_open() {
            payload_len
        } else {
            0
        };

        if self.pending[0].is_empty() && payload_len == 0 {
            return None;
        }

        // Control flags are emitted even at a saturated window; holding
        // back the ACK here would starve the peer (it keeps
        // retransmitting data we already received).
        payload_len = payload_len.min(self.max_send());

        if self.state.is_synchronized() {
            self.pending[0] |= Flags::ACK;
        }

        let flags = if payload_len > 0 {
            self.pending[0] | Flags::ACK | Flags::PSH
        } else {
            self.pending[0]
        };

        Some(Segment {
            seq: if flags.contains(Flags::RST) {
                self.rst_ptr
            } else {
                self.snd.nxt
            },
            ack: if flags.contains(Flags::ACK) {
                self.rcv.nxt
            } else {
                SeqNum::ZERO
            },
            datalen: payload_len,
            wnd: self.rcv.wnd,
            flags,
        })
    }

    /// Commits an outgoing segment: validates it against the send
    /// state, advances the state machine and the send sequence space.
    pub fn send(&mut self, seg: Segment) -> Result<(), RejectError> {
        if seg.wnd > MAX_WINDOW {
            return Err(RejectError::WindowTooLarge { wnd: seg.wnd });
        }
        match self.state {
            State::Closed => self.send_open_syn(seg),
            // a listener only ever emits queued resets
            State::Listen if !seg.flags.contains(Flags::RST) => Err(
                RejectError::InvalidSegment("nothing to send while listening"),
            ),
            _ => self.send_synchronizing(seg),
        }
    }

    /// Active open: the first SYN transitions CLOSED into SYN-SENT and
    /// seeds the send space from the segment.
    fn send_open_syn(&mut self, seg: Segment) -> Result<(), RejectError> {
        if seg.flags != Flags::SYN {
            return Err(RejectError::ClosedPipe);
        }
        if seg.ack != SeqNum::ZERO || seg.datalen != 0 {
            return Err(RejectError::InvalidSegment(
                "opening SYN must not carry an acknowledgment or data",
            ));
        }
        if seg.wnd == 0 {
            return Err(RejectError::InvalidSegment(
                "opening SYN must advertise a window",
            ));
        }
        self.snd = SendSpace {
            iss: seg.seq,
            una: seg.seq,
            nxt: seg.seq.add(1),
            wnd: 0,
        };
        self.rcv = RecvSpace {
            irs: SeqNum::ZERO,
            nxt: SeqNum::ZERO,
            wnd: seg.wnd,
        };
        self.pending = [Flags::NONE; 2];
        self.set_state(State::SynSent);
        Ok(())
    }

    fn send_synchronizing(&mut self, seg: Segment) -> Result<(), RejectError> {
        if seg.flags.is_empty() && seg.datalen == 0 {
            return Err(RejectError::InvalidSegment("empty segment"));
        }

        if seg.flags.contains(Flags::RST) {
            if seg.seq != self.rst_ptr {
                return Err(RejectError::InvalidSegment(
                    "reset must use the queued reset sequence number",
                ));
            }
        } else {
            if seg.seq != self.snd.nxt {
                return Err(RejectError::RequireSequential {
                    seq: seg.seq,
                    nxt: self.snd.nxt,
                });
            }
            // only payload is held to the peer's window; control flags
            // must be able to leave even when the window is saturated
            if seg.datalen > 0 {
                let end = seg.seq.add(seg.datalen);
                let zero_window_probe = seg.datalen == 1 && self.max_send() == 0;
                if !zero_window_probe && SeqNum::size_of(self.snd.una, end) > self.snd.wnd {
                    return Err(RejectError::LastNotInWindow {
                        last: seg.last(),
                        nxt: self.snd.nxt,
                        wnd: self.snd.wnd,
                    });
                }
            }
        }

        if seg.flags.contains(Flags::ACK) && seg.ack != self.rcv.nxt {
            return Err(RejectError::AckNotNext {
                ack: seg.ack,
                expected: self.rcv.nxt,
            });
        }
        if seg.datalen > 0 && !self.state.tx_data_open() {
            return Err(RejectError::InvalidSegment("data not allowed in this state"));
        }
        if seg.flags.contains(Flags::SYN) && self.state != State::SynRcvd {
            return Err(RejectError::InvalidSegment(
                "SYN may only be sent while in SYN-RCVD",
            ));
        }
        if self.state == State::TimeWait && seg.flags != Flags::ACK {
            return Err(RejectError::ConnectionClosing);
        }

        // committed from here on
        self.snd.nxt = self.snd.nxt.add(seg.len());
        self.rcv.wnd = seg.wnd;

        self.pending[0] = self.pending[0].without(seg.flags);
        if self.pending[0].is_empty() {
            self.pending[0] = self.pending[1];
            self.pending[1] = Flags::NONE;
            if seg.flags.contains(Flags::FIN) {
                // a FIN queued behind the one just sent is stale
                self.pending[0] = self.pending[0].without(Flags::FIN);
            }
        }

        if seg.flags.contains(Flags::RST) {
            // a listener keeps listening after answering with a reset
            if self.state != State::Listen {
                self.set_state(State::Closed);
            }
            return Ok(());
        }
        if seg.flags.contains(Flags::FIN) {
            match self.state {
                State::Established | State::SynRcvd => self.set_state(State::FinWait1),
                State::CloseWait => self.set_state(State::LastAck),
                _ => {}
            }
        }
        if self.state == State::TimeWait {
            // the final acknowledgment of the passive close went out
            self.set_state(State::Closed);
        }
        Ok(())
    }

    /// Processes an inbound segment summary: admission checks followed
    /// by the per-state transition rules.
    pub fn recv(&mut self, seg: Segment) -> Result<(), RejectError> {
        if seg.wnd > MAX_WINDOW {
            return Err(RejectError::WindowTooLarge { wnd: seg.wnd });
        }
        match self.state {
            State::Closed | State::TimeWait => Err(RejectError::ClosedPipe),
            State::Listen => self.recv_listen(seg),
            State::SynSent => self.recv_syn_sent(seg),
            _ => self.recv_synchronizing(seg),
        }
    }

    fn recv_listen(&mut self, seg: Segment) -> Result<(), RejectError> {
        if seg.flags.contains(Flags::RST) {
            return Err(RejectError::PacketDrop);
        }
        if seg.flags.contains(Flags::ACK) {
            // an acknowledgment to a listener references a connection
            // that no longer exists, answer with a reset
            self.queue_rst(seg.ack);
            return Err(RejectError::AckNotNext {
                ack: seg.ack,
                expected: self.snd.nxt,
            });
        }
        if !seg.flags.contains(Flags::SYN) {
            return Err(RejectError::PacketDrop);
        }
        self.rcv.irs = seg.seq;
        self.rcv.nxt = seg.seq.add(1);
        self.snd.wnd = seg.wnd;
        self.pending[0] = Flags::SYN | Flags::ACK;
        self.set_state(State::SynRcvd);
        Ok(())
    }

    fn recv_syn_sent(&mut self, seg: Segment) -> Result<(), RejectError> {
        if seg.flags.contains(Flags::RST) {
            if seg.flags.contains(Flags::ACK) && seg.ack == self.snd.nxt {
                self.set_state(State::Closed);
                return Ok(());
            }
            return Err(RejectError::PacketDrop);
        }
        if seg.flags.contains(Flags::SYN) {
            if seg.flags.contains(Flags::ACK) {
                if seg.ack != self.snd.nxt {
                    self.queue_rst(seg.ack);
                    return Err(RejectError::AckNotNext {
                        ack: seg.ack,
                        expected: self.snd.nxt,
                    });
                }
                self.rcv.irs = seg.seq;
                self.rcv.nxt = seg.seq.add(1);
                self.snd.una = seg.ack;
                self.snd.wnd = seg.wnd;
                self.pending[0] |= Flags::ACK;
                self.set_state(State::Established);
            } else {
                // simultaneous open
                self.rcv.irs = seg.seq;
                self.rcv.nxt = seg.seq.add(1);
                self.snd.wnd = seg.wnd;
                self.pending[0] = Flags::SYN | Flags::ACK;
                self.set_state(State::SynRcvd);
            }
            return Ok(());
        }
        if seg.flags.contains(Flags::ACK) {
            // old acknowledgment for a connection we know nothing about
            self.queue_rst(seg.ack);
            return Err(RejectError::AckNotNext {
                ack: seg.ack,
                expected: self.snd.nxt,
            });
        }
        Err(RejectError::PacketDrop)
    }

    fn recv_synchronizing(&mut self, seg: Segment) -> Result<(), RejectError> {
        // resets are judged on their sequence number alone
        if seg.flags.contains(Flags::RST) {
            return self.recv_rst(seg);
        }

        // once synchronized a SYN is never acceptable; at the expected
        // sequence number it draws a challenge ACK, outside the window
        // it is dropped without a reply. The send window is never
        // updated from a rejected SYN. In SYN-RCVD the crossing SYN|ACK
        // of a simultaneous open falls through to regular admission.
        if seg.flags.contains(Flags::SYN) && self.state.is_synchronized() {
            if seg.seq.in_window(self.rcv.nxt, self.rcv.wnd) || seg.seq == self.rcv.nxt {
                self.challenge_ack = true;
            }
            trace!("tcb: dropped SYN in state {}", self.state);
            return Err(RejectError::PacketDrop);
        }

        self.check_recv_window(&seg)?;

        // acknowledgment processing
        if seg.flags.contains(Flags::ACK) {
            if self.state == State::SynRcvd {
                if seg.ack != self.snd.una.add(1) {
                    self.queue_rst(seg.ack);
                    return Err(RejectError::AckNotNext {
                        ack: seg.ack,
                        expected: self.snd.una.add(1),
                    });
                }
                self.snd.una = seg.ack;
                self.snd.wnd = seg.wnd;
                self.set_state(State::Established);
            } else if self.snd.nxt.lt(seg.ack) {
                // acknowledgment of data we never sent
                self.pending[0] |= Flags::ACK;
                return Err(RejectError::AckNotNext {
                    ack: seg.ack,
                    expected: self.snd.nxt,
                });
            } else if self.state == State::Established
                && seg.ack.le(self.snd.una)
                && seg.datalen == 0
                && !seg.flags.contains(Flags::FIN)
            {
                // duplicate acknowledgment, dropped without touching
                // the pending queue (a queued FIN must survive)
                trace!("tcb: duplicate ack {}", seg.ack);
                return Ok(());
            } else {
                if self.snd.una.lt(seg.ack) {
                    self.snd.una = seg.ack;
                }
                self.snd.wnd = seg.wnd;
            }
        } else if seg.datalen == 0 && !seg.flags.contains(Flags::FIN) {
            // segment with nothing to process
            return Err(RejectError::PacketDrop);
        }

        // a SYN that survived admission is only possible coming out of
        // SYN-RCVD: the repeated SYN of a simultaneous open. It occupies
        // one sequence number and gets acknowledged like data.
        if seg.flags.contains(Flags::SYN) {
            self.rcv.nxt = self.rcv.nxt.add(1);
            self.pending[0] |= Flags::ACK;
        }

        // payload processing
        if seg.datalen > 0 {
            if !self.state.rx_data_open() {
                self.pending[0] |= Flags::ACK;
                return Err(RejectError::PacketDrop);
            }
            self.rcv.nxt = self.rcv.nxt.add(seg.datalen);
            self.pending[0] |= Flags::ACK;
        }

        // FIN processing
        if seg.flags.contains(Flags::FIN) {
            self.rcv.nxt = self.rcv.nxt.add(1);
            self.pending[0] |= Flags::ACK;
            match self.state {
                State::Established => {
                    // acknowledge now, follow up with our own FIN once
                    // the owner closes
                    self.pending[1] = Flags::FIN;
                    self.set_state(State::CloseWait);
                }
                State::FinWait1 => {
                    if seg.ack == self.snd.nxt && seg.flags.contains(Flags::ACK) {
                        self.set_state(State::TimeWait);
                    } else {
                        self.set_state(State::Closing);
                    }
                }
                State::FinWait2 => self.set_state(State::TimeWait),
                _ => {}
            }
            return Ok(());
        }

        // transitions driven by a plain acknowledgment of our FIN
        if seg.flags.contains(Flags::ACK) && self.snd.una == self.snd.nxt {
            match self.state {
                State::FinWait1 => self.set_state(State::FinWait2),
                State::Closing => self.set_state(State::TimeWait),
                State::LastAck => self.set_state(State::Closed),
                _ => {}
            }
        }
        Ok(())
    }

    fn recv_rst(&mut self, seg: Segment) -> Result<(), RejectError> {
        if seg.seq == self.rcv.nxt {
            if self.state == State::SynRcvd {
                // passive connections return to LISTEN with a fresh
                // initial sequence number
                let iss = self.snd.iss.add(ISS_REOPEN_JUMP);
                let wnd = self.rcv.wnd;
                debug!("tcb: reset in SYN-RCVD, back to listening");
                self.state = State::Closed;
                return self.open(iss, wnd);
            }
            debug!("tcb: reset by peer in state {}", self.state);
            self.set_state(State::Closed);
            return Ok(());
        }
        if seg.seq.in_window(self.rcv.nxt, self.rcv.wnd) {
            // in-window but not exact: challenge the sender, per
            // RFC 5961 blind reset mitigation
            self.challenge_ack = true;
        }
        Err(RejectError::PacketDrop)
    }

    fn check_recv_window(&mut self, seg: &Segment) -> Result<(), RejectError> {
        if self.rcv.wnd == 0 {
            if seg.datalen == 0 && seg.seq == self.rcv.nxt {
                return Ok(());
            }
            self.pending[0] |= Flags::ACK;
            return Err(RejectError::ZeroWindow {
                seq: seg.seq,
                nxt: self.rcv.nxt,
            });
        }
        if !seg.seq.in_window(self.rcv.nxt, self.rcv.wnd) {
            self.pending[0] |= Flags::ACK;
            return Err(RejectError::SeqNotInWindow {
                seq: seg.seq,
                nxt: self.rcv.nxt,
                wnd: self.rcv.wnd,
            });
        }
        if !seg.last().in_window(self.rcv.nxt, self.rcv.wnd) {
            self.pending[0] |= Flags::ACK;
            return Err(RejectError::LastNotInWindow {
                last: seg.last(),
                nxt: self.rcv.nxt,
                wnd: self.rcv.wnd,
            });
        }
        if seg.seq != self.rcv.nxt {
            self.pending[0] |= Flags::ACK;
            return Err(RejectError::RequireSequential {
                seq: seg.seq,
                nxt: self.rcv.nxt,
            });
        }
        Ok(())
    }

    /// Initiates the local side of the connection teardown.
    pub fn close(&mut self) -> Result<(), RejectError> {
        match self.state {
            State::Listen | State::SynSent => {
                self.set_state(State::Closed);
                Ok(())
            }
            State::SynRcvd | State::Established => {
                // the ACK bit already queued (if any) rides along with
                // the FIN
                self.pending[0] |= Flags::FIN;
                Ok(())
            }
            State::CloseWait => {
                // fold the acknowledgment and our FIN into one segment;
                // emitting them separately would leave LAST-ACK waiting
                // for an acknowledgment of a FIN that never went out
                self.pending[0] = Flags::FIN | Flags::ACK;
                self.pending[1] = Flags::NONE;
                self.set_state(State::LastAck);
                Ok(())
            }
            State::Closed => Err(RejectError::ClosedPipe),
            _ => Err(RejectError::ConnectionClosing),
        }
    }

    fn queue_rst(&mut self, at: SeqNum) {
        self.rst_ptr = at;
        self.pending[0] |= Flags::RST;
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            debug!("tcb: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_flags(&self) -> [Flags; 2] {
        self.pending
    }
}
