use std::net::IpAddr;

use arrayvec::ArrayVec;
use log::{debug, warn};

use crate::err::LenError;
use crate::tcp::{Flags, Handler, HandlerError, Segment, SeqNum, State};
use crate::transport::TcpFrame;
use crate::validate::{AnnotatedError, Validator};

/// Number of stateless resets the listener queues before dropping the
/// oldest. Resets are best-effort replies, losing one only means the
/// peer retries.
pub const RST_QUEUE_CAPACITY: usize = 8;

/// Opaque handle of a connection slot inside a [`ConnPool`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ConnHandle(pub usize);

/// A pooled connection: the TCP handler plus the remote address it is
/// bound to. Owned by the pool, only borrowed by the listener.
#[derive(Debug, Default)]
pub struct Conn {
    handler: Handler,
    remote_addr: Option<IpAddr>,
}

impl Conn {
    pub fn new(handler: Handler) -> Conn {
        Conn {
            handler,
            remote_addr: None,
        }
    }

    #[inline]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    #[inline]
    pub fn handler_mut(&mut self) -> &mut Handler {
        &mut self.handler
    }

    /// The peer this connection talks to, once known.
    #[inline]
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }
}

/// The interface a [`Listener`] uses to borrow connection slots. The
/// pool is the sole owner of connection storage; the listener requests
/// slots, uses them through their handles and hands them back. The
/// pool must not call back into the listener.
pub trait ConnPool {
    /// Borrows a free connection slot together with the initial send
    /// sequence number for it, or `None` when the pool is exhausted.
    fn get_tcp(&mut self) -> Option<(ConnHandle, SeqNum)>;

    /// Returns a previously borrowed slot.
    fn put_tcp(&mut self, handle: ConnHandle);

    /// Resolves a handle to its connection.
    fn conn(&mut self, handle: ConnHandle) -> &mut Conn;
}

/// A connection slot tracked by the listener.
#[derive(Clone, Copy, Debug)]
struct Slot {
    conn: ConnHandle,
    /// Generation id assigned when the slot was populated.
    gen_id: u64,
    /// Free-form tag for the embedding application.
    user_data: u64,
}

/// A queued stateless reset and where to send it.
#[derive(Clone, Copy, Debug)]
struct QueuedRst {
    seg: Segment,
    remote_addr: IpAddr,
    remote_port: u16,
}

/// Description of a frame produced by [`Listener::encapsulate`]: how
/// many bytes were written and which peer they must be carried to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxInfo {
    pub len: usize,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

/// Errors surfaced by the [`Listener`] API.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListenerError {
    /// Ill-formed caller configuration.
    InvalidConfig(&'static str),
    /// The frame is not addressed to the listening port.
    PortMismatch { expected: u16, found: u16 },
    /// The buffer is too small for a TCP header.
    Len(LenError),
    /// The frame failed field validation.
    InvalidFrame(AnnotatedError),
    /// No free slot in the pool; a RST|ACK was queued for the peer.
    PoolExhausted,
    /// The incoming table is full; a RST|ACK was queued for the peer.
    QueueFull,
    /// A non-SYN segment referenced a connection this listener does
    /// not know; a bare RST was queued for the peer.
    UnknownConnection,
    /// The connection's handler refused the frame.
    Handler(HandlerError),
}

impl core::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use ListenerError::*;
        match self {
            InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
            PortMismatch { expected, found } => {
                write!(f, "port {found} does not match listening port {expected}")
            }
            Len(err) => write!(f, "{err}"),
            InvalidFrame(err) => write!(f, "invalid frame: {err}"),
            PoolExhausted => write!(f, "connection pool exhausted"),
            QueueFull => write!(f, "incoming connection table full"),
            UnknownConnection => write!(f, "segment for unknown connection"),
            Handler(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Len(err) => Some(err),
            ListenerError::Handler(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LenError> for ListenerError {
    fn from(err: LenError) -> ListenerError {
        ListenerError::Len(err)
    }
}

impl From<HandlerError> for ListenerError {
    fn from(err: HandlerError) -> ListenerError {
        ListenerError::Handler(err)
    }
}

/// A passive-open endpoint: binds a local port, demultiplexes inbound
/// TCP frames onto connection slots borrowed from a [`ConnPool`], and
/// answers segments it cannot serve with stateless resets.
///
/// The listener is a single-threaded critical section: every entry
/// point takes `&mut self` and none of them blocks or calls back into
/// the pool beyond borrowing & returning slots.
#[derive(Debug)]
pub struct Listener {
    /// Generation counter handed to each populated slot.
    conn_id: u64,
    port: u16,
    incoming: Vec<Slot>,
    accepted: Vec<Slot>,
    max_incoming: usize,
    max_accepted: usize,
    rst_queue: ArrayVec<QueuedRst, RST_QUEUE_CAPACITY>,
}

impl Listener {
    /// Binds a listener to `port` with room for `max_incoming`
    /// handshaking and `max_accepted` established connections.
    pub fn new(
        port: u16,
        max_incoming: usize,
        max_accepted: usize,
    ) -> Result<Listener, ListenerError> {
        if port == 0 {
            return Err(ListenerError::InvalidConfig("port must be non-zero"));
        }
        if max_incoming == 0 || max_accepted == 0 {
            return Err(ListenerError::InvalidConfig(
                "incoming and accepted tables must not be empty",
            ));
        }
        Ok(Listener {
            conn_id: 0,
            port,
            incoming: Vec::with_capacity(max_incoming),
            accepted: Vec::with_capacity(max_accepted),
            max_incoming,
            max_accepted,
            rst_queue: ArrayVec::new(),
        })
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of connections still in the handshake.
    #[inline]
    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    /// Number of accepted connections.
    #[inline]
    pub fn accepted_len(&self) -> usize {
        self.accepted.len()
    }

    /// Number of queued stateless resets.
    #[inline]
    pub fn queued_rsts(&self) -> usize {
        self.rst_queue.len()
    }

    /// Demultiplexes one inbound TCP frame arriving from `src_addr`.
    pub fn demux<P: ConnPool>(
        &mut self,
        pool: &mut P,
        src_addr: IpAddr,
        wire: &mut [u8],
    ) -> Result<(), ListenerError> {
        let (src_port, flags, seq, ack) = {
            let frame = TcpFrame::from_slice(wire)?;
            let mut v = Validator::new();
            frame.validate_except_crc(&mut v);
            if let Err(err) = v.result() {
                return Err(ListenerError::InvalidFrame(err));
            }
            if frame.destination_port() != self.port {
                return Err(ListenerError::PortMismatch {
                    expected: self.port,
                    found: frame.destination_port(),
                });
            }
            (
                frame.source_port(),
                frame.flags(),
                SeqNum::new(frame.sequence_number()),
                SeqNum::new(frame.acknowledgment_number()),
            )
        };

        // a slot already talking to this peer wins
        if let Some(handle) = self.find_match(pool, src_addr, src_port) {
            return pool
                .conn(handle)
                .handler_mut()
                .recv(wire)
                .map_err(ListenerError::from);
        }

        if flags == Flags::SYN {
            return self.admit_syn(pool, src_addr, src_port, seq, wire);
        }

        if flags.contains(Flags::RST) {
            // resets to unknown connections die here
            return Ok(());
        }
        if flags.contains(Flags::ACK) {
            // any other segment to a connection we do not know draws a
            // bare reset at the sequence number the peer expects
            self.queue_rst(QueuedRst {
                seg: Segment::rst(ack),
                remote_addr: src_addr,
                remote_port: src_port,
            });
            return Err(ListenerError::UnknownConnection);
        }
        Ok(())
    }

    fn admit_syn<P: ConnPool>(
        &mut self,
        pool: &mut P,
        src_addr: IpAddr,
        src_port: u16,
        client_seq: SeqNum,
        wire: &mut [u8],
    ) -> Result<(), ListenerError> {
        if self.incoming.len() >= self.max_incoming {
            self.refuse_syn(src_addr, src_port, client_seq);
            return Err(ListenerError::QueueFull);
        }
        let (handle, iss) = match pool.get_tcp() {
            Some(got) => got,
            None => {
                self.refuse_syn(src_addr, src_port, client_seq);
                return Err(ListenerError::PoolExhausted);
            }
        };

        let port = self.port;
        let opened = {
            let conn = pool.conn(handle);
            conn.remote_addr = Some(src_addr);
            match conn.handler_mut().open_listen(port, iss) {
                Ok(()) => conn.handler_mut().recv(wire),
                Err(err) => Err(err),
            }
        };
        if let Err(err) = opened {
            let conn = pool.conn(handle);
            conn.remote_addr = None;
            conn.handler_mut().abort();
            pool.put_tcp(handle);
            return Err(err.into());
        }

        self.conn_id = self.conn_id.wrapping_add(1);
        self.incoming.push(Slot {
            conn: handle,
            gen_id: self.conn_id,
            user_data: 0,
        });
        debug!("listener: SYN admitted from port {}", src_port);
        Ok(())
    }

    /// Queues the RST|ACK answering a SYN that cannot be served.
    fn refuse_syn(&mut self, src_addr: IpAddr, src_port: u16, client_seq: SeqNum) {
        self.queue_rst(QueuedRst {
            seg: Segment::rst_ack(client_seq),
            remote_addr: src_addr,
            remote_port: src_port,
        });
    }

    fn queue_rst(&mut self, rst: QueuedRst) {
        if self.rst_queue.is_full() {
            warn!("listener: reset queue full, dropping oldest");
            self.rst_queue.remove(0);
        }
        self.rst_queue.push(rst);
    }

    fn find_match<P: ConnPool>(
        &self,
        pool: &mut P,
        src_addr: IpAddr,
        src_port: u16,
    ) -> Option<ConnHandle> {
        for slot in self.accepted.iter().chain(self.incoming.iter()) {
            let conn = pool.conn(slot.conn);
            if conn.remote_addr() == Some(src_addr) && conn.handler().remote_port() == src_port {
                return Some(slot.conn);
            }
        }
        None
    }

    /// Promotes the first incoming connection that finished its
    /// handshake into the accepted table and returns its handle.
    pub fn try_accept<P: ConnPool>(&mut self, pool: &mut P) -> Option<ConnHandle> {
        if self.accepted.len() >= self.max_accepted {
            return None;
        }
        let pos = self
            .incoming
            .iter()
            .position(|slot| pool.conn(slot.conn).handler().state() == State::Established)?;
        let slot = self.incoming.remove(pos);
        let handle = slot.conn;
        self.accepted.push(slot);
        Some(handle)
    }

    /// Reaps handshaking slots whose connection died: state moved past
    /// ESTABLISHED, fell back to LISTEN (reset during the handshake)
    /// or closed entirely. Reaped slots go back to the pool.
    pub fn maintain_conns<P: ConnPool>(&mut self, pool: &mut P) {
        let mut i = 0;
        while i < self.incoming.len() {
            let state = pool.conn(self.incoming[i].conn).handler().state();
            let dead = !matches!(state, State::SynRcvd | State::Established);
            if dead {
                let slot = self.incoming.remove(i);
                debug!("listener: reaping handshake slot in state {}", state);
                pool.conn(slot.conn).handler_mut().abort();
                pool.conn(slot.conn).remote_addr = None;
                pool.put_tcp(slot.conn);
            } else {
                i += 1;
            }
        }
    }

    /// Produces the next outbound frame into `carrier[offset..]`:
    /// handshake replies of incoming slots first, then traffic of
    /// accepted connections, then queued stateless resets. Returns
    /// `None` when nothing needs to be sent.
    pub fn encapsulate<P: ConnPool>(
        &mut self,
        pool: &mut P,
        carrier: &mut [u8],
        offset: usize,
    ) -> Result<Option<TxInfo>, ListenerError> {
        let out = &mut carrier[offset..];

        // connection traffic has priority over stateless replies
        for table in [&mut self.incoming, &mut self.accepted] {
            let mut i = 0;
            while i < table.len() {
                let handle = table[i].conn;
                let conn = pool.conn(handle);
                let remote_addr = match conn.remote_addr() {
                    Some(addr) => addr,
                    // a slot without a peer has nothing to transmit
                    None => {
                        i += 1;
                        continue;
                    }
                };
                match conn.handler_mut().send(out) {
                    Ok(0) => i += 1,
                    Ok(len) => {
                        let remote_port = pool.conn(handle).handler().remote_port();
                        return Ok(Some(TxInfo {
                            len,
                            remote_addr,
                            remote_port,
                        }));
                    }
                    Err(HandlerError::Closed) => {
                        // the connection ended; the slot goes home
                        let slot = table.remove(i);
                        pool.conn(slot.conn).handler_mut().abort();
                        pool.conn(slot.conn).remote_addr = None;
                        pool.put_tcp(slot.conn);
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        if let Some(rst) = self.rst_queue.first().copied() {
            if out.len() < TcpFrame::LEN {
                return Err(ListenerError::Handler(HandlerError::ShortBuffer {
                    required: TcpFrame::LEN,
                    len: out.len(),
                }));
            }
            self.rst_queue.remove(0);
            out[..TcpFrame::LEN].fill(0);
            let mut frame = TcpFrame::from_slice(&mut out[..TcpFrame::LEN])?;
            frame.set_source_port(self.port);
            frame.set_destination_port(rst.remote_port);
            frame.set_data_offset(TcpFrame::MIN_DATA_OFFSET);
            frame.set_segment(&rst.seg);
            return Ok(Some(TxInfo {
                len: TcpFrame::LEN,
                remote_addr: rst.remote_addr,
                remote_port: rst.remote_port,
            }));
        }
        Ok(None)
    }

    /// Free-form tag of an accepted or incoming slot.
    pub fn user_data(&self, handle: ConnHandle) -> Option<u64> {
        self.slot(handle).map(|slot| slot.user_data)
    }

    pub fn set_user_data(&mut self, handle: ConnHandle, value: u64) -> bool {
        for slot in self.incoming.iter_mut().chain(self.accepted.iter_mut()) {
            if slot.conn == handle {
                slot.user_data = value;
                return true;
            }
        }
        false
    }

    /// Generation id assigned to the slot when it was populated.
    pub fn gen_id(&self, handle: ConnHandle) -> Option<u64> {
        self.slot(handle).map(|slot| slot.gen_id)
    }

    fn slot(&self, handle: ConnHandle) -> Option<&Slot> {
        self.incoming
            .iter()
            .chain(self.accepted.iter())
            .find(|slot| slot.conn == handle)
    }
}
