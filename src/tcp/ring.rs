use log::trace;

use crate::tcp::SeqNum;

/// Errors of the retransmission ring.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RingError {
    /// The caller supplied an unusable buffer or packet table size.
    InvalidConfig(&'static str),
    /// All packet descriptors are in use.
    TxQueueFull,
    /// The acknowledgment is older than the oldest unacknowledged
    /// sequence number.
    StaleAck { ack: SeqNum, oldest: SeqNum },
    /// A packet was cut with a sequence number below the end of the
    /// previously cut packet.
    SeqRegression { seq: SeqNum, expected: SeqNum },
}

impl core::fmt::Display for RingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use RingError::*;
        match self {
            InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
            TxQueueFull => write!(f, "all packet descriptors are in use"),
            StaleAck { ack, oldest } => {
                write!(f, "acknowledgment {ack} is older than oldest in-flight {oldest}")
            }
            SeqRegression { seq, expected } => {
                write!(f, "packet sequence {seq} regresses behind {expected}")
            }
        }
    }
}

impl std::error::Error for RingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Descriptor of one in-flight packet: where its bytes live in the ring
/// and which sequence numbers they occupy. `size == 0` marks the slot
/// unused.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct PacketDesc {
    /// Ring offset of the first byte.
    off: usize,
    /// Ring offset one past the last byte (wrapped).
    end: usize,
    /// Sequence number of the first byte.
    seq: SeqNum,
    /// Number of bytes.
    size: u32,
}

impl PacketDesc {
    #[inline]
    fn is_free(&self) -> bool {
        self.size == 0
    }

    fn clear(&mut self) {
        *self = PacketDesc::default();
    }
}

/// A circular byte buffer coupling the user's outbound stream to the
/// queue of in-flight TCP segments.
///
/// The buffer is partitioned into three regions that chase each other
/// around the ring: free space, bytes sent but not yet acknowledged,
/// and bytes written but not yet cut into a packet. `write` appends to
/// the unsent region, `make_packet` moves bytes from unsent to sent
/// while recording a descriptor, and `recv_ack` releases sent bytes.
/// `free + sent + unsent == capacity` holds at all times, which keeps
/// the ring unambiguous at the wrap point.
#[derive(Debug, Default)]
pub struct RetransmitRing {
    buf: Vec<u8>,
    packets: Vec<PacketDesc>,
    /// Ring offset of the oldest unacknowledged byte.
    sent_off: usize,
    /// Bytes sent and not yet acknowledged.
    sent_len: usize,
    /// Bytes written and not yet sent. The unsent region starts at
    /// `(sent_off + sent_len) % capacity`, directly after the sent
    /// region.
    unsent_len: usize,
    /// End of the sequence space cut into packets so far; the next
    /// packet must start at or after it.
    next_seq: SeqNum,
    /// True once a packet was cut (gives `next_seq` meaning).
    primed: bool,
}

impl RetransmitRing {
    /// Creates a ring over `buf` with a table of `max_packets`
    /// descriptors.
    pub fn new(buf: Vec<u8>, max_packets: usize) -> Result<RetransmitRing, RingError> {
        let mut ring = RetransmitRing::default();
        ring.reset(buf, max_packets)?;
        Ok(ring)
    }

    /// Replaces the buffer & descriptor table and clears all regions.
    pub fn reset(&mut self, buf: Vec<u8>, max_packets: usize) -> Result<(), RingError> {
        if max_packets == 0 {
            return Err(RingError::InvalidConfig("packet table must not be empty"));
        }
        if buf.len() < max_packets.max(2) {
            return Err(RingError::InvalidConfig(
                "buffer must hold at least 2 bytes and one byte per packet",
            ));
        }
        self.buf = buf;
        self.packets = vec![PacketDesc::default(); max_packets];
        self.sent_off = 0;
        self.sent_len = 0;
        self.unsent_len = 0;
        self.next_seq = SeqNum::ZERO;
        self.primed = false;
        Ok(())
    }

    /// Clears all regions and descriptors while keeping the buffer.
    pub fn clear(&mut self) {
        for packet in &mut self.packets {
            packet.clear();
        }
        self.sent_off = 0;
        self.sent_len = 0;
        self.unsent_len = 0;
        self.next_seq = SeqNum::ZERO;
        self.primed = false;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes sent and awaiting acknowledgment.
    #[inline]
    pub fn sent(&self) -> usize {
        self.sent_len
    }

    /// Bytes written and not yet cut into a packet.
    #[inline]
    pub fn unsent(&self) -> usize {
        self.unsent_len
    }

    /// Free space available to `write`. The write head stops at the
    /// sent region, so unacknowledged bytes are never overwritten.
    #[inline]
    pub fn free(&self) -> usize {
        self.buf.len() - self.sent_len - self.unsent_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sent_len == 0 && self.unsent_len == 0
    }

    #[inline]
    fn unsent_off(&self) -> usize {
        (self.sent_off + self.sent_len) % self.buf.len()
    }

    /// Appends bytes to the unsent region. Partial writes happen when
    /// the free space runs out; the number of bytes taken is returned.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        let mut off = (self.unsent_off() + self.unsent_len) % self.buf.len();
        for &byte in &bytes[..n] {
            self.buf[off] = byte;
            off = (off + 1) % self.buf.len();
        }
        self.unsent_len += n;
        n
    }

    /// Cuts a packet from the head of the unsent region: copies up to
    /// `dst.len()` bytes into `dst`, records a descriptor tagged with
    /// `seq` and moves the bytes into the sent region.
    pub fn make_packet(&mut self, dst: &mut [u8], seq: SeqNum) -> Result<usize, RingError> {
        let n = dst.len().min(self.unsent_len);
        if n == 0 {
            return Ok(0);
        }
        if self.primed && seq.lt(self.next_seq) {
            return Err(RingError::SeqRegression {
                seq,
                expected: self.next_seq,
            });
        }
        let slot = match self.packets.iter().position(PacketDesc::is_free) {
            Some(slot) => slot,
            None => return Err(RingError::TxQueueFull),
        };

        let off = self.unsent_off();
        let mut src = off;
        for dst_byte in dst[..n].iter_mut() {
            *dst_byte = self.buf[src];
            src = (src + 1) % self.buf.len();
        }

        self.packets[slot] = PacketDesc {
            off,
            end: src,
            seq,
            size: n as u32,
        };
        self.sent_len += n;
        self.unsent_len -= n;
        self.next_seq = seq.add(n as u32);
        self.primed = true;
        trace!("ring: cut packet seq {} len {}", seq, n);
        Ok(n)
    }

    /// Sequence number of the oldest byte still awaiting an
    /// acknowledgment.
    fn oldest_seq(&self) -> Option<SeqNum> {
        self.packets
            .iter()
            .filter(|p| !p.is_free())
            .map(|p| p.seq)
            .reduce(|a, b| if b.lt(a) { b } else { a })
    }

    /// Releases every packet fully covered by `ack` and trims a packet
    /// covered partially. The freed bytes return to the free region;
    /// once nothing is in flight and nothing is left unsent the ring
    /// compacts back to offset zero.
    pub fn recv_ack(&mut self, ack: SeqNum) -> Result<(), RingError> {
        let oldest = match self.oldest_seq() {
            Some(oldest) => oldest,
            None => {
                return Err(RingError::StaleAck {
                    ack,
                    oldest: self.next_seq,
                })
            }
        };
        if ack.lt(oldest) {
            return Err(RingError::StaleAck { ack, oldest });
        }

        let mut freed = 0usize;
        let capacity = self.buf.len();
        for packet in self.packets.iter_mut().filter(|p| !p.is_free()) {
            debug_assert_eq!(packet.end, (packet.off + packet.size as usize) % capacity);
            let end = packet.seq.add(packet.size);
            if end.le(ack) {
                // fully acknowledged
                freed += packet.size as usize;
                packet.clear();
            } else if packet.seq.lt(ack) {
                // partially acknowledged: the descriptor is rewritten
                // to cover only the remainder
                let covered = SeqNum::size_of(packet.seq, ack);
                packet.off = (packet.off + covered as usize) % self.buf.len();
                packet.seq = ack;
                packet.size -= covered;
                freed += covered as usize;
            }
        }

        self.sent_off = (self.sent_off + freed) % self.buf.len();
        self.sent_len -= freed;
        if self.is_empty() {
            self.sent_off = 0;
        }
        trace!("ring: ack {} freed {} bytes", ack, freed);
        Ok(())
    }
}

/// A plain circular byte queue buffering inbound payload until the
/// owner reads it. Unlike the retransmission ring it needs no
/// descriptors, bytes leave in the order they arrived.
#[derive(Debug, Default)]
pub struct RecvRing {
    buf: Vec<u8>,
    off: usize,
    len: usize,
}

impl RecvRing {
    pub fn new(capacity: usize) -> RecvRing {
        RecvRing {
            buf: vec![0; capacity],
            off: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Appends bytes, truncating to the free space. Returns the number
    /// of bytes stored.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        if n == 0 {
            return 0;
        }
        let mut dst = (self.off + self.len) % self.buf.len();
        for &byte in &bytes[..n] {
            self.buf[dst] = byte;
            dst = (dst + 1) % self.buf.len();
        }
        self.len += n;
        n
    }

    /// Moves up to `dst.len()` buffered bytes into `dst`.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        for dst_byte in dst[..n].iter_mut() {
            *dst_byte = self.buf[self.off];
            self.off = (self.off + 1) % self.buf.len();
        }
        self.len -= n;
        if self.len == 0 {
            self.off = 0;
        }
        n
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.off = 0;
        self.len = 0;
    }
}
