use crate::tcp::SeqNum;

/// TCP control flags as laid out in byte 13 of the TCP header.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// No more data from sender.
    pub const FIN: Flags = Flags(0b0000_0001);
    /// Synchronize sequence numbers.
    pub const SYN: Flags = Flags(0b0000_0010);
    /// Reset the connection.
    pub const RST: Flags = Flags(0b0000_0100);
    /// Push function.
    pub const PSH: Flags = Flags(0b0000_1000);
    /// Acknowledgment field is significant.
    pub const ACK: Flags = Flags(0b0001_0000);
    /// Urgent pointer field is significant.
    pub const URG: Flags = Flags(0b0010_0000);

    #[inline]
    pub const fn from_bits(bits: u8) -> Flags {
        Flags(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every flag in `other` is also set in `self`.
    #[inline]
    pub const fn contains(self, other: Flags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// True if any flag in `other` is set in `self`.
    #[inline]
    pub const fn intersects(self, other: Flags) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    #[inline]
    pub const fn without(self, other: Flags) -> Flags {
        Flags(self.0 & !other.0)
    }
}

impl core::ops::BitOr for Flags {
    type Output = Flags;
    #[inline]
    fn bitor(self, rhs: Flags) -> Flags {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for Flags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl core::fmt::Display for Flags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return write!(f, "[]");
        }
        let names = [
            (Flags::FIN, "FIN"),
            (Flags::SYN, "SYN"),
            (Flags::RST, "RST"),
            (Flags::PSH, "PSH"),
            (Flags::ACK, "ACK"),
            (Flags::URG, "URG"),
        ];
        write!(f, "[")?;
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        write!(f, "]")
    }
}

/// Summary of a TCP segment as seen by the control block: the header
/// fields that drive the state machine plus the payload length.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Segment {
    /// Sequence number of the first octet.
    pub seq: SeqNum,
    /// Acknowledgment number (only meaningful with [`Flags::ACK`]).
    pub ack: SeqNum,
    /// Number of payload octets.
    pub datalen: u32,
    /// Advertised receive window.
    pub wnd: u32,
    /// Control flags.
    pub flags: Flags,
}

impl Segment {
    /// Sequence space consumed by the segment. SYN and FIN each occupy
    /// one sequence number in addition to the payload.
    #[inline]
    pub fn len(&self) -> u32 {
        self.datalen
            + u32::from(self.flags.contains(Flags::SYN))
            + u32::from(self.flags.contains(Flags::FIN))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number of the last octet of the segment, or `seq`
    /// itself when the segment consumes no sequence space.
    #[inline]
    pub fn last(&self) -> SeqNum {
        let len = self.len();
        if len == 0 {
            self.seq
        } else {
            self.seq.add(len - 1)
        }
    }

    /// The opening SYN of an active open, to be passed to
    /// `ControlBlock::send` from the CLOSED state.
    pub fn syn(iss: SeqNum, wnd: u32) -> Segment {
        Segment {
            seq: iss,
            ack: SeqNum::ZERO,
            datalen: 0,
            wnd,
            flags: Flags::SYN,
        }
    }

    /// A bare reset for a segment that referenced sequence `seq`.
    pub fn rst(seq: SeqNum) -> Segment {
        Segment {
            seq,
            ack: SeqNum::ZERO,
            datalen: 0,
            wnd: 0,
            flags: Flags::RST,
        }
    }

    /// The reset sent in response to a SYN that cannot be served:
    /// `seq = 0`, `ack` past the client's SYN.
    pub fn rst_ack(client_seq: SeqNum) -> Segment {
        Segment {
            seq: SeqNum::ZERO,
            ack: client_seq.add(1),
            datalen: 0,
            wnd: 0,
            flags: Flags::RST.union(Flags::ACK),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_set_ops() {
        let f = Flags::SYN | Flags::ACK;
        assert!(f.contains(Flags::SYN));
        assert!(f.contains(Flags::SYN | Flags::ACK));
        assert!(!f.contains(Flags::SYN | Flags::FIN));
        assert!(f.intersects(Flags::FIN | Flags::ACK));
        assert!(!f.intersects(Flags::FIN | Flags::RST));
        assert_eq!(Flags::ACK, f.without(Flags::SYN));
        assert!(Flags::NONE.is_empty());

        let mut g = Flags::NONE;
        g |= Flags::FIN;
        assert_eq!(Flags::FIN, g);
    }

    #[test]
    fn flags_display() {
        assert_eq!("[]", format!("{}", Flags::NONE));
        assert_eq!("[SYN]", format!("{}", Flags::SYN));
        assert_eq!("[FIN,ACK]", format!("{}", Flags::FIN | Flags::ACK));
    }

    #[test]
    fn segment_len() {
        let mut seg = Segment {
            seq: SeqNum::new(100),
            ack: SeqNum::ZERO,
            datalen: 10,
            wnd: 1000,
            flags: Flags::ACK,
        };
        assert_eq!(10, seg.len());
        assert_eq!(SeqNum::new(109), seg.last());

        seg.flags = Flags::SYN | Flags::FIN;
        assert_eq!(12, seg.len());
        assert_eq!(SeqNum::new(111), seg.last());

        seg.flags = Flags::ACK;
        seg.datalen = 0;
        assert_eq!(0, seg.len());
        assert_eq!(seg.seq, seg.last());
    }

    #[test]
    fn constructors() {
        let syn = Segment::syn(SeqNum::new(100), 1000);
        assert_eq!(Flags::SYN, syn.flags);
        assert_eq!(1, syn.len());

        let rst = Segment::rst(SeqNum::new(77));
        assert_eq!(Flags::RST, rst.flags);
        assert_eq!(SeqNum::new(77), rst.seq);
        assert_eq!(0, rst.len());

        let rst_ack = Segment::rst_ack(SeqNum::new(200));
        assert_eq!(Flags::RST | Flags::ACK, rst_ack.flags);
        assert_eq!(SeqNum::ZERO, rst_ack.seq);
        assert_eq!(SeqNum::new(201), rst_ack.ack);
    }
}
