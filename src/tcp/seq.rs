/// A 32 bit TCP sequence number with the modular comparison rules of
/// RFC 9293 section 3.4.
///
/// Sequence numbers wrap, so `a < b` holds iff the wrapping distance
/// from `a` to `b` is below `2^31`. All sequence comparisons of the
/// engine go through this type, plain integer comparison on sequence
/// numbers is always a bug.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SeqNum(u32);

impl SeqNum {
    pub const ZERO: SeqNum = SeqNum(0);

    #[inline]
    pub const fn new(value: u32) -> SeqNum {
        SeqNum(value)
    }

    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Modular "less than": the wrapping distance from `self` to
    /// `other` is non-zero and below `2^31`.
    #[inline]
    pub fn lt(self, other: SeqNum) -> bool {
        self != other && other.0.wrapping_sub(self.0) < (1 << 31)
    }

    /// Modular "less than or equal".
    #[inline]
    pub fn le(self, other: SeqNum) -> bool {
        self == other || self.lt(other)
    }

    /// True if `self` lies inside the window starting at `nxt` with
    /// size `wnd`: `(self - nxt) mod 2^32 < wnd`.
    #[inline]
    pub fn in_window(self, nxt: SeqNum, wnd: u32) -> bool {
        self.0.wrapping_sub(nxt.0) < wnd
    }

    /// Overflow safe addition.
    #[inline]
    pub fn add(self, n: u32) -> SeqNum {
        SeqNum(self.0.wrapping_add(n))
    }

    /// Wrapping distance from `lo` to `hi`: `(hi - lo) mod 2^32`.
    #[inline]
    pub fn size_of(lo: SeqNum, hi: SeqNum) -> u32 {
        hi.0.wrapping_sub(lo.0)
    }
}

impl From<u32> for SeqNum {
    #[inline]
    fn from(value: u32) -> SeqNum {
        SeqNum(value)
    }
}

impl core::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lt_across_wrap() {
        let a = SeqNum::new(0xffff_fff0);
        let b = SeqNum::new(0x0000_0010);
        assert!(a.lt(b));
        assert!(!b.lt(a));
        assert!(a.le(b));
        assert!(a.le(a));
        assert!(!a.lt(a));
    }

    #[test]
    fn in_window_edges() {
        let nxt = SeqNum::new(1000);
        assert!(!nxt.in_window(nxt, 0));
        assert!(nxt.in_window(nxt, 1));
        assert!(SeqNum::new(1999).in_window(nxt, 1000));
        assert!(!SeqNum::new(2000).in_window(nxt, 1000));
        assert!(!SeqNum::new(999).in_window(nxt, 1000));

        // wrap around
        let nxt = SeqNum::new(0xffff_ff00);
        assert!(SeqNum::new(0x0000_0010).in_window(nxt, 0x1000));
    }

    #[test]
    fn size_of_wraps() {
        assert_eq!(
            32,
            SeqNum::size_of(SeqNum::new(0xffff_fff0), SeqNum::new(0x0000_0010))
        );
        assert_eq!(0, SeqNum::size_of(SeqNum::new(5), SeqNum::new(5)));
    }

    #[test]
    fn display_hex() {
        assert_eq!("0x0000002a", format!("{}", SeqNum::new(42)));
    }

    proptest! {
        #[test]
        fn in_window_at_own_start(a in any::<u32>(), wnd in any::<u32>()) {
            let a = SeqNum::new(a);
            prop_assert_eq!(wnd > 0, a.in_window(a, wnd));
        }

        #[test]
        fn lt_antisymmetric(a in any::<u32>(), b in any::<u32>()) {
            let (a, b) = (SeqNum::new(a), SeqNum::new(b));
            if a.lt(b) {
                prop_assert!(!b.lt(a));
            }
        }

        #[test]
        fn add_then_size_of(a in any::<u32>(), n in 0u32..(1 << 31)) {
            let a = SeqNum::new(a);
            prop_assert_eq!(n, SeqNum::size_of(a, a.add(n)));
        }
    }
}
