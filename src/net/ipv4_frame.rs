use crate::checksum::Sum16BitWords;
use crate::err::{FieldError, Layer, LenError, LenSource};
use crate::*;

/// A zero-copy view over a buffer containing an IPv4 packet (RFC 791).
///
/// Accessors are pure functions of the buffer. The variable sized options
/// region (when `ihl > 5`) is only trusted after [`Ipv4Frame::validate_size`]
/// ran without recording errors.
#[derive(Debug)]
pub struct Ipv4Frame<'a> {
    slice: &'a mut [u8],
}

impl<'a> Ipv4Frame<'a> {
    /// Length of the fixed IPv4 header without options.
    pub const LEN: usize = 20;

    /// Maximum length of an IPv4 header (options included).
    pub const MAX_HEADER_LEN: usize = 60;

    /// Creates a packet view over the given buffer. The buffer must at
    /// least contain the fixed 20 byte header.
    pub fn from_slice(slice: &'a mut [u8]) -> Result<Ipv4Frame<'a>, LenError> {
        if slice.len() < Ipv4Frame::LEN {
            return Err(LenError {
                required_len: Ipv4Frame::LEN,
                len: slice.len(),
                len_source: LenSource::Slice,
                layer: Layer::Ipv4Header,
                layer_start_offset: 0,
            });
        }
        Ok(Ipv4Frame { slice })
    }

    /// Returns the complete underlying buffer.
    #[inline]
    pub fn slice(&self) -> &[u8] {
        self.slice
    }

    /// Read the "version" field (4 bit).
    #[inline]
    pub fn version(&self) -> u8 {
        self.slice[0] >> 4
    }

    /// Read the "internet header length" field (4 bit, in 32 bit words).
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.slice[0] & 0x0f
    }

    /// Set version & internet header length in one write.
    #[inline]
    pub fn set_version_and_ihl(&mut self, version: u8, ihl: u8) {
        self.slice[0] = (version << 4) | (ihl & 0x0f);
    }

    /// Read the "type of service" byte.
    #[inline]
    pub fn tos(&self) -> u8 {
        self.slice[1]
    }

    #[inline]
    pub fn set_tos(&mut self, value: u8) {
        self.slice[1] = value;
    }

    /// Read the "total length" field (header + payload in bytes).
    #[inline]
    pub fn total_len(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(2)) }
    }

    #[inline]
    pub fn set_total_len(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(2), value) }
    }

    /// Read the fragment identification field.
    #[inline]
    pub fn identification(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(4)) }
    }

    #[inline]
    pub fn set_identification(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(4), value) }
    }

    /// Read the reserved flag bit (the "evil bit" of RFC 3514).
    #[inline]
    pub fn evil_bit(&self) -> bool {
        0 != (self.slice[6] & 0b1000_0000)
    }

    /// Read the "don't fragment" flag.
    #[inline]
    pub fn dont_fragment(&self) -> bool {
        0 != (self.slice[6] & 0b0100_0000)
    }

    #[inline]
    pub fn set_dont_fragment(&mut self, value: bool) {
        if value {
            self.slice[6] |= 0b0100_0000;
        } else {
            self.slice[6] &= !0b0100_0000;
        }
    }

    /// Read the "more fragments" flag.
    #[inline]
    pub fn more_fragments(&self) -> bool {
        0 != (self.slice[6] & 0b0010_0000)
    }

    /// Read the fragment offset field (13 bit, in 8 byte units).
    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(6)) & 0x1fff }
    }

    /// Read the "time to live" field.
    #[inline]
    pub fn ttl(&self) -> u8 {
        self.slice[8]
    }

    #[inline]
    pub fn set_ttl(&mut self, value: u8) {
        self.slice[8] = value;
    }

    /// Read the transport protocol number.
    #[inline]
    pub fn protocol(&self) -> u8 {
        self.slice[9]
    }

    #[inline]
    pub fn set_protocol(&mut self, value: u8) {
        self.slice[9] = value;
    }

    /// Read the header checksum field.
    #[inline]
    pub fn header_checksum(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(10)) }
    }

    #[inline]
    pub fn set_header_checksum(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(10), value) }
    }

    /// Read the source address.
    #[inline]
    pub fn source(&self) -> [u8; 4] {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { get_unchecked_4_byte_array(self.slice.as_ptr().add(12)) }
    }

    #[inline]
    pub fn set_source(&mut self, value: [u8; 4]) {
        self.slice[12..16].copy_from_slice(&value);
    }

    /// Read the destination address.
    #[inline]
    pub fn destination(&self) -> [u8; 4] {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv4Frame::LEN (20).
        unsafe { get_unchecked_4_byte_array(self.slice.as_ptr().add(16)) }
    }

    #[inline]
    pub fn set_destination(&mut self, value: [u8; 4]) {
        self.slice[16..20].copy_from_slice(&value);
    }

    /// Length of the header in bytes as described by the IHL field.
    #[inline]
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl()) * 4
    }

    /// The bytes after the variable sized header. Only call after
    /// [`Ipv4Frame::validate_size`] ran clean, the IHL field is trusted.
    pub fn payload(&self) -> &[u8] {
        &self.slice[self.header_len().min(self.slice.len())..]
    }

    /// Mutable access to the bytes after the variable sized header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.header_len().min(self.slice.len());
        &mut self.slice[start..]
    }

    /// Verifies IHL & total length against each other and the buffer,
    /// recording errors into `v`.
    pub fn validate_size(&self, v: &mut Validator) {
        let header_len = self.header_len();
        if self.ihl() < 5 {
            v.push(
                FieldError::LengthFieldTooSmall {
                    layer: Layer::Ipv4Header,
                    len: header_len,
                    min_len: Ipv4Frame::LEN,
                },
                4,
            );
        } else if header_len > self.slice.len() {
            v.push(
                FieldError::LengthFieldExceedsBuffer {
                    layer: Layer::Ipv4Header,
                    len: header_len,
                    buffer_len: self.slice.len(),
                },
                4,
            );
        }
        let total_len = usize::from(self.total_len());
        if total_len < header_len {
            v.push(
                FieldError::LengthFieldTooSmall {
                    layer: Layer::Ipv4Header,
                    len: total_len,
                    min_len: header_len,
                },
                16,
            );
        } else if total_len > self.slice.len() {
            v.push(
                FieldError::LengthFieldExceedsBuffer {
                    layer: Layer::Ipv4Header,
                    len: total_len,
                    buffer_len: self.slice.len(),
                },
                16,
            );
        }
    }

    /// Runs [`Ipv4Frame::validate_size`] plus the field checks that do not
    /// require checksum calculation: the version nibble and (optionally)
    /// the RFC 3514 "evil bit" policy.
    pub fn validate_except_crc(&self, v: &mut Validator, reject_evil_bit: bool) {
        self.validate_size(v);
        if self.version() != 4 {
            v.push(
                FieldError::UnexpectedVersion {
                    layer: Layer::Ipv4Header,
                    version: self.version(),
                },
                0,
            );
        }
        if reject_evil_bit && self.evil_bit() {
            v.push(FieldError::EvilBitSet, 48);
        }
    }

    /// Calculates the header checksum of the current header contents.
    /// The checksum field itself is skipped.
    pub fn calc_header_checksum(&self) -> u16 {
        let header_len = self.header_len().min(self.slice.len());
        Sum16BitWords::new()
            .add_slice(&self.slice[..10])
            .add_slice(&self.slice[12..header_len])
            .ones_complement()
    }

    /// Folds source & destination address, protocol and the payload
    /// length into a checksum accumulator, forming the IPv4 pseudo
    /// header used by the TCP & UDP checksums.
    pub fn pseudo_header_checksum(&self) -> Sum16BitWords {
        let payload_len = u16::from(self.total_len()).saturating_sub(self.header_len() as u16);
        Sum16BitWords::new()
            .add_4bytes(self.source())
            .add_4bytes(self.destination())
            .add_2bytes([0, self.protocol()])
            .add_2bytes(payload_len.to_be_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_slice_len_checks() {
        for len in 0..Ipv4Frame::LEN {
            let mut buf = vec![0u8; len];
            assert_eq!(
                Ipv4Frame::from_slice(&mut buf).unwrap_err(),
                LenError {
                    required_len: Ipv4Frame::LEN,
                    len,
                    len_source: LenSource::Slice,
                    layer: Layer::Ipv4Header,
                    layer_start_offset: 0,
                }
            );
        }
    }

    proptest! {
        #[test]
        fn getters_setters_roundtrip(
            tos in any::<u8>(),
            total_len in any::<u16>(),
            id in any::<u16>(),
            ttl in any::<u8>(),
            protocol in any::<u8>(),
            checksum in any::<u16>(),
            source in proptest::array::uniform4(any::<u8>()),
            destination in proptest::array::uniform4(any::<u8>()),
        ) {
            let mut buf = [0u8; 20];
            let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
            frame.set_version_and_ihl(4, 5);
            frame.set_tos(tos);
            frame.set_total_len(total_len);
            frame.set_identification(id);
            frame.set_ttl(ttl);
            frame.set_protocol(protocol);
            frame.set_header_checksum(checksum);
            frame.set_source(source);
            frame.set_destination(destination);

            prop_assert_eq!(4, frame.version());
            prop_assert_eq!(5, frame.ihl());
            prop_assert_eq!(tos, frame.tos());
            prop_assert_eq!(total_len, frame.total_len());
            prop_assert_eq!(id, frame.identification());
            prop_assert_eq!(ttl, frame.ttl());
            prop_assert_eq!(protocol, frame.protocol());
            prop_assert_eq!(checksum, frame.header_checksum());
            prop_assert_eq!(source, frame.source());
            prop_assert_eq!(destination, frame.destination());
        }
    }

    #[test]
    fn flags() {
        let mut buf = [0u8; 20];
        let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
        assert!(!frame.dont_fragment());
        frame.set_dont_fragment(true);
        assert!(frame.dont_fragment());
        assert!(!frame.evil_bit());
        assert!(!frame.more_fragments());
        assert_eq!(0, frame.fragment_offset());
        frame.set_dont_fragment(false);
        assert!(!frame.dont_fragment());
    }

    #[test]
    fn validate_size() {
        // ihl below minimum
        {
            let mut buf = [0u8; 20];
            let mut v = Validator::new();
            {
                let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
                frame.set_version_and_ihl(4, 4);
                frame.set_total_len(20);
                frame.validate_size(&mut v);
            }
            assert_eq!(1, v.len());
        }
        // ihl exceeding the buffer
        {
            let mut buf = [0u8; 20];
            let mut v = Validator::new();
            {
                let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
                frame.set_version_and_ihl(4, 6);
                frame.set_total_len(20);
                frame.validate_size(&mut v);
            }
            // total_len (20) is also below the header length (24)
            assert_eq!(2, v.len());
        }
        // total length exceeding the buffer
        {
            let mut buf = [0u8; 20];
            let mut v = Validator::new();
            {
                let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
                frame.set_version_and_ihl(4, 5);
                frame.set_total_len(21);
                frame.validate_size(&mut v);
            }
            assert_eq!(1, v.len());
        }
        // well formed
        {
            let mut buf = [0u8; 40];
            let mut v = Validator::new();
            {
                let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
                frame.set_version_and_ihl(4, 5);
                frame.set_total_len(40);
                frame.validate_size(&mut v);
            }
            assert!(v.is_ok());
        }
    }

    #[test]
    fn validate_except_crc() {
        let mut buf = [0u8; 20];
        {
            let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
            frame.set_version_and_ihl(6, 5);
            frame.set_total_len(20);
            let mut v = Validator::new();
            frame.validate_except_crc(&mut v, false);
            assert_eq!(
                FieldError::UnexpectedVersion {
                    layer: Layer::Ipv4Header,
                    version: 6
                },
                v.result().unwrap_err().error
            );
        }
        // evil bit policy
        buf[0] = 0x45;
        buf[6] = 0b1000_0000;
        let frame = Ipv4Frame::from_slice(&mut buf).unwrap();
        let mut v = Validator::new();
        frame.validate_except_crc(&mut v, false);
        assert!(v.is_ok());
        frame.validate_except_crc(&mut v, true);
        assert_eq!(FieldError::EvilBitSet, v.result().unwrap_err().error);
    }

    #[test]
    fn header_checksum() {
        // example from RFC 1071 style calculations: checksum over a
        // header should verify to 0 when the checksum field is filled
        let mut buf = [0u8; 20];
        let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
        frame.set_version_and_ihl(4, 5);
        frame.set_total_len(20);
        frame.set_ttl(64);
        frame.set_protocol(6);
        frame.set_source([192, 168, 1, 1]);
        frame.set_destination([192, 168, 1, 2]);
        let checksum = frame.calc_header_checksum();
        frame.set_header_checksum(checksum);

        let verify = Sum16BitWords::new()
            .add_slice(&frame.slice()[..20])
            .ones_complement();
        assert_eq!(0, verify);
    }

    #[test]
    fn pseudo_header() {
        let mut buf = [0u8; 28];
        let mut frame = Ipv4Frame::from_slice(&mut buf).unwrap();
        frame.set_version_and_ihl(4, 5);
        frame.set_total_len(28);
        frame.set_protocol(17);
        frame.set_source([10, 0, 0, 1]);
        frame.set_destination([10, 0, 0, 2]);

        let expected = Sum16BitWords::new()
            .add_4bytes([10, 0, 0, 1])
            .add_4bytes([10, 0, 0, 2])
            .add_2bytes([0, 17])
            .add_2bytes(8u16.to_be_bytes());
        assert_eq!(
            expected.ones_complement(),
            frame.pseudo_header_checksum().ones_complement()
        );
    }
}
