use crate::checksum::Sum16BitWords;
use crate::err::{FieldError, Layer, LenError, LenSource};
use crate::*;

/// A zero-copy view over a buffer containing an IPv6 packet (RFC 8200).
///
/// Only the fixed 40 byte header is interpreted; extension headers past
/// the first "next header" value are left to the caller.
#[derive(Debug)]
pub struct Ipv6Frame<'a> {
    slice: &'a mut [u8],
}

impl<'a> Ipv6Frame<'a> {
    /// Length of the fixed IPv6 header.
    pub const LEN: usize = 40;

    /// Creates a packet view over the given buffer. The buffer must at
    /// least contain the fixed 40 byte header.
    pub fn from_slice(slice: &'a mut [u8]) -> Result<Ipv6Frame<'a>, LenError> {
        if slice.len() < Ipv6Frame::LEN {
            return Err(LenError {
                required_len: Ipv6Frame::LEN,
                len: slice.len(),
                len_source: LenSource::Slice,
                layer: Layer::Ipv6Header,
                layer_start_offset: 0,
            });
        }
        Ok(Ipv6Frame { slice })
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

    /// Read the "traffic class" field.
    #[inline]
    pub fn traffic_class(&self) -> u8 {
        (self.slice[0] << 4) | (self.slice[1] >> 4)
    }

    /// Read the "flow label" field (20 bit).
    #[inline]
    pub fn flow_label(&self) -> u32 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv6Frame::LEN (40).
        unsafe { get_unchecked_be_u32(self.slice.as_ptr()) & 0x000f_ffff }
    }

    /// Set version, traffic class & flow label in one write.
    pub fn set_version_tc_flow(&mut self, version: u8, traffic_class: u8, flow_label: u32) {
        let word = (u32::from(version) << 28)
            | (u32::from(traffic_class) << 20)
            | (flow_label & 0x000f_ffff);
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv6Frame::LEN (40).
        unsafe { set_unchecked_be_u32(self.slice.as_mut_ptr(), word) }
    }

    /// Read the "payload length" field (bytes after the fixed header).
    #[inline]
    pub fn payload_len(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv6Frame::LEN (40).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(4)) }
    }

    #[inline]
    pub fn set_payload_len(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv6Frame::LEN (40).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(4), value) }
    }

    /// Read the "next header" protocol number.
    #[inline]
    pub fn next_header(&self) -> u8 {
        self.slice[6]
    }

    #[inline]
    pub fn set_next_header(&mut self, value: u8) {
        self.slice[6] = value;
    }

    /// Read the "hop limit" field.
    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.slice[7]
    }

    #[inline]
    pub fn set_hop_limit(&mut self, value: u8) {
        self.slice[7] = value;
    }

    /// Read the source address.
    #[inline]
    pub fn source(&self) -> [u8; 16] {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv6Frame::LEN (40).
        unsafe { get_unchecked_16_byte_array(self.slice.as_ptr().add(8)) }
    }

    #[inline]
    pub fn set_source(&mut self, value: [u8; 16]) {
        self.slice[8..24].copy_from_slice(&value);
    }

    /// Read the destination address.
    #[inline]
    pub fn destination(&self) -> [u8; 16] {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of Ipv6Frame::LEN (40).
        unsafe { get_unchecked_16_byte_array(self.slice.as_ptr().add(24)) }
    }

    #[inline]
    pub fn set_destination(&mut self, value: [u8; 16]) {
        self.slice[24..40].copy_from_slice(&value);
    }

    /// The bytes after the fixed header.
    pub fn payload(&self) -> &[u8] {
        &self.slice[Ipv6Frame::LEN..]
    }

    /// Mutable access to the bytes after the fixed header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.slice[Ipv6Frame::LEN..]
    }

    /// Verifies the payload length field against the buffer, recording
    /// errors into `v`.
    pub fn validate_size(&self, v: &mut Validator) {
        let payload_len = usize::from(self.payload_len());
        if payload_len > self.slice.len() - Ipv6Frame::LEN {
            v.push(
                FieldError::LengthFieldExceedsBuffer {
                    layer: Layer::Ipv6Header,
                    len: payload_len,
                    buffer_len: self.slice.len() - Ipv6Frame::LEN,
                },
                32,
            );
        }
    }

    /// Runs [`Ipv6Frame::validate_size`] plus the version nibble check.
    pub fn validate_except_crc(&self, v: &mut Validator) {
        self.validate_size(v);
        if self.version() != 6 {
            v.push(
                FieldError::UnexpectedVersion {
                    layer: Layer::Ipv6Header,
                    version: self.version(),
                },
                0,
            );
        }
    }

    /// Folds source & destination address, payload length and next
    /// header into a checksum accumulator, forming the IPv6 pseudo
    /// header used by the TCP & UDP checksums.
    pub fn pseudo_header_checksum(&self) -> Sum16BitWords {
        Sum16BitWords::new()
            .add_16bytes(self.source())
            .add_16bytes(self.destination())
            .add_4bytes(u32::from(self.payload_len()).to_be_bytes())
            .add_4bytes([0, 0, 0, self.next_header()])
    }
}
