use crate::checksum::Sum16BitWords;
use crate::err::{FieldError, Layer, LenError, LenSource};
use crate::*;

/// A zero-copy view over a buffer containing a UDP datagram (RFC 768).
#[derive(Debug)]
pub struct UdpFrame<'a> {
    slice: &'a mut [u8],
}

impl<'a> UdpFrame<'a> {
    /// Length of the UDP header.
    pub const LEN: usize = 8;

    /// Creates a datagram view over the given buffer. The buffer must
    /// at least contain the fixed 8 byte header.
    pub fn from_slice(slice: &'a mut [u8]) -> Result<UdpFrame<'a>, LenError> {
        if slice.len() < UdpFrame::LEN {
            return Err(LenError {
                required_len: UdpFrame::LEN,
                len: slice.len(),
                len_source: LenSource::Slice,
                layer: Layer::UdpHeader,
                layer_start_offset: 0,
            });
        }
        Ok(UdpFrame { slice })
    }

    /// Returns the complete underlying buffer.
    #[inline]
    pub fn slice(&self) -> &[u8] {
        self.slice
    }

    /// Read the source port number.
    #[inline]
    pub fn source_port(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr()) }
    }

    #[inline]
    pub fn set_source_port(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr(), value) }
    }

    /// Read the destination port number.
    #[inline]
    pub fn destination_port(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(2)) }
    }

    #[inline]
    pub fn set_destination_port(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(2), value) }
    }

    /// Read the length field (header + payload in bytes).
    #[inline]
    pub fn length(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(4)) }
    }

    #[inline]
    pub fn set_length(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(4), value) }
    }

    /// Read the checksum field (0 means "no checksum" over IPv4).
    #[inline]
    pub fn checksum(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(6)) }
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of UdpFrame::LEN (8).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(6), value) }
    }

    /// The bytes after the header.
    pub fn payload(&self) -> &[u8] {
        &self.slice[UdpFrame::LEN..]
    }

    /// Mutable access to the bytes after the header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.slice[UdpFrame::LEN..]
    }

    /// Verifies the length field against its minimum and the buffer,
    /// recording errors into `v`.
    pub fn validate_size(&self, v: &mut Validator) {
        let length = usize::from(self.length());
        if length < UdpFrame::LEN {
            v.push(
                FieldError::LengthFieldTooSmall {
                    layer: Layer::UdpHeader,
                    len: length,
                    min_len: UdpFrame::LEN,
                },
                32,
            );
        } else if length > self.slice.len() {
            v.push(
                FieldError::LengthFieldExceedsBuffer {
                    layer: Layer::UdpHeader,
                    len: length,
                    buffer_len: self.slice.len(),
                },
                32,
            );
        }
    }

    /// Runs [`UdpFrame::validate_size`] plus the checks that do not
    /// require checksum calculation: ports must be non-zero.
    pub fn validate_except_crc(&self, v: &mut Validator) {
        self.validate_size(v);
        if self.source_port() == 0 {
            v.push(FieldError::ZeroSourcePort { layer: Layer::UdpHeader }, 0);
        }
        if self.destination_port() == 0 {
            v.push(
                FieldError::ZeroDestinationPort { layer: Layer::UdpHeader },
                16,
            );
        }
    }

    /// Calculates the checksum of header & payload for a datagram
    /// carried over IPv4. The checksum field itself is skipped; the
    /// result is NOT written back.
    pub fn calc_checksum_ipv4(&self, source: [u8; 4], destination: [u8; 4]) -> u16 {
        let pseudo = Sum16BitWords::new()
            .add_4bytes(source)
            .add_4bytes(destination)
            .add_2bytes([0, ip_number::UDP])
            .add_2bytes((self.slice.len() as u16).to_be_bytes());
        self.calc_checksum_post_ip(pseudo)
    }

    /// Calculates the checksum of header & payload for a datagram
    /// carried over IPv6. The checksum field itself is skipped; the
    /// result is NOT written back.
    pub fn calc_checksum_ipv6(&self, source: [u8; 16], destination: [u8; 16]) -> u16 {
        let pseudo = Sum16BitWords::new()
            .add_16bytes(source)
            .add_16bytes(destination)
            .add_4bytes((self.slice.len() as u32).to_be_bytes())
            .add_4bytes([0, 0, 0, ip_number::UDP]);
        self.calc_checksum_post_ip(pseudo)
    }

    /// Folds the header (excluding the checksum bytes) and payload into
    /// a prepared pseudo header sum.
    pub fn calc_checksum_post_ip(&self, ip_pseudo_header_sum: Sum16BitWords) -> u16 {
        ip_pseudo_header_sum
            .add_slice(&self.slice[..6])
            .add_slice(&self.slice[8..])
            .to_ones_complement_with_no_zero()
    }
}
