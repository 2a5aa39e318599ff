use crate::checksum::Sum16BitWords;
use crate::err::{FieldError, Layer, LenError, LenSource};
use crate::tcp::{Flags, Segment, SeqNum};
use crate::*;

/// A zero-copy view over a buffer containing a TCP segment (RFC 9293).
///
/// Accessors are pure functions of the buffer, so writes through this
/// view are visible to every other view over the same buffer. The
/// options region (when `data_offset > 5`) is only trusted after
/// [`TcpFrame::validate_size`] ran without recording errors.
#[derive(Debug)]
pub struct TcpFrame<'a> {
    slice: &'a mut [u8],
}

impl<'a> TcpFrame<'a> {
    /// Length of a TCP header without options.
    pub const LEN: usize = 20;

    /// Smallest allowed value of the data offset field.
    pub const MIN_DATA_OFFSET: u8 = 5;

    /// Largest allowed value of the data offset field.
    pub const MAX_DATA_OFFSET: u8 = 15;

    /// Creates a segment view over the given buffer. The buffer must at
    /// least contain the fixed 20 byte header.
    pub fn from_slice(slice: &'a mut [u8]) -> Result<TcpFrame<'a>, LenError> {
        if slice.len() < TcpFrame::LEN {
            return Err(LenError {
                required_len: TcpFrame::LEN,
                len: slice.len(),
                len_source: LenSource::Slice,
                layer: Layer::TcpHeader,
                layer_start_offset: 0,
            });
        }
        Ok(TcpFrame { slice })
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
        // the length of TcpFrame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr()) }
    }

    #[inline]
    pub fn set_source_port(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr(), value) }
    }

    /// Read the destination port number.
    #[inline]
    pub fn destination_port(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(2)) }
    }

    #[inline]
    pub fn set_destination_port(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(2), value) }
    }

    /// Read the sequence number of the first data octet (or the initial
    /// sequence number when SYN is present).
    #[inline]
    pub fn sequence_number(&self) -> u32 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { get_unchecked_be_u32(self.slice.as_ptr().add(4)) }
    }

    #[inline]
    pub fn set_sequence_number(&mut self, value: u32) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { set_unchecked_be_u32(self.slice.as_mut_ptr().add(4), value) }
    }

    /// Read the acknowledgment number: the next sequence number the
    /// sender of this segment expects to receive (meaningful once ACK
    /// is set).
    #[inline]
    pub fn acknowledgment_number(&self) -> u32 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { get_unchecked_be_u32(self.slice.as_ptr().add(8)) }
    }

    #[inline]
    pub fn set_acknowledgment_number(&mut self, value: u32) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { set_unchecked_be_u32(self.slice.as_mut_ptr().add(8), value) }
    }

    /// Read the number of 32 bit words in the TCP header. This
    /// indicates where the payload begins.
    #[inline]
    pub fn data_offset(&self) -> u8 {
        (self.slice[12] & 0b1111_0000) >> 4
    }

    #[inline]
    pub fn set_data_offset(&mut self, value: u8) {
        self.slice[12] = (self.slice[12] & 0b0000_1111) | ((value & 0b1111) << 4);
    }

    /// Read all control flags of byte 13.
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags::from_bits(self.slice[13] & 0b0011_1111)
    }

    #[inline]
    pub fn set_flags(&mut self, flags: Flags) {
        self.slice[13] = flags.bits();
    }

    /// Read the fin flag (no more data from sender).
    #[inline]
    pub fn fin(&self) -> bool {
        self.flags().contains(Flags::FIN)
    }

    /// Read the syn flag (synchronize sequence numbers).
    #[inline]
    pub fn syn(&self) -> bool {
        self.flags().contains(Flags::SYN)
    }

    /// Read the rst flag (reset the connection).
    #[inline]
    pub fn rst(&self) -> bool {
        self.flags().contains(Flags::RST)
    }

    /// Read the psh flag (push function).
    #[inline]
    pub fn psh(&self) -> bool {
        self.flags().contains(Flags::PSH)
    }

    /// Read the ack flag (acknowledgment field significant).
    #[inline]
    pub fn ack(&self) -> bool {
        self.flags().contains(Flags::ACK)
    }

    /// Read the window size: the number of octets beginning with the
    /// acknowledgment number that the sender is willing to accept.
    #[inline]
    pub fn window_size(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(14)) }
    }

    #[inline]
    pub fn set_window_size(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(14), value) }
    }

    /// Read the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(16)) }
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(16), value) }
    }

    /// Read the urgent pointer field.
    #[inline]
    pub fn urgent_pointer(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(18)) }
    }

    #[inline]
    pub fn set_urgent_pointer(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of TcpFrame::LEN (20).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(18), value) }
    }

    /// Length of the header in bytes as described by the data offset
    /// field.
    #[inline]
    pub fn header_len(&self) -> usize {
        usize::from(self.data_offset()) * 4
    }

    /// The options region between the fixed header and the payload.
    pub fn options(&self) -> &[u8] {
        let end = self.header_len().clamp(TcpFrame::LEN, self.slice.len());
        &self.slice[TcpFrame::LEN..end]
    }

    /// Returns an iterator over the known TCP options of the header.
    pub fn options_iterator(&self) -> TcpOptionsIterator {
        TcpOptionsIterator::from_slice(self.options())
    }

    /// The bytes after the variable sized header. Only call after
    /// [`TcpFrame::validate_size`] ran clean, the data offset field is
    /// trusted.
    pub fn payload(&self) -> &[u8] {
        &self.slice[self.header_len().clamp(TcpFrame::LEN, self.slice.len())..]
    }

    /// Mutable access to the bytes after the variable sized header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.header_len().clamp(TcpFrame::LEN, self.slice.len());
        &mut self.slice[start..]
    }

    /// Summarizes the header into the [`Segment`] record the control
    /// block consumes.
    pub fn segment(&self, payload_len: u32) -> Segment {
        Segment {
            seq: SeqNum::new(self.sequence_number()),
            ack: SeqNum::new(self.acknowledgment_number()),
            datalen: payload_len,
            wnd: u32::from(self.window_size()),
            flags: self.flags(),
        }
    }

    /// Writes the header fields described by a [`Segment`]: sequence &
    /// acknowledgment number, flags and window.
    pub fn set_segment(&mut self, seg: &Segment) {
        self.set_sequence_number(seg.seq.value());
        self.set_acknowledgment_number(if seg.flags.contains(Flags::ACK) {
            seg.ack.value()
        } else {
            0
        });
        self.set_flags(seg.flags);
        self.set_window_size(seg.wnd as u16);
    }

    /// Verifies the data offset field against the buffer, recording
    /// errors into `v`.
    pub fn validate_size(&self, v: &mut Validator) {
        if self.data_offset() < TcpFrame::MIN_DATA_OFFSET {
            v.push(
                FieldError::DataOffsetTooSmall {
                    data_offset: self.data_offset(),
                },
                96,
            );
        } else if self.header_len() > self.slice.len() {
            v.push(
                FieldError::LengthFieldExceedsBuffer {
                    layer: Layer::TcpHeader,
                    len: self.header_len(),
                    buffer_len: self.slice.len(),
                },
                96,
            );
        }
    }

    /// Runs [`TcpFrame::validate_size`] plus the checks that do not
    /// require checksum calculation: ports must be non-zero.
    pub fn validate_except_crc(&self, v: &mut Validator) {
        self.validate_size(v);
        if self.source_port() == 0 {
            v.push(FieldError::ZeroSourcePort { layer: Layer::TcpHeader }, 0);
        }
        if self.destination_port() == 0 {
            v.push(
                FieldError::ZeroDestinationPort { layer: Layer::TcpHeader },
                16,
            );
        }
    }

    /// Calculates the checksum of header & payload for a segment
    /// carried over IPv4. The checksum field itself is skipped; the
    /// result is NOT written back.
    pub fn calc_checksum_ipv4(&self, source: [u8; 4], destination: [u8; 4]) -> u16 {
        let pseudo = Sum16BitWords::new()
            .add_4bytes(source)
            .add_4bytes(destination)
            .add_2bytes([0, ip_number::TCP])
            .add_2bytes((self.slice.len() as u16).to_be_bytes());
        self.calc_checksum_post_ip(pseudo)
    }

    /// Calculates the checksum of header & payload for a segment
    /// carried over IPv6. The checksum field itself is skipped; the
    /// result is NOT written back.
    pub fn calc_checksum_ipv6(&self, source: [u8; 16], destination: [u8; 16]) -> u16 {
        let pseudo = Sum16BitWords::new()
            .add_16bytes(source)
            .add_16bytes(destination)
            .add_4bytes((self.slice.len() as u32).to_be_bytes())
            .add_4bytes([0, 0, 0, ip_number::TCP]);
        self.calc_checksum_post_ip(pseudo)
    }

    /// Folds the header (excluding the checksum bytes) and payload into
    /// a prepared pseudo header sum, e.g. one produced by
    /// [`crate::Ipv4Frame::pseudo_header_checksum`].
    pub fn calc_checksum_post_ip(&self, ip_pseudo_header_sum: Sum16BitWords) -> u16 {
        ip_pseudo_header_sum
            .add_slice(&self.slice[..16])
            .add_slice(&self.slice[18..])
            .to_ones_complement_with_no_zero()
    }
}
