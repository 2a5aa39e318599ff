use crate::err::{FieldError, Layer, LenError, LenSource};
use crate::link::ether_type::VLAN_TAGGED_FRAME;
use crate::*;

/// A zero-copy view over a buffer containing an Ethernet II frame.
///
/// All accessors read and write the underlying buffer directly. There is
/// no internal cache, so a write through this view is visible to every
/// other view over the same buffer.
#[derive(Debug)]
pub struct EthernetFrame<'a> {
    slice: &'a mut [u8],
}

impl<'a> EthernetFrame<'a> {
    /// Length of an Ethernet II header without a VLAN tag.
    pub const LEN: usize = 14;

    /// Length of an Ethernet II header with an 802.1Q VLAN tag.
    pub const LEN_WITH_VLAN: usize = 18;

    /// Creates a frame view over the given buffer. The buffer must at
    /// least contain the fixed 14 byte header.
    pub fn from_slice(slice: &'a mut [u8]) -> Result<EthernetFrame<'a>, LenError> {
        if slice.len() < EthernetFrame::LEN {
            return Err(LenError {
                required_len: EthernetFrame::LEN,
                len: slice.len(),
                len_source: LenSource::Slice,
                layer: Layer::EthernetHeader,
                layer_start_offset: 0,
            });
        }
        Ok(EthernetFrame { slice })
    }

    /// Returns the complete underlying buffer.
    #[inline]
    pub fn slice(&self) -> &[u8] {
        self.slice
    }

    /// Read the destination MAC address.
    #[inline]
    pub fn destination(&self) -> [u8; 6] {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of EthernetFrame::LEN (14).
        unsafe { get_unchecked_6_byte_array(self.slice.as_ptr()) }
    }

    /// Set the destination MAC address.
    #[inline]
    pub fn set_destination(&mut self, mac: [u8; 6]) {
        self.slice[..6].copy_from_slice(&mac);
    }

    /// Read the source MAC address.
    #[inline]
    pub fn source(&self) -> [u8; 6] {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of EthernetFrame::LEN (14).
        unsafe { get_unchecked_6_byte_array(self.slice.as_ptr().add(6)) }
    }

    /// Set the source MAC address.
    #[inline]
    pub fn set_source(&mut self, mac: [u8; 6]) {
        self.slice[6..12].copy_from_slice(&mac);
    }

    /// Read the ether type / size field (in system native byte order).
    #[inline]
    pub fn ether_type(&self) -> u16 {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of EthernetFrame::LEN (14).
        unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(12)) }
    }

    /// Set the ether type / size field.
    #[inline]
    pub fn set_ether_type(&mut self, value: u16) {
        // SAFETY:
        // Safe as the constructor checks that the slice has at least
        // the length of EthernetFrame::LEN (14).
        unsafe { set_unchecked_be_u16(self.slice.as_mut_ptr().add(12), value) }
    }

    /// True if the ether type announces an 802.1Q VLAN tag at bytes 14..18.
    #[inline]
    pub fn is_vlan_tagged(&self) -> bool {
        self.ether_type() == VLAN_TAGGED_FRAME
    }

    /// Read the VLAN tag control information (priority, drop eligible
    /// indicator & VLAN id) if the frame is VLAN tagged.
    pub fn vlan_tci(&self) -> Option<u16> {
        if self.is_vlan_tagged() && self.slice.len() >= EthernetFrame::LEN_WITH_VLAN {
            // SAFETY:
            // Safe as the length of the slice is checked above to
            // contain the full 18 byte tagged header.
            Some(unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(14)) })
        } else {
            None
        }
    }

    /// The ether type of the encapsulated payload. For VLAN tagged frames
    /// this is the type field after the tag, otherwise the type field of
    /// the fixed header.
    pub fn payload_ether_type(&self) -> Option<u16> {
        if self.is_vlan_tagged() {
            if self.slice.len() >= EthernetFrame::LEN_WITH_VLAN {
                // SAFETY:
                // Safe as the length of the slice is checked above to
                // contain the full 18 byte tagged header.
                Some(unsafe { get_unchecked_be_u16(self.slice.as_ptr().add(16)) })
            } else {
                None
            }
        } else {
            Some(self.ether_type())
        }
    }

    /// Length of the header including a VLAN tag if present.
    #[inline]
    pub fn header_len(&self) -> usize {
        if self.is_vlan_tagged() {
            EthernetFrame::LEN_WITH_VLAN
        } else {
            EthernetFrame::LEN
        }
    }

    /// The bytes after the (possibly VLAN tagged) header.
    pub fn payload(&self) -> &[u8] {
        &self.slice[self.header_len().min(self.slice.len())..]
    }

    /// Mutable access to the bytes after the (possibly VLAN tagged) header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.header_len().min(self.slice.len());
        &mut self.slice[start..]
    }

    /// Verifies the variable sized portion of the frame (the VLAN tag)
    /// against the buffer, recording errors into `v`.
    pub fn validate_size(&self, v: &mut Validator) {
        if self.is_vlan_tagged() && self.slice.len() < EthernetFrame::LEN_WITH_VLAN {
            v.push(
                FieldError::LengthFieldExceedsBuffer {
                    layer: Layer::VlanHeader,
                    len: EthernetFrame::LEN_WITH_VLAN,
                    buffer_len: self.slice.len(),
                },
                12 * 8,
            );
        }
    }
}
