use crate::err::{Layer, LenSource};

/// Error when different lengths are conflicting with each other (e.g. not
/// enough data in a slice to decode a header, or a length field promising
/// more data than the buffer holds).
///
/// When the error is caused by not enough data being available
/// `required_len > len` must be true, while a length field that is too
/// big for the underlying buffer results in the inverse.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LenError {
    /// Expected minimum or maximum length conflicting with the
    /// `len` value.
    pub required_len: usize,

    /// Length limiting or exceeding the required length.
    pub len: usize,

    /// Source of the outer length (e.g. slice or a length field in an
    /// upper layer).
    pub len_source: LenSource,

    /// Layer in which the length error was encountered.
    pub layer: Layer,

    /// Offset from the start of the parsed data to the layer where the
    /// length error occurred.
    pub layer_start_offset: usize,
}

impl LenError {
    /// Adds an offset value to the `layer_start_offset` field.
    #[inline]
    pub const fn add_offset(self, offset: usize) -> Self {
        LenError {
            required_len: self.required_len,
            len: self.len,
            len_source: self.len_source,
            layer: self.layer,
            layer_start_offset: self.layer_start_offset + offset,
        }
    }
}

impl core::fmt::Display for LenError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.required_len > self.len {
            write!(
                f,
                "{}: Not enough data to decode '{}'. {} byte(s) would be required, but only {} byte(s) are available based on the {} (layer starts at byte {}).",
                self.layer.error_title(),
                self.layer,
                self.required_len,
                self.len,
                self.len_source,
                self.layer_start_offset,
            )
        } else {
            write!(
                f,
                "{}: Length of {} byte(s) is too big for a '{}' (maximum is {} bytes). The {} was used to determine the length (layer starts at byte {}).",
                self.layer.error_title(),
                self.len,
                self.layer,
                self.required_len,
                self.len_source,
                self.layer_start_offset,
            )
        }
    }
}

impl std::error::Error for LenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::error::Error;

    #[test]
    fn add_offset() {
        assert_eq!(
            LenError {
                required_len: 2,
                len: 1,
                len_source: LenSource::Slice,
                layer: Layer::TcpHeader,
                layer_start_offset: 20,
            }
            .add_offset(14),
            LenError {
                required_len: 2,
                len: 1,
                len_source: LenSource::Slice,
                layer: Layer::TcpHeader,
                layer_start_offset: 34,
            }
        );
    }

    #[test]
    fn fmt() {
        // not enough data
        assert_eq!(
            "TCP Header Error: Not enough data to decode 'TCP header'. 20 byte(s) would be required, but only 5 byte(s) are available based on the slice length (layer starts at byte 0).",
            format!(
                "{}",
                LenError {
                    required_len: 20,
                    len: 5,
                    len_source: LenSource::Slice,
                    layer: Layer::TcpHeader,
                    layer_start_offset: 0,
                }
            )
        );

        // length field too big
        assert_eq!(
            "UDP Header Error: Length of 100 byte(s) is too big for a 'UDP header' (maximum is 60 bytes). The UDP header 'length' field was used to determine the length (layer starts at byte 0).",
            format!(
                "{}",
                LenError {
                    required_len: 60,
                    len: 100,
                    len_source: LenSource::UdpHeaderLen,
                    layer: Layer::UdpHeader,
                    layer_start_offset: 0,
                }
            )
        );
    }

    #[test]
    fn source() {
        assert!(LenError {
            required_len: 0,
            len: 0,
            len_source: LenSource::Slice,
            layer: Layer::Ipv4Header,
            layer_start_offset: 0,
        }
        .source()
        .is_none());
    }
}
