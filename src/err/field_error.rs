use crate::err::Layer;

/// Errors found while validating the fields of a frame view against its
/// underlying buffer (e.g. by `validate_size` or `validate_except_crc`).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum FieldError {
    /// A length field promises less data than the fixed header needs.
    LengthFieldTooSmall {
        layer: Layer,
        /// Value decoded from the length field (in bytes).
        len: usize,
        /// Minimum the field must describe.
        min_len: usize,
    },
    /// A length field promises more data than the buffer holds.
    LengthFieldExceedsBuffer {
        layer: Layer,
        /// Value decoded from the length field (in bytes).
        len: usize,
        /// Number of bytes actually present.
        buffer_len: usize,
    },
    /// The version nibble does not match the expected IP version.
    UnexpectedVersion { layer: Layer, version: u8 },
    /// The source port is zero.
    ZeroSourcePort { layer: Layer },
    /// The destination port is zero.
    ZeroDestinationPort { layer: Layer },
    /// The reserved IPv4 flag bit ("evil bit", RFC 3514) is set and the
    /// caller requested it to be rejected.
    EvilBitSet,
    /// The TCP data offset describes a header overlapping itself.
    DataOffsetTooSmall { data_offset: u8 },
}

impl core::fmt::Display for FieldError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use FieldError::*;
        match self {
            LengthFieldTooSmall { layer, len, min_len } => write!(
                f,
                "{}: length field value of {len} byte(s) is below the minimum of {min_len} byte(s).",
                layer.error_title(),
            ),
            LengthFieldExceedsBuffer {
                layer,
                len,
                buffer_len,
            } => write!(
                f,
                "{}: length field value of {len} byte(s) exceeds the {buffer_len} byte(s) present in the buffer.",
                layer.error_title(),
            ),
            UnexpectedVersion { layer, version } => write!(
                f,
                "{}: unexpected IP version number {version}.",
                layer.error_title(),
            ),
            ZeroSourcePort { layer } => {
                write!(f, "{}: source port is zero.", layer.error_title())
            }
            ZeroDestinationPort { layer } => {
                write!(f, "{}: destination port is zero.", layer.error_title())
            }
            EvilBitSet => write!(
                f,
                "IPv4 Header Error: reserved 'evil bit' flag is set."
            ),
            DataOffsetTooSmall { data_offset } => write!(
                f,
                "TCP Header Error: 'data offset' too small ({data_offset}). The 'data offset' must be at least 5 so the data is not overlapping with the TCP header itself."
            ),
        }
    }
}

impl std::error::Error for FieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::FieldError::*;
    use crate::err::Layer;
    use std::error::Error;

    #[test]
    fn fmt() {
        assert_eq!(
            "UDP Header Error: length field value of 4 byte(s) is below the minimum of 8 byte(s).",
            format!(
                "{}",
                LengthFieldTooSmall {
                    layer: Layer::UdpHeader,
                    len: 4,
                    min_len: 8,
                }
            )
        );
        assert_eq!(
            "IPv4 Header Error: length field value of 100 byte(s) exceeds the 60 byte(s) present in the buffer.",
            format!(
                "{}",
                LengthFieldExceedsBuffer {
                    layer: Layer::Ipv4Header,
                    len: 100,
                    buffer_len: 60,
                }
            )
        );
        assert_eq!(
            "IPv6 Header Error: unexpected IP version number 4.",
            format!(
                "{}",
                UnexpectedVersion {
                    layer: Layer::Ipv6Header,
                    version: 4,
                }
            )
        );
        assert_eq!(
            "TCP Header Error: source port is zero.",
            format!("{}", ZeroSourcePort { layer: Layer::TcpHeader })
        );
        assert_eq!(
            "TCP Header Error: destination port is zero.",
            format!("{}", ZeroDestinationPort { layer: Layer::TcpHeader })
        );
        assert_eq!(
            "IPv4 Header Error: reserved 'evil bit' flag is set.",
            format!("{EvilBitSet}")
        );
        assert_eq!(
            "TCP Header Error: 'data offset' too small (4). The 'data offset' must be at least 5 so the data is not overlapping with the TCP header itself.",
            format!("{}", DataOffsetTooSmall { data_offset: 4 })
        );
    }

    #[test]
    fn clone_eq() {
        let err = EvilBitSet;
        assert_eq!(err, err.clone());
    }

    #[test]
    fn source() {
        assert!(EvilBitSet.source().is_none());
    }
}
