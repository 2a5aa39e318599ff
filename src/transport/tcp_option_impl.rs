/// Constants describing the TCP option kinds & lengths.
pub mod tcp_option {
    /// End of options list.
    pub const KIND_END: u8 = 0;
    /// No-operation, used to align options.
    pub const KIND_NOOP: u8 = 1;
    /// Maximum segment size (only valid on SYN segments).
    pub const KIND_MAXIMUM_SEGMENT_SIZE: u8 = 2;
    /// Window scale shift (RFC 7323).
    pub const KIND_WINDOW_SCALE: u8 = 3;
    /// Selective acknowledgment permitted (RFC 2018).
    pub const KIND_SELECTIVE_ACK_PERMITTED: u8 = 4;
    /// Timestamp & echoed timestamp (RFC 7323).
    pub const KIND_TIMESTAMP: u8 = 8;
    /// User timeout (RFC 5482).
    pub const KIND_USER_TIMEOUT: u8 = 28;

    pub const LEN_MAXIMUM_SEGMENT_SIZE: u8 = 4;
    pub const LEN_WINDOW_SCALE: u8 = 3;
    pub const LEN_SELECTIVE_ACK_PERMITTED: u8 = 2;
    pub const LEN_TIMESTAMP: u8 = 10;
    pub const LEN_USER_TIMEOUT: u8 = 4;
}

/// Options that can be present in the options region of a TCP header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TcpOption {
    Noop,
    /// Maximum receive segment size at the endpoint that sent the
    /// segment. Only sent on segments with the SYN bit.
    MaximumSegmentSize(u16),
    WindowScale(u8),
    SelectiveAckPermitted,
    /// Timestamp & echo (first value is the sender timestamp, the
    /// second the echoed one).
    Timestamp(u32, u32),
    /// User timeout in the granularity given by its high bit.
    UserTimeout(u16),
}

impl TcpOption {
    /// Number of bytes the encoded option occupies.
    pub fn byte_len(&self) -> usize {
        use tcp_option::*;
        match self {
            TcpOption::Noop => 1,
            TcpOption::MaximumSegmentSize(_) => LEN_MAXIMUM_SEGMENT_SIZE as usize,
            TcpOption::WindowScale(_) => LEN_WINDOW_SCALE as usize,
            TcpOption::SelectiveAckPermitted => LEN_SELECTIVE_ACK_PERMITTED as usize,
            TcpOption::Timestamp(_, _) => LEN_TIMESTAMP as usize,
            TcpOption::UserTimeout(_) => LEN_USER_TIMEOUT as usize,
        }
    }

    /// Encodes the option into `dst` and returns the number of bytes
    /// written, or `None` if `dst` is too small.
    pub fn write(&self, dst: &mut [u8]) -> Option<usize> {
        use tcp_option::*;
        let len = self.byte_len();
        if dst.len() < len {
            return None;
        }
        match *self {
            TcpOption::Noop => dst[0] = KIND_NOOP,
            TcpOption::MaximumSegmentSize(mss) => {
                dst[0] = KIND_MAXIMUM_SEGMENT_SIZE;
                dst[1] = LEN_MAXIMUM_SEGMENT_SIZE;
                dst[2..4].copy_from_slice(&mss.to_be_bytes());
            }
            TcpOption::WindowScale(shift) => {
                dst[0] = KIND_WINDOW_SCALE;
                dst[1] = LEN_WINDOW_SCALE;
                dst[2] = shift;
            }
            TcpOption::SelectiveAckPermitted => {
                dst[0] = KIND_SELECTIVE_ACK_PERMITTED;
                dst[1] = LEN_SELECTIVE_ACK_PERMITTED;
            }
            TcpOption::Timestamp(value, echo) => {
                dst[0] = KIND_TIMESTAMP;
                dst[1] = LEN_TIMESTAMP;
                dst[2..6].copy_from_slice(&value.to_be_bytes());
                dst[6..10].copy_from_slice(&echo.to_be_bytes());
            }
            TcpOption::UserTimeout(timeout) => {
                dst[0] = KIND_USER_TIMEOUT;
                dst[1] = LEN_USER_TIMEOUT;
                dst[2..4].copy_from_slice(&timeout.to_be_bytes());
            }
        }
        Some(len)
    }
}

/// Errors that can occur while decoding the options of a TCP header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TcpOptionReadError {
    /// The option is cut short by the end of the options region.
    UnexpectedEndOfSlice {
        option_id: u8,
        expected_len: u8,
        actual_len: usize,
    },
    /// The length byte does not match the canonical length of the kind.
    UnexpectedSize { option_id: u8, size: u8 },
    /// The option kind is not known to the decoder.
    UnknownId(u8),
}

impl core::fmt::Display for TcpOptionReadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use TcpOptionReadError::*;
        match self {
            UnexpectedEndOfSlice {
                option_id,
                expected_len,
                actual_len,
            } => write!(
                f,
                "TCP option of kind {option_id} expects {expected_len} byte(s), but only {actual_len} byte(s) remain."
            ),
            UnexpectedSize { option_id, size } => write!(
                f,
                "TCP option of kind {option_id} carries the non-canonical length {size}."
            ),
            UnknownId(option_id) => {
                write!(f, "TCP option kind {option_id} is unknown.")
            }
        }
    }
}

impl std::error::Error for TcpOptionReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Iterates over the options region of a TCP header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TcpOptionsIterator<'a> {
    options: &'a [u8],
    skip_unknown: bool,
}

impl<'a> TcpOptionsIterator<'a> {
    /// Creates an iterator that reports unknown option kinds as errors.
    pub fn from_slice(options: &'a [u8]) -> TcpOptionsIterator<'a> {
        TcpOptionsIterator {
            options,
            skip_unknown: false,
        }
    }

    /// Creates an iterator that steps over unknown option kinds using
    /// their length byte instead of erroring out.
    pub fn from_slice_skip_unknown(options: &'a [u8]) -> TcpOptionsIterator<'a> {
        TcpOptionsIterator {
            options,
            skip_unknown: true,
        }
    }

    /// Returns the not yet processed part of the options region.
    pub fn rest(&self) -> &'a [u8] {
        self.options
    }

    fn take_fixed(
        &mut self,
        expected: u8,
    ) -> Result<&'a [u8], TcpOptionReadError> {
        let id = self.options[0];
        if self.options.len() < expected as usize {
            return Err(TcpOptionReadError::UnexpectedEndOfSlice {
                option_id: id,
                expected_len: expected,
                actual_len: self.options.len(),
            });
        }
        if self.options[1] != expected {
            return Err(TcpOptionReadError::UnexpectedSize {
                option_id: id,
                size: self.options[1],
            });
        }
        let (data, rest) = self.options.split_at(expected as usize);
        self.options = rest;
        Ok(data)
    }
}

impl<'a> Iterator for TcpOptionsIterator<'a> {
    type Item = Result<TcpOption, TcpOptionReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        use tcp_option::*;

        loop {
            if self.options.is_empty() {
                return None;
            }
            let result = match self.options[0] {
                KIND_END => None,
                KIND_NOOP => {
                    self.options = &self.options[1..];
                    Some(Ok(TcpOption::Noop))
                }
                KIND_MAXIMUM_SEGMENT_SIZE => {
                    Some(self.take_fixed(LEN_MAXIMUM_SEGMENT_SIZE).map(|data| {
                        TcpOption::MaximumSegmentSize(u16::from_be_bytes([data[2], data[3]]))
                    }))
                }
                KIND_WINDOW_SCALE => Some(
                    self.take_fixed(LEN_WINDOW_SCALE)
                        .map(|data| TcpOption::WindowScale(data[2])),
                ),
                KIND_SELECTIVE_ACK_PERMITTED => Some(
                    self.take_fixed(LEN_SELECTIVE_ACK_PERMITTED)
                        .map(|_| TcpOption::SelectiveAckPermitted),
                ),
                KIND_TIMESTAMP => Some(self.take_fixed(LEN_TIMESTAMP).map(|data| {
                    TcpOption::Timestamp(
                        u32::from_be_bytes([data[2], data[3], data[4], data[5]]),
                        u32::from_be_bytes([data[6], data[7], data[8], data[9]]),
                    )
                })),
                KIND_USER_TIMEOUT => Some(self.take_fixed(LEN_USER_TIMEOUT).map(|data| {
                    TcpOption::UserTimeout(u16::from_be_bytes([data[2], data[3]]))
                })),
                unknown => {
                    if self.skip_unknown
                        && self.options.len() >= 2
                        && self.options[1] >= 2
                        && self.options.len() >= self.options[1] as usize
                    {
                        self.options = &self.options[self.options[1] as usize..];
                        continue;
                    }
                    Some(Err(TcpOptionReadError::UnknownId(unknown)))
                }
            };

            // the end marker and every error stop the iteration
            match result {
                None | Some(Err(_)) => {
                    self.options = &[];
                }
                _ => {}
            }
            return result;
        }
    }
}
