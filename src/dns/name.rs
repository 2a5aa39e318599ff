use arrayvec::ArrayVec;

use crate::dns::DnsError;

/// Longest encoded form of a name (labels + terminating zero byte).
pub const MAX_NAME_LEN: usize = 255;

/// Longest single label.
pub const MAX_LABEL_LEN: usize = 63;

/// How many compression pointers a decoder follows before giving up.
/// Real messages use one or two; a loop would spin forever.
const MAX_POINTERS: usize = 10;

/// A DNS domain name: a bounded sequence of length-prefixed labels
/// (RFC 1035 section 3.1).
///
/// Stored in encoded form without the terminating zero byte, so the
/// whole name including terminator never exceeds 255 bytes. Labels are
/// 1..=63 bytes and never contain a `.` (the dot only exists in the
/// presentation format).
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Name {
    /// Length-prefixed labels, no terminator.
    data: ArrayVec<u8, MAX_NAME_LEN>,
}

impl Name {
    /// The root name (zero labels).
    pub fn root() -> Name {
        Name::default()
    }

    /// Parses a dotted presentation name ("www.example.com").
    pub fn from_dotted(dotted: &str) -> Result<Name, DnsError> {
        let mut name = Name::root();
        if dotted.is_empty() || dotted == "." {
            return Ok(name);
        }
        for label in dotted.trim_end_matches('.').split('.') {
            name.add_label(label.as_bytes())?;
        }
        Ok(name)
    }

    /// True if a label of `len` bytes still fits: labels are 1..=63
    /// bytes and the name with its length byte and terminator must stay
    /// within 255 bytes.
    pub fn can_add_label(&self, len: usize) -> bool {
        len >= 1 && len <= MAX_LABEL_LEN && self.data.len() + 1 + len + 1 <= MAX_NAME_LEN
    }

    /// Appends one label.
    pub fn add_label(&mut self, label: &[u8]) -> Result<(), DnsError> {
        if label.is_empty() || label.len() > MAX_LABEL_LEN || label.contains(&b'.') {
            return Err(DnsError::InvalidName);
        }
        if !self.can_add_label(label.len()) {
            return Err(DnsError::NameTooLong);
        }
        self.data.push(label.len() as u8);
        self.data.try_extend_from_slice(label).expect("bounded above");
        Ok(())
    }

    /// Number of labels.
    pub fn label_count(&self) -> usize {
        let mut count = 0;
        let mut off = 0;
        while off < self.data.len() {
            off += 1 + usize::from(self.data[off]);
            count += 1;
        }
        count
    }

    /// Length of the encoded form including the terminating zero.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        self.data.len() + 1
    }

    /// Writes the encoded form (labels + terminator) into `dst` and
    /// returns the number of bytes written.
    pub fn append_to(&self, dst: &mut [u8]) -> Result<usize, DnsError> {
        let needed = self.encoded_len();
        if dst.len() < needed {
            return Err(DnsError::ShortBuffer {
                required: needed,
                len: dst.len(),
            });
        }
        dst[..self.data.len()].copy_from_slice(&self.data);
        dst[self.data.len()] = 0;
        Ok(needed)
    }

    /// Decodes a (possibly compressed) name out of `msg` starting at
    /// `off`. Returns the name and the offset just past its encoding in
    /// the outer record; once the first compression pointer was
    /// followed that outer offset is frozen.
    pub fn decode(msg: &[u8], off: usize) -> Result<(Name, usize), DnsError> {
        let mut name = Name::root();
        let mut off = off;
        // offset to resume the outer record at, fixed by the first
        // pointer encountered
        let mut outer_off: Option<usize> = None;
        let mut pointers = 0;

        loop {
            let len_byte = *msg.get(off).ok_or(DnsError::NeedMore)?;
            match len_byte >> 6 {
                0b00 => {
                    if len_byte == 0 {
                        off += 1;
                        break;
                    }
                    let len = usize::from(len_byte);
                    let label = msg
                        .get(off + 1..off + 1 + len)
                        .ok_or(DnsError::NeedMore)?;
                    name.add_label(label)?;
                    off += 1 + len;
                }
                0b11 => {
                    pointers += 1;
                    if pointers > MAX_POINTERS {
                        return Err(DnsError::TooManyPointers);
                    }
                    let low = *msg.get(off + 1).ok_or(DnsError::NeedMore)?;
                    if outer_off.is_none() {
                        outer_off = Some(off + 2);
                    }
                    off = (usize::from(len_byte & 0x3f) << 8) | usize::from(low);
                }
                // the 0b01 and 0b10 prefixes are reserved
                _ => return Err(DnsError::InvalidName),
            }
        }
        Ok((name, outer_off.unwrap_or(off)))
    }

    /// Steps over an encoded name without building it, respecting
    /// compression (a pointer terminates the outer encoding). Returns
    /// the offset just past the name.
    pub fn skip(msg: &[u8], off: usize) -> Result<usize, DnsError> {
        let mut off = off;
        loop {
            let len_byte = *msg.get(off).ok_or(DnsError::NeedMore)?;
            match len_byte >> 6 {
                0b00 => {
                    if len_byte == 0 {
                        return Ok(off + 1);
                    }
                    off += 1 + usize::from(len_byte);
                    if off > msg.len() {
                        return Err(DnsError::NeedMore);
                    }
                }
                0b11 => {
                    if off + 1 >= msg.len() {
                        return Err(DnsError::NeedMore);
                    }
                    return Ok(off + 2);
                }
                _ => return Err(DnsError::InvalidName),
            }
        }
    }
}

impl core::fmt::Display for Name {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.data.is_empty() {
            return write!(f, ".");
        }
        let mut off = 0;
        let mut first = true;
        while off < self.data.len() {
            let len = usize::from(self.data[off]);
            if !first {
                write!(f, ".")?;
            }
            for &byte in &self.data[off + 1..off + 1 + len] {
                if byte.is_ascii_graphic() {
                    write!(f, "{}", byte as char)?;
                } else {
                    write!(f, "\\{byte:03}")?;
                }
            }
            off += 1 + len;
            first = false;
        }
        Ok(())
    }
}
