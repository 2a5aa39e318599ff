use crate::dns::{DnsError, Name};

/// Length of the fixed DNS message header.
pub const HEADER_LEN: usize = 12;

/// Resource record type codes used by this stack.
pub mod qtype {
    pub const A: u16 = 1;
    pub const NS: u16 = 2;
    pub const CNAME: u16 = 5;
    pub const SOA: u16 = 6;
    pub const PTR: u16 = 12;
    pub const TXT: u16 = 16;
    pub const AAAA: u16 = 28;
    pub const SRV: u16 = 33;
}

/// Resource record class codes.
pub mod qclass {
    pub const IN: u16 = 1;
}

/// The 16 bit flags word of the DNS header (RFC 1035 section 4.1.1).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct DnsFlags(pub u16);

impl DnsFlags {
    /// Flags of a standard recursive query.
    pub fn query() -> DnsFlags {
        // recursion desired
        DnsFlags(1 << 8)
    }

    /// True for a response, false for a query.
    #[inline]
    pub fn qr(self) -> bool {
        self.0 & (1 << 15) != 0
    }

    #[inline]
    pub fn opcode(self) -> u8 {
        ((self.0 >> 11) & 0xf) as u8
    }

    /// Authoritative answer.
    #[inline]
    pub fn aa(self) -> bool {
        self.0 & (1 << 10) != 0
    }

    /// Truncated response.
    #[inline]
    pub fn tc(self) -> bool {
        self.0 & (1 << 9) != 0
    }

    /// Recursion desired.
    #[inline]
    pub fn rd(self) -> bool {
        self.0 & (1 << 8) != 0
    }

    /// Recursion available.
    #[inline]
    pub fn ra(self) -> bool {
        self.0 & (1 << 7) != 0
    }

    /// Response code; non-zero means the server reported an error.
    #[inline]
    pub fn response_code(self) -> u8 {
        (self.0 & 0xf) as u8
    }

    pub fn with_qr(self, qr: bool) -> DnsFlags {
        if qr {
            DnsFlags(self.0 | (1 << 15))
        } else {
            DnsFlags(self.0 & !(1 << 15))
        }
    }

    pub fn with_response_code(self, rcode: u8) -> DnsFlags {
        DnsFlags((self.0 & !0xf) | u16::from(rcode & 0xf))
    }
}

/// An entry of the question section.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Question {
    pub name: Name,
    pub qtype: u16,
    pub qclass: u16,
}

/// A resource record of the answer, authority or additional section.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Resource {
    pub name: Name,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    /// Record data; its length field is implied.
    pub data: Vec<u8>,
}

/// Caller-declared caps for the number of records decoded per section.
/// Sections beyond their cap are skipped (respecting compression) so
/// the remainder of the message stays decodable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecodeLimits {
    pub max_questions: usize,
    pub max_answers: usize,
    pub max_authorities: usize,
    pub max_additionals: usize,
}

impl DecodeLimits {
    /// Sizes every section cap from the number of questions asked.
    /// Each section is capped independently at that count; sections of
    /// a well-behaved response are not larger for simple lookups.
    pub fn from_questions(count: usize) -> DecodeLimits {
        DecodeLimits {
            max_questions: count,
            max_answers: count,
            max_authorities: count,
            max_additionals: count,
        }
    }
}

impl Default for DecodeLimits {
    fn default() -> DecodeLimits {
        DecodeLimits {
            max_questions: 4,
            max_answers: 8,
            max_authorities: 4,
            max_additionals: 4,
        }
    }
}

/// A decoded DNS message with bounded section sizes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub tx_id: u16,
    pub flags: DnsFlags,
    pub questions: Vec<Question>,
    pub answers: Vec<Resource>,
    pub authorities: Vec<Resource>,
    pub additionals: Vec<Resource>,
    limits: DecodeLimits,
}

impl Default for Message {
    fn default() -> Message {
        Message::new(DecodeLimits::default())
    }
}

impl Message {
    pub fn new(limits: DecodeLimits) -> Message {
        Message {
            tx_id: 0,
            flags: DnsFlags::default(),
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
            limits,
        }
    }

    #[inline]
    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    /// Decodes a full message out of `msg`.
    ///
    /// Over-cap sections are not fatal: the records up to the cap are
    /// kept, the remaining ones are skipped and the first `TooMany…`
    /// sentinel is returned. The message stays usable in that case
    /// ([`DnsError::incomplete_but_ok`]).
    pub fn decode(&mut self, msg: &[u8]) -> Result<(), DnsError> {
        if msg.len() < HEADER_LEN {
            return Err(DnsError::NeedMore);
        }
        self.tx_id = u16::from_be_bytes([msg[0], msg[1]]);
        self.flags = DnsFlags(u16::from_be_bytes([msg[2], msg[3]]));
        let qd_count = usize::from(u16::from_be_bytes([msg[4], msg[5]]));
        let an_count = usize::from(u16::from_be_bytes([msg[6], msg[7]]));
        let ns_count = usize::from(u16::from_be_bytes([msg[8], msg[9]]));
        let ar_count = usize::from(u16::from_be_bytes([msg[10], msg[11]]));

        self.questions.clear();
        self.answers.clear();
        self.authorities.clear();
        self.additionals.clear();

        let mut incomplete: Option<DnsError> = None;
        let mut off = HEADER_LEN;

        for i in 0..qd_count {
            if i < self.limits.max_questions {
                let (question, next) = decode_question(msg, off)?;
                self.questions.push(question);
                off = next;
            } else {
                incomplete.get_or_insert(DnsError::TooManyQuestions);
                off = skip_question(msg, off)?;
            }
        }

        let sections: [(usize, usize, DnsError); 3] = [
            (an_count, self.limits.max_answers, DnsError::TooManyAnswers),
            (
                ns_count,
                self.limits.max_authorities,
                DnsError::TooManyAuthorities,
            ),
            (
                ar_count,
                self.limits.max_additionals,
                DnsError::TooManyAdditionals,
            ),
        ];
        for (section, (count, cap, sentinel)) in sections.into_iter().enumerate() {
            for i in 0..count {
                if i < cap {
                    let (resource, next) = decode_resource(msg, off)?;
                    match section {
                        0 => self.answers.push(resource),
                        1 => self.authorities.push(resource),
                        _ => self.additionals.push(resource),
                    }
                    off = next;
                } else {
                    incomplete.get_or_insert(sentinel);
                    off = skip_resource(msg, off)?;
                }
            }
        }

        match incomplete {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of bytes [`Message::append_to`] will write.
    pub fn encoded_len(&self) -> usize {
        let mut len = HEADER_LEN;
        for question in &self.questions {
            len += question.name.encoded_len() + 4;
        }
        for resource in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
        {
            len += resource.name.encoded_len() + 10 + resource.data.len();
        }
        len
    }

    /// Encodes the message (without compression) into `dst` and
    /// returns the number of bytes written.
    pub fn append_to(&self, dst: &mut [u8]) -> Result<usize, DnsError> {
        let needed = self.encoded_len();
        if dst.len() < needed {
            return Err(DnsError::ShortBuffer {
                required: needed,
                len: dst.len(),
            });
        }
        dst[0..2].copy_from_slice(&self.tx_id.to_be_bytes());
        dst[2..4].copy_from_slice(&self.flags.0.to_be_bytes());
        dst[4..6].copy_from_slice(&(self.questions.len() as u16).to_be_bytes());
        dst[6..8].copy_from_slice(&(self.answers.len() as u16).to_be_bytes());
        dst[8..10].copy_from_slice(&(self.authorities.len() as u16).to_be_bytes());
        dst[10..12].copy_from_slice(&(self.additionals.len() as u16).to_be_bytes());

        let mut off = HEADER_LEN;
        for question in &self.questions {
            off += question.name.append_to(&mut dst[off..])?;
            dst[off..off + 2].copy_from_slice(&question.qtype.to_be_bytes());
            dst[off + 2..off + 4].copy_from_slice(&question.qclass.to_be_bytes());
            off += 4;
        }
        for resource in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
        {
            off += resource.name.append_to(&mut dst[off..])?;
            dst[off..off + 2].copy_from_slice(&resource.rtype.to_be_bytes());
            dst[off + 2..off + 4].copy_from_slice(&resource.class.to_be_bytes());
            dst[off + 4..off + 8].copy_from_slice(&resource.ttl.to_be_bytes());
            dst[off + 8..off + 10].copy_from_slice(&(resource.data.len() as u16).to_be_bytes());
            off += 10;
            dst[off..off + resource.data.len()].copy_from_slice(&resource.data);
            off += resource.data.len();
        }
        debug_assert_eq!(needed, off);
        Ok(off)
    }
}

fn decode_question(msg: &[u8], off: usize) -> Result<(Question, usize), DnsError> {
    let (name, off) = Name::decode(msg, off)?;
    let fixed = msg.get(off..off + 4).ok_or(DnsError::NeedMore)?;
    Ok((
        Question {
            name,
            qtype: u16::from_be_bytes([fixed[0], fixed[1]]),
            qclass: u16::from_be_bytes([fixed[2], fixed[3]]),
        },
        off + 4,
    ))
}

fn skip_question(msg: &[u8], off: usize) -> Result<usize, DnsError> {
    let off = Name::skip(msg, off)?;
    if off + 4 > msg.len() {
        return Err(DnsError::NeedMore);
    }
    Ok(off + 4)
}

fn decode_resource(msg: &[u8], off: usize) -> Result<(Resource, usize), DnsError> {
    let (name, off) = Name::decode(msg, off)?;
    let fixed = msg.get(off..off + 10).ok_or(DnsError::NeedMore)?;
    let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
    let class = u16::from_be_bytes([fixed[2], fixed[3]]);
    let ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
    let rdlength = usize::from(u16::from_be_bytes([fixed[8], fixed[9]]));
    let data_start = off + 10;
    let data = msg
        .get(data_start..data_start + rdlength)
        .ok_or(DnsError::NeedMore)?;
    Ok((
        Resource {
            name,
            rtype,
            class,
            ttl,
            data: data.to_vec(),
        },
        data_start + rdlength,
    ))
}

fn skip_resource(msg: &[u8], off: usize) -> Result<usize, DnsError> {
    let off = Name::skip(msg, off)?;
    let fixed = msg.get(off..off + 10).ok_or(DnsError::NeedMore)?;
    let rdlength = usize::from(u16::from_be_bytes([fixed[8], fixed[9]]));
    let end = off + 10 + rdlength;
    if end > msg.len() {
        return Err(DnsError::NeedMore);
    }
    Ok(end)
}
