use log::{debug, trace};

use crate::dns::{DecodeLimits, DnsError, DnsFlags, Message, Question, Resource};

/// Lifecycle of a single DNS lookup.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ClientState {
    /// No lookup configured.
    #[default]
    Closed,
    /// The query is built and waits to be emitted.
    SendQuery,
    /// The query went out; responses are accepted.
    AwaitResponse,
    /// A response was parsed; the result is available.
    Done,
    /// The lookup was given up on.
    Aborted,
}

/// A single-lookup DNS client over caller-provided buffers.
///
/// No sockets, no timers: `start_resolve` configures the lookup,
/// `encapsulate` writes the query datagram, `demux` consumes candidate
/// response datagrams. Retries and deadlines belong to the caller.
#[derive(Debug, Default)]
pub struct Client {
    state: ClientState,
    tx_id: u16,
    msg: Message,
}

impl Client {
    pub fn new() -> Client {
        Client::default()
    }

    #[inline]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The message of the current lookup: the query before a response
    /// arrived, the parsed response afterwards.
    #[inline]
    pub fn message(&self) -> &Message {
        &self.msg
    }

    /// Answer records of a completed lookup.
    pub fn answers(&self) -> &[Resource] {
        &self.msg.answers
    }

    /// Configures a lookup: builds the query message and caps response
    /// decoding by the number of questions asked.
    pub fn start_resolve(
        &mut self,
        tx_id: u16,
        questions: &[Question],
    ) -> Result<(), DnsError> {
        if matches!(self.state, ClientState::SendQuery | ClientState::AwaitResponse) {
            return Err(DnsError::InvalidState("a lookup is already in flight"));
        }
        if questions.is_empty() {
            return Err(DnsError::InvalidState("at least one question is required"));
        }
        self.msg = Message::new(DecodeLimits::from_questions(questions.len()));
        self.msg.tx_id = tx_id;
        self.msg.flags = DnsFlags::query();
        self.msg.questions = questions.to_vec();
        self.tx_id = tx_id;
        self.state = ClientState::SendQuery;
        debug!("dns: lookup 0x{tx_id:04x} with {} question(s)", questions.len());
        Ok(())
    }

    /// Writes the query datagram into `out` and starts waiting for the
    /// response. Returns the number of bytes written.
    pub fn encapsulate(&mut self, out: &mut [u8]) -> Result<usize, DnsError> {
        if self.state != ClientState::SendQuery {
            return Err(DnsError::InvalidState("no query pending"));
        }
        let n = self.msg.append_to(out)?;
        self.state = ClientState::AwaitResponse;
        Ok(n)
    }

    /// Offers a received datagram to the lookup. Datagrams that are not
    /// the awaited response (wrong transaction id, not a response) are
    /// reported as [`DnsError::UnexpectedResponse`] without ending the
    /// lookup. A matching response moves the client to
    /// [`ClientState::Done`]; a non-zero response code of the server is
    /// the terminal error of the lookup.
    pub fn demux(&mut self, datagram: &[u8]) -> Result<(), DnsError> {
        if self.state != ClientState::AwaitResponse {
            return Err(DnsError::InvalidState("not awaiting a response"));
        }
        if datagram.len() < crate::dns::HEADER_LEN {
            return Err(DnsError::NeedMore);
        }
        let tx_id = u16::from_be_bytes([datagram[0], datagram[1]]);
        let flags = DnsFlags(u16::from_be_bytes([datagram[2], datagram[3]]));
        if tx_id != self.tx_id || !flags.qr() {
            trace!("dns: ignoring datagram with txid 0x{tx_id:04x}");
            return Err(DnsError::UnexpectedResponse);
        }

        match self.msg.decode(datagram) {
            Ok(()) => {}
            Err(err) if err.incomplete_but_ok() => {
                // over-cap sections were skipped; what was parsed is
                // still usable
                debug!("dns: response truncated by section caps: {err}");
            }
            Err(err) => {
                self.state = ClientState::Aborted;
                return Err(err);
            }
        }
        self.state = ClientState::Done;

        let rcode = self.msg.flags.response_code();
        if rcode != 0 {
            return Err(DnsError::ResponseCode(rcode));
        }
        Ok(())
    }

    /// Gives the lookup up.
    pub fn abort(&mut self) {
        self.state = ClientState::Aborted;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dns::{qclass, qtype, Name};

    fn question(dotted: &str) -> Question {
        Question {
            name: Name::from_dotted(dotted).unwrap(),
            qtype: qtype::A,
            qclass: qclass::IN,
        }
    }

    fn answer_for(query: &[u8], addr: [u8; 4], rcode: u8) -> Vec<u8> {
        let mut msg = Message::new(DecodeLimits::default());
        msg.decode(query).unwrap();
        msg.flags = msg.flags.with_qr(true).with_response_code(rcode);
        if rcode == 0 {
            msg.answers.push(Resource {
                name: msg.questions[0].name.clone(),
                rtype: qtype::A,
                class: qclass::IN,
                ttl: 60,
                data: addr.to_vec(),
            });
        }
        let mut buf = vec![0u8; msg.encoded_len()];
        let n = msg.append_to(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn full_lookup() {
        let mut client = Client::new();
        assert_eq!(ClientState::Closed, client.state());

        client
            .start_resolve(0x1234, &[question("example.com")])
            .unwrap();
        assert_eq!(ClientState::SendQuery, client.state());

        let mut out = [0u8; 512];
        let n = client.encapsulate(&mut out).unwrap();
        assert_eq!(ClientState::AwaitResponse, client.state());

        // emitted query has our transaction id and the QR bit clear
        assert_eq!([0x12, 0x34], [out[0], out[1]]);
        assert!(!DnsFlags(u16::from_be_bytes([out[2], out[3]])).qr());

        let response = answer_for(&out[..n], [1, 2, 3, 4], 0);
        client.demux(&response).unwrap();
        assert_eq!(ClientState::Done, client.state());
        assert_eq!(1, client.answers().len());
        assert_eq!(vec![1, 2, 3, 4], client.answers()[0].data);
    }

    #[test]
    fn wrong_txid_keeps_waiting() {
        let mut client = Client::new();
        client
            .start_resolve(0x1111, &[question("example.com")])
            .unwrap();
        let mut out = [0u8; 512];
        let n = client.encapsulate(&mut out).unwrap();

        let mut response = answer_for(&out[..n], [1, 2, 3, 4], 0);
        response[0] = 0x22; // break the transaction id
        assert_eq!(
            Err(DnsError::UnexpectedResponse),
            client.demux(&response)
        );
        assert_eq!(ClientState::AwaitResponse, client.state());

        // a query echoed back (QR clear) is not a response either
        let mut echo = vec![0u8; n];
        echo.copy_from_slice(&out[..n]);
        assert_eq!(Err(DnsError::UnexpectedResponse), client.demux(&echo));
        assert_eq!(ClientState::AwaitResponse, client.state());
    }

    #[test]
    fn server_error_is_terminal() {
        let mut client = Client::new();
        client
            .start_resolve(0x4242, &[question("nxdomain.example")])
            .unwrap();
        let mut out = [0u8; 512];
        let n = client.encapsulate(&mut out).unwrap();

        let response = answer_for(&out[..n], [0, 0, 0, 0], 3);
        assert_eq!(Err(DnsError::ResponseCode(3)), client.demux(&response));
        // parsing succeeded, the lookup is done (with an error result)
        assert_eq!(ClientState::Done, client.state());
    }

    #[test]
    fn state_machine_guards() {
        let mut client = Client::new();
        let mut out = [0u8; 64];
        assert!(matches!(
            client.encapsulate(&mut out),
            Err(DnsError::InvalidState(_))
        ));
        assert!(matches!(
            client.demux(&[0u8; 12]),
            Err(DnsError::InvalidState(_))
        ));
        assert!(matches!(
            client.start_resolve(1, &[]),
            Err(DnsError::InvalidState(_))
        ));

        client.start_resolve(1, &[question("a.example")]).unwrap();
        // double start while in flight is refused
        assert!(matches!(
            client.start_resolve(2, &[question("b.example")]),
            Err(DnsError::InvalidState(_))
        ));

        client.abort();
        assert_eq!(ClientState::Aborted, client.state());
        // a fresh lookup may start after an abort
        client.start_resolve(3, &[question("c.example")]).unwrap();
    }

    #[test]
    fn resource_caps_follow_question_count() {
        let mut client = Client::new();
        client
            .start_resolve(7, &[question("example.com")])
            .unwrap();
        assert_eq!(1, client.message().limits().max_answers);

        let mut out = [0u8; 512];
        let n = client.encapsulate(&mut out).unwrap();

        // a response with two answers: only the first is kept, yet the
        // lookup completes
        let mut msg = Message::new(DecodeLimits::default());
        msg.decode(&out[..n]).unwrap();
        msg.flags = msg.flags.with_qr(true);
        for addr in [[1, 1, 1, 1], [2, 2, 2, 2]] {
            msg.answers.push(Resource {
                name: msg.questions[0].name.clone(),
                rtype: qtype::A,
                class: qclass::IN,
                ttl: 60,
                data: addr.to_vec(),
            });
        }
        let mut buf = vec![0u8; msg.encoded_len()];
        let len = msg.append_to(&mut buf).unwrap();
        client.demux(&buf[..len]).unwrap();

        assert_eq!(ClientState::Done, client.state());
        assert_eq!(1, client.answers().len());
        assert_eq!(vec![1, 1, 1, 1], client.answers()[0].data);
    }
}
