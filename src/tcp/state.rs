/// Connection states of the RFC 9293 state machine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum State {
    /// Represents no connection state at all.
    #[default]
    Closed,
    /// Waiting for a connection request from any remote TCP peer and port.
    Listen,
    /// Waiting for a matching connection request after having sent a
    /// connection request.
    SynSent,
    /// Waiting for a confirming connection request acknowledgment after
    /// having both received and sent a connection request.
    SynRcvd,
    /// An open connection; data received can be delivered to the user.
    /// The normal state for the data transfer phase.
    Established,
    /// Waiting for a connection termination request from the remote
    /// peer, or an acknowledgment of the termination request previously
    /// sent.
    FinWait1,
    /// Waiting for a connection termination request from the remote peer.
    FinWait2,
    /// Waiting for a connection termination request acknowledgment from
    /// the remote peer.
    Closing,
    /// Waiting for enough time to pass to be sure the remote peer
    /// received the acknowledgment of its termination request.
    TimeWait,
    /// Waiting for a connection termination request from the local user.
    CloseWait,
    /// Waiting for an acknowledgment of the connection termination
    /// request previously sent to the remote peer.
    LastAck,
}

impl State {
    /// States before the three way handshake completed.
    #[inline]
    pub fn is_preestablished(self) -> bool {
        matches!(self, State::SynRcvd | State::SynSent | State::Listen)
    }

    /// States where the handshake completed and both sequence spaces
    /// are synchronized.
    #[inline]
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            State::Established
                | State::FinWait1
                | State::FinWait2
                | State::Closing
                | State::CloseWait
                | State::LastAck
        )
    }

    /// States in which the connection is finished for its owner.
    #[inline]
    pub fn is_closed(self) -> bool {
        matches!(self, State::Closed | State::TimeWait)
    }

    /// States in which inbound payload is still accepted.
    #[inline]
    pub fn rx_data_open(self) -> bool {
        matches!(
            self,
            State::Established | State::FinWait1 | State::FinWait2
        )
    }

    /// States in which outbound payload may still be sent.
    #[inline]
    pub fn tx_data_open(self) -> bool {
        matches!(self, State::Established | State::CloseWait)
    }
}

impl core::fmt::Display for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use State::*;
        match self {
            Closed => write!(f, "CLOSED"),
            Listen => write!(f, "LISTEN"),
            SynSent => write!(f, "SYN-SENT"),
            SynRcvd => write!(f, "SYN-RCVD"),
            Established => write!(f, "ESTABLISHED"),
            FinWait1 => write!(f, "FIN-WAIT-1"),
            FinWait2 => write!(f, "FIN-WAIT-2"),
            Closing => write!(f, "CLOSING"),
            TimeWait => write!(f, "TIME-WAIT"),
            CloseWait => write!(f, "CLOSE-WAIT"),
            LastAck => write!(f, "LAST-ACK"),
        }
    }
}
