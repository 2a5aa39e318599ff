//! A userland TCP/IP stack core.
//!
//! `ustack` contains the pieces a TCP/IP stack is made of, without any
//! of the I/O: zero-copy frame views over caller-owned buffers, an
//! RFC 9293 transmission control block, a retransmission ring coupling
//! a byte stream to in-flight segments, a passive-open listener with a
//! SYN-cookie jar, and a bounded DNS codec.
//!
//! No function in this crate calls the operating system, blocks or
//! waits. Every entry point transforms byte buffers the caller
//! provides and reports how many bytes were consumed or produced;
//! sockets, timers and retransmission deadlines belong to the
//! embedding stack.
//!
//! # Frame views
//!
//! Each protocol header has a view type over a mutable byte buffer:
//! [`EthernetFrame`], [`Ipv4Frame`], [`Ipv6Frame`], [`TcpFrame`] and
//! [`UdpFrame`]. Construction only checks the fixed header size;
//! variable sized portions are verified by the `validate_size` methods
//! which collect annotated errors in a [`Validator`]. All accessors
//! read and write the buffer directly, there is no cached state:
//!
//! ```
//! use ustack::{TcpFrame, Validator};
//!
//! let mut buf = [0u8; 28];
//! let mut frame = TcpFrame::from_slice(&mut buf).unwrap();
//! frame.set_source_port(49152);
//! frame.set_destination_port(80);
//! frame.set_data_offset(5);
//!
//! let mut v = Validator::new();
//! frame.validate_except_crc(&mut v);
//! assert!(v.is_ok());
//! assert_eq!(8, frame.payload().len());
//! ```
//!
//! # TCP engine
//!
//! [`ControlBlock`] is the pure state machine: it consumes and
//! produces [`Segment`] summaries and never touches payload bytes.
//! [`RetransmitRing`] stores the outbound byte stream and its
//! in-flight packet descriptors. [`Handler`] couples both to wire
//! frames, [`Listener`] demultiplexes a listening port onto pooled
//! connections, and [`CookieJar`] provides stateless SYN admission.
//!
//! # DNS
//!
//! The [`dns`] module holds a bounded message codec with label
//! compression support and a small single-lookup client.

mod checksum;
pub use crate::checksum::*;

/// Module containing error types of the frame view layer.
pub mod err;

/// Bounded DNS message codec & lookup client.
pub mod dns;

mod helpers;
pub(crate) use crate::helpers::*;

mod link;
pub use crate::link::*;

mod net;
pub use crate::net::*;

/// The TCP engine: control block, rings, handler, listener and SYN
/// cookies.
pub mod tcp;
pub use crate::tcp::{
    Conn, ConnHandle, ConnPool, ControlBlock, CookieJar, FourTuple, Handler, HandlerError,
    Listener, ListenerError, RecvRing, RejectError, RetransmitRing, RingError, Segment, SeqNum,
    State,
};

mod transport;
pub use crate::transport::*;

mod validate;
pub use crate::validate::*;
