//! The TCP engine: sequence arithmetic, the RFC 9293 control block,
//! the retransmission ring, the wire handler, the passive-open
//! listener and the SYN-cookie jar.

mod handler;
pub use handler::*;

mod listener;
pub use listener::*;

mod ring;
pub use ring::*;

mod segment;
pub use segment::*;

mod seq;
pub use seq::*;

mod state;
pub use state::*;

mod syn_cookie;
pub use syn_cookie::*;

mod tcb;
pub use tcb::*;
