mod tcp_frame;
pub use tcp_frame::*;

mod tcp_option_impl;
pub use tcp_option_impl::*;

mod udp_frame;
pub use udp_frame::*;
