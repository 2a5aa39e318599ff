mod ip_number_impl;
pub use ip_number_impl::*;

mod ipv4_frame;
pub use ipv4_frame::*;

mod ipv6_frame;
pub use ipv6_frame::*;
