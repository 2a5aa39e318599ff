mod ether_type_impl;
pub use ether_type_impl::*;

mod ethernet_frame;
pub use ethernet_frame::*;
