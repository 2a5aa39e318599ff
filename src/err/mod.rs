//! Error types of the frame view layer.

mod field_error;
pub use field_error::*;

mod layer;
pub use layer::*;

mod len_error;
pub use len_error::*;

mod len_source;
pub use len_source::*;
