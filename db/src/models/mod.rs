pub mod activation_code;
pub mod binding;
pub mod typed_ulid;

pub use activation_code::*;
pub use binding::*;
pub use typed_ulid::*;
