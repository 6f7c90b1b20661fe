//! Reference storage and lock backends for tusk

pub mod fjall_store;
pub mod locker;
pub mod memory;

pub use fjall_store::*;
pub use locker::*;
pub use memory::*;

/// Size of the buffer stores read request bodies through
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;
