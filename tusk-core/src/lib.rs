//! Core data models and contracts for tusk

pub mod composer;
pub mod concat;
pub mod error;
pub mod metadata;
pub mod store;
pub mod types;

pub use composer::*;
pub use concat::*;
pub use error::*;
pub use metadata::*;
pub use store::*;
pub use types::*;

/// Result type alias for tusk operations
pub type Result<T> = std::result::Result<T, TusError>;
