//! Resumable upload protocol engine
//!
//! The [`Handler`] implements creation, chunked writes, introspection,
//! download and termination of uploads on top of the storage contracts in
//! `tusk_core`. It is transport-agnostic: requests come in as
//! [`UploadRequest`] values and leave as [`UploadResponse`] values, so any
//! HTTP stack can drive it.

mod body;
mod chunk;
mod lock;

pub mod config;
pub mod handler;
pub mod hooks;
pub mod metrics;
pub mod protocol;
pub mod request;

pub use config::*;
pub use handler::*;
pub use hooks::{DeliveryPolicy, HookEvent, HookReceivers, HookType, StopHandle};
pub use metrics::*;
pub use request::*;
