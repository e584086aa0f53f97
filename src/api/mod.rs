//! Purpose: Define the stable public surface for embedders of this driver.
//! Exports: Configuration, the engine traits, batch types, and sessions.
//! Role: The one public path to the protocol core; additive-only.
//! Invariants: Raw FFI stays behind `core::engine`; nothing here exposes
//! pointers or engine handles.

pub use crate::core::batch::{Batch, StorageCredentials, StreamItem};
pub use crate::core::config::{EngineConfig, LIBRARY_ENV};
#[cfg(unix)]
pub use crate::core::engine::NativeEngine;
pub use crate::core::engine::{
    Engine, EngineSession, PollReply, RawStatus, STATUS_OK, SubmitReply, SubmitView,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::session::{Client, Completion, ItemOutcome, Session};
pub use crate::core::status::resolve;
