//! Purpose: The boundary between this driver and a streaming engine.
//! Exports: `Engine`, `EngineSession`, raw reply shapes, `STATUS_OK`.
//! Role: Everything above this module speaks these traits; only the `native`
//! implementation knows it is talking to a dynamic library.
//! Invariants: Replies carry raw engine status codes; translation into
//! `Error` happens in the session layer, immediately after each crossing.

use crate::core::batch::StorageCredentials;

#[cfg(unix)]
pub mod native;
#[cfg(unix)]
pub mod sys;

#[cfg(unix)]
pub use native::NativeEngine;

/// Engine-defined outcome indicator. Zero is success everywhere.
pub type RawStatus = i32;

pub const STATUS_OK: RawStatus = 0;

/// Borrowed view of one item as it crosses the submit boundary. The
/// destination slice aliases a buffer the session keeps alive and untouched
/// until the item's completion is observed.
#[derive(Debug)]
pub struct SubmitView<'a> {
    pub source: &'a str,
    pub offset: u64,
    pub length: u64,
    pub destination: &'a mut [u8],
}

/// Raw result of a submit crossing: engine status plus, on success, how many
/// completion slots the engine allocated for the batch. Slots may exceed the
/// item count when the engine fans one item into several completion units.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubmitReply {
    pub status: RawStatus,
    pub slots: u32,
}

/// Raw result of a poll crossing: status of the completed unit plus its
/// index within the batch's slot range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollReply {
    pub status: RawStatus,
    pub index: u32,
}

/// One opened engine instance. Obtained from [`Engine::open`]; the session
/// layer guarantees `close` runs exactly once and that no call follows it.
pub trait EngineSession: Send {
    /// Queue a validated batch. Returns promptly once the engine has
    /// accepted or refused it; completion is reported through `poll`.
    fn submit(&mut self, items: &mut [SubmitView<'_>], credentials: &StorageCredentials)
    -> SubmitReply;

    /// Block until the engine has a completion ready. The single suspension
    /// point in the protocol.
    fn poll(&mut self) -> PollReply;

    /// Release the engine instance. Best effort; the engine reports nothing.
    fn close(&mut self);
}

/// A bound streaming engine. Implemented by [`NativeEngine`] for the real
/// artifact and by scripted fakes in tests.
pub trait Engine: Send + Sync {
    /// Request a fresh engine instance. A non-success status comes back as
    /// the raw code for the caller to resolve.
    fn open(&self) -> Result<Box<dyn EngineSession>, RawStatus>;

    /// Engine-side description of a status code, if it has one. The string
    /// is copied out before this returns; the engine only guarantees the
    /// backing storage for the duration of the call.
    fn describe_status(&self, code: RawStatus) -> Option<String>;
}
