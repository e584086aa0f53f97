//! Purpose: Client driver for a native bulk asynchronous file streaming engine.
//! Exports: `api` (stable surface) and `core` (protocol state machine, engine
//! boundary, errors).
//! Role: Library crate; callers hand the engine batches of (source, offset,
//! length, destination) items and poll completions out of order.
//! Invariants: All FFI interaction is confined to `core::engine::{native, sys}`.
//! Invariants: Protocol misuse fails locally; it never crosses the boundary.
pub mod api;
pub mod core;
