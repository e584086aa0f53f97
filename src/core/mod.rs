// Core modules implementing the engine boundary, batching, sessions, and
// error modeling.
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod status;
