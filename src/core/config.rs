//! Purpose: Select which engine artifact the driver binds to.
//! Exports: `EngineConfig`, `LIBRARY_ENV`.
//! Role: Process-start configuration; resolved once, immutable afterwards.
//! Invariants: An explicit path always wins over the environment override.
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the engine artifact path.
pub const LIBRARY_ENV: &str = "STREAMER_LIBRARY";

#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY_NAME: &str = "libstreamer.dylib";
#[cfg(not(target_os = "macos"))]
const DEFAULT_LIBRARY_NAME: &str = "libstreamer.so";

/// Which engine artifact to bind. Build it once at process start and keep it
/// for the life of the process; the driver never re-reads the environment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    library_path: PathBuf,
}

impl EngineConfig {
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
        }
    }

    /// Resolve the artifact path from `STREAMER_LIBRARY`, falling back to the
    /// platform default name (left to the loader's search path).
    pub fn from_env() -> Self {
        Self {
            library_path: resolve_library_path(env::var_os(LIBRARY_ENV)),
        }
    }

    pub fn library_path(&self) -> &Path {
        &self.library_path
    }
}

fn resolve_library_path(override_path: Option<OsString>) -> PathBuf {
    match override_path {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_LIBRARY_NAME),
    }
}
