//! Purpose: Safe `Engine` implementation over the dynamically loaded artifact.
//! Exports: `NativeEngine`.
//! Role: Marshals batches into the parallel-array call shape the engine
//! expects and decodes its out-parameters.
//! Invariants: Absent credentials cross as null pointers, never as "".
//! Invariants: Engine-owned strings are copied out before the call returns.
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

use libc::{c_char, c_uint, c_void, size_t};

use crate::core::batch::StorageCredentials;
use crate::core::config::EngineConfig;
use crate::core::engine::{Engine, EngineSession, PollReply, RawStatus, SubmitReply, SubmitView};
use crate::core::engine::sys;
use crate::core::error::Error;

/// The real streaming engine, bound from the artifact named by
/// [`EngineConfig`]. Loading resolves every entry point up front, so a bad
/// artifact fails here rather than mid-stream.
pub struct NativeEngine {
    library: Arc<sys::Library>,
    path: PathBuf,
}

impl NativeEngine {
    pub fn load(config: &EngineConfig) -> Result<Self, Error> {
        let library = sys::Library::load(config.library_path())?;
        tracing::debug!(path = %config.library_path().display(), "engine artifact loaded");
        Ok(Self {
            library: Arc::new(library),
            path: config.library_path().to_path_buf(),
        })
    }

    pub fn library_path(&self) -> &std::path::Path {
        &self.path
    }
}

impl std::fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEngine")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Engine for NativeEngine {
    fn open(&self) -> Result<Box<dyn EngineSession>, RawStatus> {
        let mut handle: sys::RawHandle = ptr::null_mut();
        let status = unsafe { (self.library.start)(&mut handle) };
        if status != super::STATUS_OK {
            return Err(status);
        }
        Ok(Box::new(NativeSession {
            library: Arc::clone(&self.library),
            handle,
        }))
    }

    fn describe_status(&self, code: RawStatus) -> Option<String> {
        let ptr = unsafe { (self.library.response_str)(code) };
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

struct NativeSession {
    library: Arc<sys::Library>,
    handle: sys::RawHandle,
}

// The handle is an opaque engine token. The session layer serializes all use
// of it, per the single-owner contract.
unsafe impl Send for NativeSession {}

impl EngineSession for NativeSession {
    fn submit(
        &mut self,
        items: &mut [SubmitView<'_>],
        credentials: &StorageCredentials,
    ) -> SubmitReply {
        // Batch validation has already rejected nul bytes in sources.
        let sources: Vec<CString> = items
            .iter()
            .map(|item| CString::new(item.source).expect("source contains no nul bytes"))
            .collect();
        let source_ptrs: Vec<*const c_char> = sources.iter().map(|s| s.as_ptr()).collect();
        let offsets: Vec<size_t> = items.iter().map(|item| item.offset as size_t).collect();
        let lengths: Vec<size_t> = items.iter().map(|item| item.length as size_t).collect();
        let destinations: Vec<*mut c_void> = items
            .iter_mut()
            .map(|item| item.destination.as_mut_ptr() as *mut c_void)
            .collect();

        let key = opt_cstring(credentials.key.as_deref());
        let secret = opt_cstring(credentials.secret.as_deref());
        let token = opt_cstring(credentials.token.as_deref());
        let region = opt_cstring(credentials.region.as_deref());
        let endpoint = opt_cstring(credentials.endpoint.as_deref());

        let mut slots: c_uint = 0;
        // Engine-owned per-slot size table; this driver does not consume it.
        let mut slot_sizes: *const size_t = ptr::null();

        let status = unsafe {
            (self.library.request)(
                self.handle,
                items.len() as c_uint,
                source_ptrs.as_ptr(),
                offsets.as_ptr(),
                lengths.as_ptr(),
                destinations.as_ptr(),
                &mut slots,
                &mut slot_sizes,
                opt_ptr(&key),
                opt_ptr(&secret),
                opt_ptr(&token),
                opt_ptr(&region),
                opt_ptr(&endpoint),
            )
        };

        SubmitReply {
            status,
            slots: slots as u32,
        }
    }

    fn poll(&mut self) -> PollReply {
        let mut index: c_uint = 0;
        // Second out-word is reserved by the engine.
        let mut reserved: c_uint = 0;
        let status = unsafe { (self.library.response)(self.handle, &mut index, &mut reserved) };
        PollReply {
            status,
            index: index as u32,
        }
    }

    fn close(&mut self) {
        unsafe {
            (self.library.end)(self.handle);
        }
    }
}

fn opt_cstring(value: Option<&str>) -> Option<CString> {
    // Batch validation has already rejected nul bytes in credentials.
    value.and_then(|v| CString::new(v).ok())
}

fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |v| v.as_ptr())
}
