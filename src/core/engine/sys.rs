// Raw dynamic binding to the native streaming engine artifact.
use std::ffi::{CStr, CString};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use libc::{c_char, c_int, c_uint, c_void, size_t};

use crate::core::error::{Error, ErrorKind};

/// Opaque engine instance handle. Owned by the engine; the driver only
/// passes it back.
pub type RawHandle = *mut c_void;

pub type StartFn = unsafe extern "C" fn(out_handle: *mut RawHandle) -> c_int;

pub type EndFn = unsafe extern "C" fn(handle: RawHandle);

#[allow(clippy::type_complexity)]
pub type RequestFn = unsafe extern "C" fn(
    handle: RawHandle,
    num_items: c_uint,
    sources: *const *const c_char,
    offsets: *const size_t,
    lengths: *const size_t,
    destinations: *const *mut c_void,
    out_slots: *mut c_uint,
    out_slot_sizes: *mut *const size_t,
    key: *const c_char,
    secret: *const c_char,
    token: *const c_char,
    region: *const c_char,
    endpoint: *const c_char,
) -> c_int;

pub type ResponseFn =
    unsafe extern "C" fn(handle: RawHandle, out_index: *mut c_uint, out_word: *mut c_uint) -> c_int;

pub type ResponseStrFn = unsafe extern "C" fn(code: c_int) -> *const c_char;

const SYM_START: &CStr = c"streamer_start";
const SYM_END: &CStr = c"streamer_end";
const SYM_REQUEST: &CStr = c"streamer_request";
const SYM_RESPONSE: &CStr = c"streamer_response";
const SYM_RESPONSE_STR: &CStr = c"streamer_response_str";

/// A loaded engine artifact with every entry point resolved. Missing symbols
/// fail the load; nothing is resolved lazily.
pub struct Library {
    handle: *mut c_void,
    pub start: StartFn,
    pub end: EndFn,
    pub request: RequestFn,
    pub response: ResponseFn,
    pub response_str: ResponseStrFn,
}

// The dl handle and resolved entry points are usable from any thread; the
// per-instance single-owner contract lives a level up.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").finish_non_exhaustive()
    }
}

impl Library {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|err| {
            Error::new(ErrorKind::Config)
                .with_path(path)
                .with_message("library path contains a nul byte")
                .with_source(err)
        })?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(Error::new(ErrorKind::Config)
                .with_path(path)
                .with_message(format!(
                    "failed to load engine artifact: {}",
                    dl_error().unwrap_or_else(|| "dlopen failed".to_string())
                )));
        }

        let loader = Loader { handle, path };
        let library: Result<Self, Error> = (|| {
            Ok(Self {
                handle,
                start: unsafe { mem::transmute::<*mut c_void, StartFn>(loader.symbol(SYM_START)?) },
                end: unsafe { mem::transmute::<*mut c_void, EndFn>(loader.symbol(SYM_END)?) },
                request: unsafe {
                    mem::transmute::<*mut c_void, RequestFn>(loader.symbol(SYM_REQUEST)?)
                },
                response: unsafe {
                    mem::transmute::<*mut c_void, ResponseFn>(loader.symbol(SYM_RESPONSE)?)
                },
                response_str: unsafe {
                    mem::transmute::<*mut c_void, ResponseStrFn>(loader.symbol(SYM_RESPONSE_STR)?)
                },
            })
        })();

        if library.is_err() {
            unsafe {
                libc::dlclose(handle);
            }
        }
        library
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

struct Loader<'a> {
    handle: *mut c_void,
    path: &'a Path,
}

impl Loader<'_> {
    fn symbol(&self, name: &CStr) -> Result<*mut c_void, Error> {
        let sym = unsafe { libc::dlsym(self.handle, name.as_ptr()) };
        if sym.is_null() {
            return Err(Error::new(ErrorKind::Config)
                .with_path(self.path)
                .with_message(format!(
                    "engine artifact is missing symbol {}",
                    name.to_string_lossy()
                )));
        }
        Ok(sym)
    }
}

fn dl_error() -> Option<String> {
    let ptr = unsafe { libc::dlerror() };
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}
