//! Production [`SandboxClient`] backed by the sandbox's shared library.
//!
//! The original judge (`examples/original_source/src/executor_server.py`)
//! loads `executor_server_lib_without_seccomp.so` with Python's `cffi` and
//! calls five C entry points directly. This is the same bridge built with
//! `libloading`, which is the idiomatic Rust analogue of a `cffi.dlopen`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use anyhow::{Context, Result, anyhow, bail};
use libloading::{Library, Symbol};

use super::client::SandboxClient;
use super::types::{ExecRequest, ExecResponse, SandboxInitConfig};

type InitFn = unsafe extern "C" fn(*const c_char) -> c_int;
type ExecFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;
type FileDeleteFn = unsafe extern "C" fn(*const c_char) -> c_int;
type DiffFn = unsafe extern "C" fn(*const c_char, *const c_char) -> c_int;

/// A loaded handle to the sandbox's FFI library.
pub struct GoJudgeClient {
    lib: Library,
}

impl GoJudgeClient {
    /// Loads the shared library at `path` (e.g.
    /// `./executor_server_lib_without_seccomp.so`).
    pub fn load(path: &str) -> Result<Self> {
        let lib = unsafe { Library::new(path) }
            .with_context(|| format!("failed to load sandbox library at {path}"))?;
        Ok(Self { lib })
    }

    fn symbol<T>(&self, name: &[u8]) -> Result<Symbol<'_, T>> {
        unsafe { self.lib.get(name) }
            .map_err(|e| anyhow!("sandbox library missing symbol {:?}: {e}", name))
    }

    /// Calls a `char* f(char*)`-shaped function, freeing neither input nor
    /// (by design) the returned pointer — the sandbox library owns it.
    fn call_json(&self, symbol: &[u8], payload: &str) -> Result<String> {
        let exec: Symbol<ExecFn> = self.symbol(symbol)?;
        let input = CString::new(payload).context("request contained an interior NUL")?;
        let raw = unsafe { exec(input.as_ptr()) };
        if raw.is_null() {
            bail!("sandbox call to {:?} returned a null pointer", symbol);
        }
        let out = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        Ok(out)
    }
}

impl SandboxClient for GoJudgeClient {
    fn init(&self, config: &SandboxInitConfig) -> Result<()> {
        let init: Symbol<InitFn> = self.symbol(b"Init\0")?;
        let payload = serde_json::to_string(config)?;
        let input = CString::new(payload)?;
        let rc = unsafe { init(input.as_ptr()) };
        if rc != 0 {
            bail!("sandbox Init returned nonzero status {rc}");
        }
        Ok(())
    }

    fn exec(&self, request: &ExecRequest) -> Result<ExecResponse> {
        let payload = serde_json::to_string(request).context("serializing exec request")?;
        let raw = self.call_json(b"Exec\0", &payload)?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed exec response from sandbox: {raw}"))
    }

    fn file_delete(&self, file_id: &str) -> Result<bool> {
        let delete: Symbol<FileDeleteFn> = self.symbol(b"FileDelete\0")?;
        let input = CString::new(file_id)?;
        let rc = unsafe { delete(input.as_ptr()) };
        Ok(rc != 0)
    }

    fn diff_strict(&self, a: &[u8], b: &[u8]) -> Result<bool> {
        let diff: Symbol<DiffFn> = self.symbol(b"DiffStrictly\0")?;
        let a = CString::new(a)?;
        let b = CString::new(b)?;
        let rc = unsafe { diff(a.as_ptr(), b.as_ptr()) };
        Ok(rc == 0)
    }

    fn diff_ignore_trailing_space(&self, a: &[u8], b: &[u8]) -> Result<bool> {
        let diff: Symbol<DiffFn> = self.symbol(b"DiffIgnoreTrailiingSpace\0")?;
        let a = CString::new(a)?;
        let b = CString::new(b)?;
        let rc = unsafe { diff(a.as_ptr(), b.as_ptr()) };
        Ok(rc == 0)
    }
}
