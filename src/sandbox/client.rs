//! The narrow sandbox interface (spec.md §4.1).
//!
//! Generalizes the teacher's `SandboxRunner` trait (which abstracted over
//! `isolate`-vs-no-sandbox backends) to abstract over the wire format of an
//! externally-running sandbox process instead.

use anyhow::Result;

use super::types::{ExecRequest, ExecResponse, SandboxInitConfig};

pub trait SandboxClient: Send + Sync {
    /// Initializes the sandbox's container runtime. Returns `Ok(())` on a
    /// zero return code.
    fn init(&self, config: &SandboxInitConfig) -> Result<()>;

    /// Runs one or more commands as described by `request`.
    fn exec(&self, request: &ExecRequest) -> Result<ExecResponse>;

    /// Releases a cached file id. Returns `true` on success.
    fn file_delete(&self, file_id: &str) -> Result<bool>;

    /// Byte-exact equality.
    fn diff_strict(&self, a: &[u8], b: &[u8]) -> Result<bool>;

    /// Equality up to trailing whitespace per line and trailing blank
    /// lines.
    fn diff_ignore_trailing_space(&self, a: &[u8], b: &[u8]) -> Result<bool>;
}
