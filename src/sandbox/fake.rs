//! Deterministic [`SandboxClient`] double for dispatcher/runner tests
//! (spec.md §9: "a fake implementation enables deterministic testing of the
//! scheduler and verdict mapping").

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, bail};
use parking_lot::Mutex;

use super::client::SandboxClient;
use super::types::{ExecRequest, ExecResponse, SandboxInitConfig};

/// A fake sandbox driven by a caller-supplied script of responses.
///
/// Each call to [`exec`](SandboxClient::exec) pops the next scripted
/// response in order; calling past the end of the script is a test bug and
/// panics loudly rather than returning a misleading default.
pub struct FakeSandboxClient {
    responses: Mutex<VecDeque<ExecResponse>>,
    next_file_id: AtomicU64,
    deleted: Mutex<Vec<String>>,
}

impl FakeSandboxClient {
    pub fn new(responses: Vec<ExecResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            next_file_id: AtomicU64::new(1),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// File ids released via `file_delete` so far, for invariant checks
    /// like "count created equals count released".
    pub fn deleted_file_ids(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    pub fn fresh_file_id(&self) -> String {
        format!("file-{}", self.next_file_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl SandboxClient for FakeSandboxClient {
    fn init(&self, _config: &SandboxInitConfig) -> Result<()> {
        Ok(())
    }

    fn exec(&self, _request: &ExecRequest) -> Result<ExecResponse> {
        let mut responses = self.responses.lock();
        match responses.pop_front() {
            Some(response) => Ok(response),
            None => bail!("FakeSandboxClient: exec called with no scripted response left"),
        }
    }

    fn file_delete(&self, file_id: &str) -> Result<bool> {
        self.deleted.lock().push(file_id.to_string());
        Ok(true)
    }

    fn diff_strict(&self, a: &[u8], b: &[u8]) -> Result<bool> {
        Ok(a == b)
    }

    fn diff_ignore_trailing_space(&self, a: &[u8], b: &[u8]) -> Result<bool> {
        let normalize = |s: &[u8]| -> Vec<u8> {
            String::from_utf8_lossy(s)
                .lines()
                .map(|line| line.trim_end())
                .collect::<Vec<_>>()
                .join("\n")
                .trim_end()
                .as_bytes()
                .to_vec()
        };
        Ok(normalize(a) == normalize(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_ignore_trailing_space_tolerates_trailing_whitespace() {
        let client = FakeSandboxClient::new(vec![]);
        assert!(
            client
                .diff_ignore_trailing_space(b"42 \n\n", b"42\n")
                .unwrap()
        );
    }

    #[test]
    fn diff_strict_rejects_trailing_whitespace() {
        let client = FakeSandboxClient::new(vec![]);
        assert!(!client.diff_strict(b"42 \n", b"42\n").unwrap());
    }

    #[test]
    fn exec_past_script_end_errors() {
        let client = FakeSandboxClient::new(vec![]);
        let request = ExecRequest {
            cmd: vec![],
            pipe_mapping: vec![],
        };
        assert!(client.exec(&request).is_err());
    }
}
