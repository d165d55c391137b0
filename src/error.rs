//! Internal error taxonomy for a single sandbox `exec` call (grounded on
//! `rindag-devs-rindag-rust`'s `judge::error` module). Never surfaced on the
//! wire directly: callers fold it into a verdict and message instead.

use thiserror::Error;

use crate::sandbox::{CmdResult, ExecRequest, SandboxClient};

#[derive(Debug, Error)]
pub enum SandboxCallError {
    #[error("sandbox exec failed: {0}")]
    Exec(#[from] anyhow::Error),
    #[error("sandbox returned no results for this command")]
    NoResults,
}

/// Runs a single-command `exec` request and unwraps its lone result,
/// folding "no results" and transport failures into one error type.
pub fn exec_one(sandbox: &dyn SandboxClient, request: &ExecRequest) -> Result<CmdResult, SandboxCallError> {
    let mut response = sandbox.exec(request)?;
    if response.results.is_empty() {
        return Err(SandboxCallError::NoResults);
    }
    Ok(response.results.remove(0))
}
