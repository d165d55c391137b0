//! Special judge ("checker") compilation (C4, spec.md §4.4).
//!
//! The checker is built once per submission from every regular file under
//! `{res_path}/check`, the same `copy_in` convention the `makefile` compiler
//! uses for `{res_path}/make`. Unlike a normal compile error, a checker that
//! fails to build does not produce `CompileError` — every test group's
//! result becomes `InternalError` instead (spec.md §4.4: the judge itself is
//! broken, not the submission).

use crate::compile::regular_files;
use crate::sandbox::{CmdEntry, CopyInSource, FileSlot, SandboxClient};
use crate::verdict::SandboxStatus;

const CHECKER_CPU_LIMIT_NS: u64 = 10_000_000_000;
const CHECKER_MEMORY_LIMIT_BYTES: u64 = 2 << 30;
const STDERR_CAP_BYTES: u64 = 100 * 1024;
pub const CHECKER_ARTIFACT_NAME: &str = "check";

pub struct CheckerOutcome {
    pub compiled: bool,
    pub artifact_id: Option<String>,
    pub stderr: String,
}

/// Builds the checker found at `{res_path}/check` via `sh build`, matching
/// `comp_checker` in the original judge.
pub fn compile_checker(sandbox: &dyn SandboxClient, res_path: &str) -> CheckerOutcome {
    let check_dir = std::path::Path::new(res_path).join("check");
    let files = match regular_files(&check_dir) {
        Ok(files) => files,
        Err(e) => {
            return CheckerOutcome {
                compiled: false,
                artifact_id: None,
                stderr: format!("failed to read checker resources: {e}"),
            };
        }
    };

    let mut entry = CmdEntry::new(
        vec!["/bin/sh".to_string(), "build".to_string()],
        CHECKER_CPU_LIMIT_NS,
        CHECKER_MEMORY_LIMIT_BYTES,
    );
    entry.proc_limit = 10;
    for file in &files {
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            return CheckerOutcome {
                compiled: false,
                artifact_id: None,
                stderr: format!("non-UTF8 file name under {}", check_dir.display()),
            };
        };
        entry
            .copy_in
            .insert(name.to_string(), CopyInSource::path(file.to_string_lossy()));
    }
    entry.files = vec![
        Some(FileSlot::empty()),
        Some(FileSlot::empty()),
        Some(FileSlot::captured("stderr", STDERR_CAP_BYTES)),
    ];
    entry.copy_out = vec!["stderr".to_string()];
    entry.copy_out_cached = vec![CHECKER_ARTIFACT_NAME.to_string()];

    let request = crate::sandbox::ExecRequest {
        cmd: vec![entry],
        pipe_mapping: vec![],
    };

    let result = match crate::error::exec_one(sandbox, &request) {
        Ok(result) => result,
        Err(e) => {
            return CheckerOutcome {
                compiled: false,
                artifact_id: None,
                stderr: e.to_string(),
            };
        }
    };

    let stderr = result.files.get("stderr").cloned().unwrap_or_default();
    match result.status {
        SandboxStatus::Accepted => CheckerOutcome {
            compiled: true,
            artifact_id: result.file_ids.get(CHECKER_ARTIFACT_NAME).cloned(),
            stderr,
        },
        _ => CheckerOutcome {
            compiled: false,
            artifact_id: None,
            stderr,
        },
    }
}
