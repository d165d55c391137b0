//! Wire types for the sandbox's `exec` operation (spec.md §4.1, §6).
//!
//! These mirror the JSON shape the external sandbox (go-judge and
//! compatible executors) actually speaks, as seen in
//! `examples/original_source/src/stdchal.py`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::verdict::SandboxStatus;

/// A source for `copyIn`: either a host path or a reference to a cached
/// file id previously produced by `copyOutCached`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CopyInSource {
    Src { src: String },
    FileId { #[serde(rename = "fileId")] file_id: String },
}

impl CopyInSource {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Src { src: path.into() }
    }

    pub fn cached(file_id: impl Into<String>) -> Self {
        Self::FileId {
            file_id: file_id.into(),
        }
    }
}

/// One of the three file slots (stdin/stdout/stderr) of a command.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FileSlot {
    /// Bind this slot to a file already on disk (used for stdin).
    Path { src: String },
    /// Capture the slot's content inline, up to `max` bytes.
    Collector { name: String, max: u64 },
    /// Bind the slot to an empty, writable scratch buffer.
    Empty { content: String },
}

impl FileSlot {
    pub fn input(path: impl Into<String>) -> Self {
        Self::Path { src: path.into() }
    }

    pub fn captured(name: impl Into<String>, max: u64) -> Self {
        Self::Collector {
            name: name.into(),
            max,
        }
    }

    pub fn empty() -> Self {
        Self::Empty {
            content: String::new(),
        }
    }
}

/// One command within an `exec` request's `cmd` array.
#[derive(Debug, Clone, Serialize)]
pub struct CmdEntry {
    pub args: Vec<String>,
    pub env: Vec<String>,
    /// Index 0 = stdin, 1 = stdout, 2 = stderr. `None` elides the slot.
    pub files: Vec<Option<FileSlot>>,
    #[serde(rename = "cpuLimit")]
    pub cpu_limit_ns: u64,
    #[serde(rename = "memoryLimit")]
    pub memory_limit_bytes: u64,
    #[serde(rename = "stackLimit", skip_serializing_if = "Option::is_none")]
    pub stack_limit_bytes: Option<u64>,
    #[serde(rename = "procLimit")]
    pub proc_limit: u32,
    #[serde(rename = "cpuRateLimit", skip_serializing_if = "Option::is_none")]
    pub cpu_rate_limit: Option<u32>,
    #[serde(rename = "strictMemoryLimit")]
    pub strict_memory_limit: bool,
    #[serde(rename = "copyIn")]
    pub copy_in: HashMap<String, CopyInSource>,
    #[serde(rename = "copyOut", skip_serializing_if = "Vec::is_empty")]
    pub copy_out: Vec<String>,
    #[serde(rename = "copyOutCached", skip_serializing_if = "Vec::is_empty")]
    pub copy_out_cached: Vec<String>,
    #[serde(rename = "copyOutMax", skip_serializing_if = "Option::is_none")]
    pub copy_out_max: Option<u64>,
}

impl CmdEntry {
    /// A sane starting point: no stack/rate limit, strict memory off,
    /// matching the defaults spec.md's per-case and compile caps build on.
    pub fn new(args: Vec<String>, cpu_limit_ns: u64, memory_limit_bytes: u64) -> Self {
        Self {
            args,
            env: vec!["PATH=/usr/bin:/bin".to_string()],
            files: Vec::new(),
            cpu_limit_ns,
            memory_limit_bytes,
            stack_limit_bytes: None,
            proc_limit: 1,
            cpu_rate_limit: None,
            strict_memory_limit: false,
            copy_in: HashMap::new(),
            copy_out: Vec::new(),
            copy_out_cached: Vec::new(),
            copy_out_max: None,
        }
    }
}

/// One side of a `pipeMapping` entry: a command index and an fd within it.
#[derive(Debug, Clone, Serialize)]
pub struct PipeEnd {
    pub index: usize,
    pub fd: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipeMapping {
    #[serde(rename = "in")]
    pub from: PipeEnd,
    #[serde(rename = "out")]
    pub to: PipeEnd,
    #[serde(skip_serializing_if = "is_false")]
    pub proxy: bool,
}

fn is_false(b: &bool) -> bool {
    !b
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecRequest {
    pub cmd: Vec<CmdEntry>,
    #[serde(rename = "pipeMapping", skip_serializing_if = "Vec::is_empty")]
    pub pipe_mapping: Vec<PipeMapping>,
}

/// Per-command result inside an `exec` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CmdResult {
    pub status: SandboxStatus,
    #[serde(rename = "exitStatus", default)]
    pub exit_status: i32,
    #[serde(rename = "runTime", default)]
    pub run_time_ns: u64,
    #[serde(default)]
    pub memory: u64,
    #[serde(default)]
    pub files: HashMap<String, String>,
    #[serde(rename = "fileIds", default)]
    pub file_ids: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecResponse {
    pub results: Vec<CmdResult>,
}

/// `init(config)` input (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct SandboxInitConfig {
    #[serde(rename = "cinitPath")]
    pub cinit_path: String,
    pub parallelism: u32,
}
