//! The sandbox client (C1): a thin typed façade over the external
//! executor's init/exec/file-store/diff primitives (spec.md §4.1).

pub mod client;
pub mod fake;
pub mod gojudge;
pub mod types;

pub use client::SandboxClient;
pub use gojudge::GoJudgeClient;
pub use types::{
    CmdEntry, CmdResult, CopyInSource, ExecRequest, ExecResponse, FileSlot, PipeEnd, PipeMapping,
    SandboxInitConfig,
};
