//! The submission data model (spec.md §3): immutable once enqueued, and
//! the per-run result vector it produces.

use serde::{Deserialize, Serialize};

use crate::verdict::Verdict;

/// Priority class (spec.md §4.7). Smaller drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Normal = 0,
    Contest = 1,
    ContestRejudge = 2,
    NormalRejudge = 3,
}

impl Priority {
    pub const COUNT: usize = 4;

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Normal,
            1 => Self::Contest,
            2 => Self::ContestRejudge,
            3 => Self::NormalRejudge,
            _ => return None,
        })
    }

    pub fn index(self) -> usize {
        self as u8 as usize
    }

    /// Rejudge queues reserve at least one concurrency slot against floods
    /// (spec.md §4.7).
    pub fn reserves_a_slot(self) -> bool {
        matches!(self, Self::ContestRejudge | Self::NormalRejudge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompType {
    Gcc,
    #[serde(rename = "g++")]
    Gxx,
    Clang,
    #[serde(rename = "clang++")]
    Clangxx,
    Makefile,
    Python3,
    Rustc,
    Java,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckType {
    Diff,
    DiffStrict,
    Ioredir,
    Cms,
}

/// `metadata.redir_test`/`metadata.redir_check` fd tables for `ioredir`
/// (spec.md §6). `-1` means "not wired".
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct RedirTestFds {
    pub testin: i32,
    pub testout: i32,
    pub pipein: i32,
    pub pipeout: i32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct RedirCheckFds {
    pub ansin: i32,
    pub testin: i32,
    pub pipein: i32,
    pub pipeout: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Metadata {
    pub redir_test: Option<RedirTestFds>,
    pub redir_check: Option<RedirCheckFds>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestCaseWire {
    #[serde(rename = "in")]
    pub in_path: String,
    pub ans: String,
    /// Milliseconds on the wire; converted to nanoseconds on load.
    pub timelimit: u64,
    pub memlimit: u64,
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub in_path: String,
    pub ans_path: String,
    pub timelimit_ns: u64,
    pub memlimit_bytes: u64,
}

impl From<TestCaseWire> for TestCase {
    fn from(wire: TestCaseWire) -> Self {
        Self {
            in_path: wire.in_path,
            ans_path: wire.ans,
            // spec.md §6: timelimit arrives in ms, ×10^6 for ns.
            timelimit_ns: wire.timelimit * 1_000_000,
            memlimit_bytes: wire.memlimit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestGroup(pub Vec<TestCase>);

#[derive(Debug, Deserialize)]
pub struct SubmissionWire {
    pub chal_id: u64,
    pub pri: u8,
    pub code_path: String,
    pub res_path: String,
    pub comp_type: CompType,
    pub check_type: CheckType,
    pub test: Vec<Vec<TestCaseWire>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An enqueued submission (spec.md §3). Immutable for its whole lifetime.
#[derive(Debug, Clone)]
pub struct Submission {
    pub chal_id: u64,
    pub pri: Priority,
    pub code_path: String,
    pub res_path: String,
    pub comp_type: CompType,
    pub check_type: CheckType,
    pub test: Vec<TestGroup>,
    pub metadata: Metadata,
}

impl TryFrom<SubmissionWire> for Submission {
    type Error = anyhow::Error;

    fn try_from(wire: SubmissionWire) -> Result<Self, Self::Error> {
        let pri = Priority::from_u8(wire.pri)
            .ok_or_else(|| anyhow::anyhow!("priority {} out of range 0..=3", wire.pri))?;
        let test = wire
            .test
            .into_iter()
            .map(|group| TestGroup(group.into_iter().map(TestCase::from).collect()))
            .collect();

        Ok(Self {
            chal_id: wire.chal_id,
            pri,
            code_path: wire.code_path,
            res_path: wire.res_path,
            comp_type: wire.comp_type,
            check_type: wire.check_type,
            test,
            metadata: wire.metadata,
        })
    }
}

/// One outcome slot, one per [`TestGroup`] (spec.md §3).
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    #[serde(skip)]
    pub status: Option<Verdict>,
    pub time: u64,
    pub memory: u64,
    pub verdict: String,
}

impl CaseResult {
    pub fn new() -> Self {
        Self {
            status: None,
            time: 0,
            memory: 0,
            verdict: String::new(),
        }
    }

    /// The per-case skip rule (spec.md §4.5): once set to a terminal
    /// non-Accepted verdict, remaining cases in the group are skipped.
    pub fn should_skip(&self) -> bool {
        matches!(
            self.status,
            Some(
                Verdict::TimeLimitExceeded
                    | Verdict::MemoryLimitExceeded
                    | Verdict::OutputLimitExceeded
                    | Verdict::RuntimeError
                    | Verdict::RuntimeErrorSignalled
                    | Verdict::InternalError
                    | Verdict::WrongAnswer
            )
        )
    }

    pub fn record_metrics(&mut self, time_ns: u64, memory_bytes: u64) {
        self.time = self.time.max(time_ns);
        self.memory = self.memory.max(memory_bytes);
    }
}

impl Default for CaseResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable status field for the outbound wire shape: a verdict once
/// resolved, integer-encoded (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct WireCaseResult {
    pub status: u8,
    pub time: u64,
    pub memory: u64,
    pub verdict: String,
}

impl From<&CaseResult> for WireCaseResult {
    fn from(result: &CaseResult) -> Self {
        Self {
            status: result.status.map(|v| v as u8).unwrap_or(0),
            time: result.time,
            memory: result.memory,
            verdict: result.verdict.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundResult {
    pub chal_id: u64,
    pub results: Vec<WireCaseResult>,
}

impl OutboundResult {
    pub fn new(chal_id: u64, results: &[CaseResult]) -> Self {
        Self {
            chal_id,
            results: results.iter().map(WireCaseResult::from).collect(),
        }
    }
}
