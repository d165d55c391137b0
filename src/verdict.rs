//! The wire-stable verdict taxonomy (spec.md §6).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// User-visible outcome of a single test group.
///
/// Discriminants are part of the wire protocol: the frontend matches on
/// these integers, so they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Verdict {
    Accepted = 1,
    /// Preserved for wire compatibility; no path in this engine produces it.
    PartialCorrect = 2,
    WrongAnswer = 3,
    RuntimeError = 4,
    RuntimeErrorSignalled = 5,
    TimeLimitExceeded = 6,
    MemoryLimitExceeded = 7,
    OutputLimitExceeded = 8,
    CompileError = 9,
    CompileLimitExceeded = 10,
    InternalError = 11,
    SpecialJudgeError = 12,
}

impl Verdict {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Accepted,
            2 => Self::PartialCorrect,
            3 => Self::WrongAnswer,
            4 => Self::RuntimeError,
            5 => Self::RuntimeErrorSignalled,
            6 => Self::TimeLimitExceeded,
            7 => Self::MemoryLimitExceeded,
            8 => Self::OutputLimitExceeded,
            9 => Self::CompileError,
            10 => Self::CompileLimitExceeded,
            11 => Self::InternalError,
            12 => Self::SpecialJudgeError,
            _ => return None,
        })
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Verdict::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid verdict code {value}")))
    }
}

/// The bit-exact status strings reported by the sandbox (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxStatus {
    Accepted,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Output Limit Exceeded")]
    OutputLimitExceeded,
    #[serde(rename = "File Error")]
    FileError,
    #[serde(rename = "Nonzero Exit Status")]
    NonzeroExitStatus,
    Signalled,
    #[serde(rename = "Internal Error")]
    InternalError,
}

/// Signal numbers the per-case verdict map translates to a fixed message
/// (spec.md §4.5): SIGILL, SIGABRT, SIGFPE, SIGSEGV.
pub fn signal_message(exit_status: i32) -> Option<&'static str> {
    match exit_status {
        4 => Some("illegal hardware instruction"),
        6 => Some("abort"),
        8 => Some("floating point exception"),
        11 => Some("segmentation fault"),
        _ => None,
    }
}

/// SIGPIPE: an ioredir user program killed by a broken pipe to the checker.
pub const SIGPIPE: i32 = 13;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_round_trips_as_wire_integer() {
        let json = serde_json::to_string(&Verdict::SpecialJudgeError).unwrap();
        assert_eq!(json, "12");
        let back: Verdict = serde_json::from_str("9").unwrap();
        assert_eq!(back, Verdict::CompileError);
    }

    #[test]
    fn sandbox_status_matches_go_judge_strings() {
        let s: SandboxStatus = serde_json::from_str("\"Time Limit Exceeded\"").unwrap();
        assert_eq!(s, SandboxStatus::TimeLimitExceeded);
    }

    #[test]
    fn signal_message_covers_specified_signals() {
        assert_eq!(signal_message(11), Some("segmentation fault"));
        assert_eq!(signal_message(9), None);
    }
}
