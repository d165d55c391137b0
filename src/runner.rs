//! Test execution and verdict mapping (C5, spec.md §4.5).
//!
//! One [`CaseResult`] is produced per [`TestGroup`], built case-by-case
//! under the shared skip rule: once a case in the group settles on a
//! terminal non-Accepted verdict, the remaining cases in that group are not
//! run at all and the group's result stays at that verdict.

use std::fs;

use log::warn;

use crate::checker::CHECKER_ARTIFACT_NAME;
use crate::compile::run_args_and_proc_limit;
use crate::sandbox::{CmdEntry, CmdResult, CopyInSource, ExecRequest, FileSlot, PipeEnd, PipeMapping, SandboxClient};
use crate::submission::{CaseResult, CheckType, Metadata, TestCase, TestGroup};
use crate::verdict::{self, SandboxStatus, Verdict};

/// Inline stdout capture cap for the plain diff modes and the cms program
/// run (spec.md §4.5: "stdout is captured inline up to 256 MiB").
const STDOUT_CAP_BYTES: u64 = 256 * 1024 * 1024;
/// Capture cap shared by every stderr slot and by the cms/ioredir checker's
/// stdout (spec.md §4.5: "stderr is captured up to 10 KiB").
const FD_OUTPUT_CAP_BYTES: u64 = 10 * 1024;
/// Fixed memory cap for the ioredir checker (spec.md §4.5).
const IOREDIR_CHECKER_MEMORY_LIMIT_BYTES: u64 = 512 << 20;

/// Everything a test group needs to run that doesn't vary case-to-case.
pub struct RunContext<'a> {
    pub sandbox: &'a dyn SandboxClient,
    pub program_artifact_id: &'a str,
    pub comp_type: crate::submission::CompType,
    pub class_name: Option<&'a str>,
    pub check_type: CheckType,
    pub checker_artifact_id: Option<&'a str>,
    pub metadata: &'a Metadata,
}

/// Runs every case in `group` in order, stopping at the first terminal
/// failure (spec.md §4.5's skip rule).
pub fn run_test_group(ctx: &RunContext, group: &TestGroup) -> CaseResult {
    let mut result = CaseResult::new();
    for case in &group.0 {
        if result.should_skip() {
            break;
        }
        run_case(ctx, case, &mut result);
    }
    result
}

fn run_case(ctx: &RunContext, case: &TestCase, result: &mut CaseResult) {
    match ctx.check_type {
        CheckType::Diff | CheckType::DiffStrict => run_diff_case(ctx, case, result),
        CheckType::Cms => run_cms_case(ctx, case, result),
        CheckType::Ioredir => run_ioredir_case(ctx, case, result),
    }
}

/// Maps a non-Accepted program result onto a verdict and message (spec.md
/// §4.5's per-case map). `TimeLimitExceeded`/`MemoryLimitExceeded`/
/// `OutputLimitExceeded`/a generic `InternalError` all leave the verdict
/// text empty, same as the original; `NonzeroExitStatus` carries the
/// program's own captured stderr. `apply_signal_message` is `true` only for
/// the plain diff modes: the cms and ioredir drivers report
/// `RuntimeErrorSignalled` with no verdict text at all.
fn map_runtime_failure(cmd_result: &CmdResult, apply_signal_message: bool) -> (Verdict, String) {
    match cmd_result.status {
        SandboxStatus::TimeLimitExceeded => (Verdict::TimeLimitExceeded, String::new()),
        SandboxStatus::MemoryLimitExceeded => (Verdict::MemoryLimitExceeded, String::new()),
        SandboxStatus::OutputLimitExceeded => (Verdict::OutputLimitExceeded, String::new()),
        SandboxStatus::Signalled => {
            let message = if apply_signal_message {
                verdict::signal_message(cmd_result.exit_status)
                    .map(str::to_string)
                    .unwrap_or_default()
            } else {
                String::new()
            };
            (Verdict::RuntimeErrorSignalled, message)
        }
        SandboxStatus::NonzeroExitStatus => {
            let stderr = cmd_result.files.get("stderr").cloned().unwrap_or_default();
            (Verdict::RuntimeError, stderr)
        }
        SandboxStatus::FileError | SandboxStatus::InternalError => (Verdict::InternalError, String::new()),
        SandboxStatus::Accepted => unreachable!("Accepted is resolved by the caller, not here"),
    }
}

fn settle(result: &mut CaseResult, verdict: Verdict, message: String, time_ns: u64, memory: u64) {
    result.record_metrics(time_ns, memory);
    result.status = Some(verdict);
    result.verdict = message;
}

fn build_run_entry(ctx: &RunContext, case: &TestCase) -> CmdEntry {
    let (args, proc_limit) = run_args_and_proc_limit(ctx.comp_type, ctx.class_name);
    let artifact_name = crate::compile::run_artifact_name(ctx.comp_type, ctx.class_name);

    let mut entry = CmdEntry::new(args, case.timelimit_ns, case.memlimit_bytes);
    entry.proc_limit = proc_limit;
    entry
        .copy_in
        .insert(artifact_name, CopyInSource::cached(ctx.program_artifact_id));
    entry
}

fn read_answer(case: &TestCase) -> Result<Vec<u8>, String> {
    fs::read(&case.ans_path).map_err(|e| format!("failed to read answer file: {e}"))
}

/// `judge_diff`-style "run the program, capture stdout" path, used by both
/// the plain diff modes.
fn run_diff_case(ctx: &RunContext, case: &TestCase, result: &mut CaseResult) {
    let mut entry = build_run_entry(ctx, case);
    entry.files = vec![
        Some(FileSlot::input(case.in_path.as_str())),
        Some(FileSlot::captured("stdout", STDOUT_CAP_BYTES)),
        Some(FileSlot::captured("stderr", FD_OUTPUT_CAP_BYTES)),
    ];

    let request = ExecRequest {
        cmd: vec![entry],
        pipe_mapping: vec![],
    };
    let Some(cmd_result) = exec_first(ctx.sandbox, &request, result) else {
        return;
    };

    if cmd_result.status != SandboxStatus::Accepted {
        let (verdict, message) = map_runtime_failure(&cmd_result, true);
        settle(result, verdict, message, cmd_result.run_time_ns, cmd_result.memory);
        return;
    }

    let answer = match read_answer(case) {
        Ok(bytes) => bytes,
        Err(message) => {
            settle(result, Verdict::InternalError, message, cmd_result.run_time_ns, cmd_result.memory);
            return;
        }
    };
    let output = cmd_result.files.get("stdout").cloned().unwrap_or_default();
    let output = output.into_bytes();

    let matched = match ctx.check_type {
        CheckType::DiffStrict => ctx.sandbox.diff_strict(&output, &answer),
        _ => ctx.sandbox.diff_ignore_trailing_space(&output, &answer),
    };
    match matched {
        Ok(true) => settle(result, Verdict::Accepted, String::new(), cmd_result.run_time_ns, cmd_result.memory),
        Ok(false) => settle(result, Verdict::WrongAnswer, String::new(), cmd_result.run_time_ns, cmd_result.memory),
        Err(e) => settle(
            result,
            Verdict::InternalError,
            format!("diff failed: {e}"),
            cmd_result.run_time_ns,
            cmd_result.memory,
        ),
    }
}

/// `judge_diff_cms`: the program's stdout is cached to a file id, then a
/// checker runs `check test_in test_out user_ans` against it and decides
/// the verdict from its own sandbox status, not its exit code (a checker
/// killed by a limit is `SpecialJudgeError`, not a pass).
fn run_cms_case(ctx: &RunContext, case: &TestCase, result: &mut CaseResult) {
    let mut program = build_run_entry(ctx, case);
    program.files = vec![
        Some(FileSlot::input(case.in_path.as_str())),
        Some(FileSlot::captured("stdout", STDOUT_CAP_BYTES)),
        Some(FileSlot::captured("stderr", FD_OUTPUT_CAP_BYTES)),
    ];
    program.copy_out_cached = vec!["stdout".to_string()];

    let request = ExecRequest {
        cmd: vec![program],
        pipe_mapping: vec![],
    };
    let Some(program_result) = exec_first(ctx.sandbox, &request, result) else {
        return;
    };
    if program_result.status != SandboxStatus::Accepted {
        let (verdict, message) = map_runtime_failure(&program_result, false);
        settle(result, verdict, message, program_result.run_time_ns, program_result.memory);
        return;
    }

    let Some(checker_id) = ctx.checker_artifact_id else {
        settle(
            result,
            Verdict::InternalError,
            "cms check_type requires a compiled checker".to_string(),
            program_result.run_time_ns,
            program_result.memory,
        );
        return;
    };

    let Some(stdout_file_id) = program_result.file_ids.get("stdout").cloned() else {
        settle(
            result,
            Verdict::InternalError,
            "sandbox did not cache the program's stdout".to_string(),
            program_result.run_time_ns,
            program_result.memory,
        );
        return;
    };

    let mut checker = CmdEntry::new(
        vec![
            CHECKER_ARTIFACT_NAME.to_string(),
            "test_in".to_string(),
            "test_out".to_string(),
            "user_ans".to_string(),
        ],
        case.timelimit_ns * 2,
        case.memlimit_bytes,
    );
    checker.proc_limit = 10;
    checker
        .copy_in
        .insert(CHECKER_ARTIFACT_NAME.to_string(), CopyInSource::cached(checker_id));
    checker
        .copy_in
        .insert("test_in".to_string(), CopyInSource::path(case.in_path.as_str()));
    checker
        .copy_in
        .insert("test_ans".to_string(), CopyInSource::path(case.ans_path.as_str()));
    checker
        .copy_in
        .insert("user_ans".to_string(), CopyInSource::cached(stdout_file_id.as_str()));
    checker.files = vec![
        Some(FileSlot::empty()),
        Some(FileSlot::captured("stdout", FD_OUTPUT_CAP_BYTES)),
        Some(FileSlot::captured("stderr", FD_OUTPUT_CAP_BYTES)),
    ];
    checker.copy_out = vec!["stdout".to_string(), "stderr".to_string()];

    let request = ExecRequest {
        cmd: vec![checker],
        pipe_mapping: vec![],
    };
    let checker_result = exec_first(ctx.sandbox, &request, result);
    match ctx.sandbox.file_delete(&stdout_file_id) {
        Ok(true) => {}
        Ok(false) => warn!("failed to release cached stdout {stdout_file_id}"),
        Err(e) => warn!("failed to release cached stdout {stdout_file_id}: {e}"),
    }
    let Some(checker_result) = checker_result else {
        return;
    };

    let time = program_result.run_time_ns.max(checker_result.run_time_ns);
    let memory = program_result.memory.max(checker_result.memory);
    match checker_result.status {
        SandboxStatus::Accepted => settle(result, Verdict::Accepted, String::new(), time, memory),
        SandboxStatus::NonzeroExitStatus => {
            let stderr = checker_result.files.get("stderr").cloned().unwrap_or_default();
            settle(result, Verdict::WrongAnswer, stderr, time, memory);
        }
        _ => settle(
            result,
            Verdict::SpecialJudgeError,
            format!("checker exited with status {:?}", checker_result.status),
            time,
            memory,
        ),
    }
}

/// Places file slot descriptors at the fd indices named in `overrides`, on
/// top of the default three-slot (stdin/stdout/stderr) layout `base`. A `-1`
/// fd ("not wired") is skipped, matching `stdchal.py`'s `dict.pop(-1, None)`
/// discard (spec.md §4.5).
fn place_fd_files(base: [Option<FileSlot>; 3], overrides: &[(i32, Option<FileSlot>)]) -> Vec<Option<FileSlot>> {
    let highest = overrides
        .iter()
        .map(|(fd, _)| *fd)
        .filter(|&fd| fd >= 0)
        .chain(std::iter::once(base.len() as i32 - 1))
        .max()
        .unwrap_or(base.len() as i32 - 1);
    let mut files: Vec<Option<FileSlot>> = vec![None; (highest + 1) as usize];
    for (idx, slot) in base.into_iter().enumerate() {
        files[idx] = slot;
    }
    for (fd, slot) in overrides {
        if *fd >= 0 {
            files[*fd as usize] = slot.clone();
        }
    }
    files
}

/// `judge_diff_ioredir`: program and checker run simultaneously, wired
/// together via `pipeMapping` (spec.md §4.5), the fd table coming from
/// `metadata.redir_test`/`metadata.redir_check`. SIGPIPE on the user
/// program is not a runtime error, it means the checker closed the pipe
/// after deciding the verdict, so it short-circuits to `SpecialJudgeError`
/// before the program's own status is even consulted.
fn run_ioredir_case(ctx: &RunContext, case: &TestCase, result: &mut CaseResult) {
    let (Some(redir_test), Some(redir_check)) = (&ctx.metadata.redir_test, &ctx.metadata.redir_check) else {
        settle(
            result,
            Verdict::InternalError,
            "ioredir check_type requires metadata.redir_test and metadata.redir_check".to_string(),
            0,
            0,
        );
        return;
    };
    let Some(checker_id) = ctx.checker_artifact_id else {
        settle(
            result,
            Verdict::InternalError,
            "ioredir check_type requires a compiled checker".to_string(),
            0,
            0,
        );
        return;
    };

    let mut program = build_run_entry(ctx, case);
    program.files = place_fd_files(
        [None, None, Some(FileSlot::captured("stderr", FD_OUTPUT_CAP_BYTES))],
        &[
            (redir_test.testin, Some(FileSlot::input(case.in_path.as_str()))),
            (redir_test.testout, None),
            (redir_test.pipein, None),
            (redir_test.pipeout, None),
        ],
    );

    let mut checker = CmdEntry::new(
        vec![CHECKER_ARTIFACT_NAME.to_string()],
        case.timelimit_ns,
        IOREDIR_CHECKER_MEMORY_LIMIT_BYTES,
    );
    checker.proc_limit = 10;
    checker
        .copy_in
        .insert(CHECKER_ARTIFACT_NAME.to_string(), CopyInSource::cached(checker_id));
    checker.files = place_fd_files(
        [
            None,
            Some(FileSlot::captured("stdout", FD_OUTPUT_CAP_BYTES)),
            Some(FileSlot::captured("stderr", FD_OUTPUT_CAP_BYTES)),
        ],
        &[
            (redir_check.ansin, Some(FileSlot::input(case.ans_path.as_str()))),
            (redir_check.testin, Some(FileSlot::input(case.in_path.as_str()))),
            (redir_check.pipein, None),
            (redir_check.pipeout, None),
        ],
    );

    let mut pipe_mapping = vec![PipeMapping {
        from: PipeEnd { index: 0, fd: redir_test.pipeout },
        to: PipeEnd { index: 1, fd: redir_check.pipeout },
        proxy: true,
    }];
    if redir_test.pipein != -1 && redir_check.pipein != -1 {
        pipe_mapping.push(PipeMapping {
            from: PipeEnd { index: 1, fd: redir_check.pipein },
            to: PipeEnd { index: 0, fd: redir_test.pipein },
            proxy: false,
        });
    }

    let request = ExecRequest {
        cmd: vec![program, checker],
        pipe_mapping,
    };
    let response = match ctx.sandbox.exec(&request) {
        Ok(response) => response,
        Err(e) => {
            settle(result, Verdict::InternalError, format!("sandbox exec failed: {e}"), 0, 0);
            return;
        }
    };
    let [program_result, checker_result] = &response.results[..] else {
        settle(result, Verdict::InternalError, "ioredir expects exactly two command results".to_string(), 0, 0);
        return;
    };

    let time = program_result.run_time_ns.max(checker_result.run_time_ns);
    let memory = program_result.memory.max(checker_result.memory);

    if program_result.status == SandboxStatus::Signalled && program_result.exit_status == verdict::SIGPIPE {
        settle(
            result,
            Verdict::SpecialJudgeError,
            "checker terminated the session before the program finished".to_string(),
            time,
            memory,
        );
        return;
    }

    if program_result.status == SandboxStatus::Accepted {
        match checker_result.status {
            SandboxStatus::Accepted => settle(result, Verdict::Accepted, String::new(), time, memory),
            SandboxStatus::NonzeroExitStatus => settle(result, Verdict::WrongAnswer, String::new(), time, memory),
            _ => settle(
                result,
                Verdict::SpecialJudgeError,
                format!("checker exited with status {:?}", checker_result.status),
                time,
                memory,
            ),
        }
        return;
    }

    let (v, m) = map_runtime_failure(program_result, false);
    settle(result, v, m, time, memory);
}

fn exec_first(sandbox: &dyn SandboxClient, request: &ExecRequest, result: &mut CaseResult) -> Option<CmdResult> {
    match crate::error::exec_one(sandbox, request) {
        Ok(cmd_result) => Some(cmd_result),
        Err(e) => {
            settle(result, Verdict::InternalError, e.to_string(), 0, 0);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeSandboxClient;
    use crate::sandbox::{CmdResult as FakeCmdResult, ExecResponse};
    use crate::submission::{CompType, TestCase};
    use std::collections::HashMap;
    use std::io::Write;

    fn write_tmp(name: &str, content: &[u8]) -> String {
        let path = std::env::temp_dir().join(format!("judge-engine-runner-test-{name}"));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path.to_string_lossy().to_string()
    }

    fn case(in_path: String, ans_path: String) -> TestCase {
        TestCase {
            in_path,
            ans_path,
            timelimit_ns: 1_000_000_000,
            memlimit_bytes: 256 << 20,
        }
    }

    #[test]
    fn accepted_when_diff_matches() {
        let ans = write_tmp("ans-ac", b"42\n");
        let input = write_tmp("in-ac", b"irrelevant");
        let client = FakeSandboxClient::new(vec![ExecResponse {
            results: vec![FakeCmdResult {
                status: SandboxStatus::Accepted,
                exit_status: 0,
                run_time_ns: 500,
                memory: 1024,
                files: HashMap::from([("stdout".to_string(), "42\n".to_string())]),
                file_ids: HashMap::new(),
            }],
        }]);
        let metadata = Metadata::default();
        let ctx = RunContext {
            sandbox: &client,
            program_artifact_id: "prog-1",
            comp_type: CompType::Gxx,
            class_name: None,
            check_type: CheckType::Diff,
            checker_artifact_id: None,
            metadata: &metadata,
        };
        let group = TestGroup(vec![case(input, ans)]);
        let result = run_test_group(&ctx, &group);
        assert_eq!(result.status, Some(Verdict::Accepted));
        assert_eq!(result.verdict, "");
    }

    #[test]
    fn time_limit_exceeded_skips_remaining_cases() {
        let ans = write_tmp("ans-tle", b"1\n");
        let input = write_tmp("in-tle", b"x");
        let client = FakeSandboxClient::new(vec![ExecResponse {
            results: vec![FakeCmdResult {
                status: SandboxStatus::TimeLimitExceeded,
                exit_status: 0,
                run_time_ns: 1_000_000_000,
                memory: 1024,
                files: HashMap::new(),
                file_ids: HashMap::new(),
            }],
        }]);
        let metadata = Metadata::default();
        let ctx = RunContext {
            sandbox: &client,
            program_artifact_id: "prog-1",
            comp_type: CompType::Gxx,
            class_name: None,
            check_type: CheckType::Diff,
            checker_artifact_id: None,
            metadata: &metadata,
        };
        let group = TestGroup(vec![case(input.clone(), ans.clone()), case(input, ans)]);
        let result = run_test_group(&ctx, &group);
        assert_eq!(result.status, Some(Verdict::TimeLimitExceeded));
    }

    #[test]
    fn signal_eleven_maps_to_segfault_message() {
        let ans = write_tmp("ans-sig", b"1\n");
        let input = write_tmp("in-sig", b"x");
        let client = FakeSandboxClient::new(vec![ExecResponse {
            results: vec![FakeCmdResult {
                status: SandboxStatus::Signalled,
                exit_status: 11,
                run_time_ns: 10,
                memory: 1024,
                files: HashMap::new(),
                file_ids: HashMap::new(),
            }],
        }]);
        let metadata = Metadata::default();
        let ctx = RunContext {
            sandbox: &client,
            program_artifact_id: "prog-1",
            comp_type: CompType::Gxx,
            class_name: None,
            check_type: CheckType::Diff,
            checker_artifact_id: None,
            metadata: &metadata,
        };
        let group = TestGroup(vec![case(input, ans)]);
        let result = run_test_group(&ctx, &group);
        assert_eq!(result.status, Some(Verdict::RuntimeErrorSignalled));
        assert_eq!(result.verdict, "segmentation fault");
    }

    #[test]
    fn cms_checker_wrong_answer_carries_checker_stderr() {
        let ans = write_tmp("ans-cms-wa", b"1\n");
        let input = write_tmp("in-cms-wa", b"x");
        let client = FakeSandboxClient::new(vec![
            ExecResponse {
                results: vec![FakeCmdResult {
                    status: SandboxStatus::Accepted,
                    exit_status: 0,
                    run_time_ns: 10,
                    memory: 1024,
                    files: HashMap::new(),
                    file_ids: HashMap::from([("stdout".to_string(), "out-1".to_string())]),
                }],
            },
            ExecResponse {
                results: vec![FakeCmdResult {
                    status: SandboxStatus::NonzeroExitStatus,
                    exit_status: 1,
                    run_time_ns: 5,
                    memory: 512,
                    files: HashMap::from([("stderr".to_string(), "expected 2, got 3".to_string())]),
                    file_ids: HashMap::new(),
                }],
            },
        ]);
        let metadata = Metadata::default();
        let ctx = RunContext {
            sandbox: &client,
            program_artifact_id: "prog-1",
            comp_type: CompType::Gxx,
            class_name: None,
            check_type: CheckType::Cms,
            checker_artifact_id: Some("check-1"),
            metadata: &metadata,
        };
        let group = TestGroup(vec![case(input, ans)]);
        let result = run_test_group(&ctx, &group);
        assert_eq!(result.status, Some(Verdict::WrongAnswer));
        assert_eq!(result.verdict, "expected 2, got 3");
        assert_eq!(client.deleted_file_ids(), vec!["out-1".to_string()]);
    }

    #[test]
    fn cms_checker_killed_by_limit_is_special_judge_error_not_accepted() {
        let ans = write_tmp("ans-cms-sje", b"1\n");
        let input = write_tmp("in-cms-sje", b"x");
        let client = FakeSandboxClient::new(vec![
            ExecResponse {
                results: vec![FakeCmdResult {
                    status: SandboxStatus::Accepted,
                    exit_status: 0,
                    run_time_ns: 10,
                    memory: 1024,
                    files: HashMap::new(),
                    file_ids: HashMap::from([("stdout".to_string(), "out-1".to_string())]),
                }],
            },
            ExecResponse {
                results: vec![FakeCmdResult {
                    status: SandboxStatus::TimeLimitExceeded,
                    // A checker process killed by a limit still reports
                    // exitStatus 0; deciding on exit code alone would
                    // misreport this as Accepted.
                    exit_status: 0,
                    run_time_ns: 5,
                    memory: 512,
                    files: HashMap::new(),
                    file_ids: HashMap::new(),
                }],
            },
        ]);
        let metadata = Metadata::default();
        let ctx = RunContext {
            sandbox: &client,
            program_artifact_id: "prog-1",
            comp_type: CompType::Gxx,
            class_name: None,
            check_type: CheckType::Cms,
            checker_artifact_id: Some("check-1"),
            metadata: &metadata,
        };
        let group = TestGroup(vec![case(input, ans)]);
        let result = run_test_group(&ctx, &group);
        assert_eq!(result.status, Some(Verdict::SpecialJudgeError));
    }

    #[test]
    fn place_fd_files_skips_unwired_fds_and_sizes_to_the_highest_used() {
        let files = place_fd_files(
            [None, None, Some(FileSlot::captured("stderr", FD_OUTPUT_CAP_BYTES))],
            &[
                (0, Some(FileSlot::input("in.txt"))),
                (-1, None),
                (4, Some(FileSlot::captured("pipeout", FD_OUTPUT_CAP_BYTES))),
            ],
        );
        assert_eq!(files.len(), 5);
        assert!(matches!(files[0], Some(FileSlot::Path { .. })));
        assert!(matches!(files[4], Some(FileSlot::Collector { .. })));
    }
}
