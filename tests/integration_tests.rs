use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use judge_engine::dispatcher::Dispatcher;
use judge_engine::judge;
use judge_engine::sandbox::fake::FakeSandboxClient;
use judge_engine::sandbox::{CmdResult, ExecResponse, SandboxClient};
use judge_engine::submission::{
    CheckType, CompType, Metadata, Priority, Submission, TestCase, TestGroup,
};
use judge_engine::verdict::{SandboxStatus, Verdict};

fn write_tmp(name: &str, content: &[u8]) -> String {
    let path = std::env::temp_dir().join(format!("judge-engine-integration-{name}"));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content).unwrap();
    path.to_string_lossy().to_string()
}

fn submission_with(check_type: CheckType, test: Vec<TestGroup>) -> Submission {
    Submission {
        chal_id: 1,
        pri: Priority::Normal,
        code_path: write_tmp("source.cpp", b"int main() {}"),
        res_path: std::env::temp_dir().to_string_lossy().to_string(),
        comp_type: CompType::Gxx,
        check_type,
        test,
        metadata: Metadata::default(),
    }
}

fn compiled_ok(run_time_ns: u64, memory: u64, stdout: &str) -> ExecResponse {
    ExecResponse {
        results: vec![CmdResult {
            status: SandboxStatus::Accepted,
            exit_status: 0,
            run_time_ns,
            memory,
            files: HashMap::from([("stdout".to_string(), stdout.to_string())]),
            file_ids: HashMap::new(),
        }],
    }
}

fn compile_success_response() -> ExecResponse {
    ExecResponse {
        results: vec![CmdResult {
            status: SandboxStatus::Accepted,
            exit_status: 0,
            run_time_ns: 200_000_000,
            memory: 4 << 20,
            files: HashMap::new(),
            file_ids: HashMap::from([("a".to_string(), "artifact-1".to_string())]),
        }],
    }
}

#[test]
fn trivial_accepted_submission() {
    let ans = write_tmp("trivial-ans", b"3\n");
    let input = write_tmp("trivial-in", b"1 2\n");

    let sandbox = FakeSandboxClient::new(vec![
        compile_success_response(),
        compiled_ok(100_000_000, 1 << 20, "3\n"),
    ]);
    let submission = submission_with(
        CheckType::Diff,
        vec![TestGroup(vec![TestCase {
            in_path: input,
            ans_path: ans,
            timelimit_ns: 1_000_000_000,
            memlimit_bytes: 256 << 20,
        }])],
    );

    let results = judge::run(&sandbox, &submission);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, Some(Verdict::Accepted));
    assert_eq!(sandbox.deleted_file_ids(), vec!["artifact-1".to_string()]);
}

#[test]
fn diff_strict_rejects_what_diff_tolerates() {
    let ans = write_tmp("strict-ans", b"3\n");
    let input = write_tmp("strict-in", b"1 2\n");

    let sandbox = FakeSandboxClient::new(vec![
        compile_success_response(),
        compiled_ok(100_000_000, 1 << 20, "3 \n"),
    ]);
    let submission = submission_with(
        CheckType::DiffStrict,
        vec![TestGroup(vec![TestCase {
            in_path: input,
            ans_path: ans,
            timelimit_ns: 1_000_000_000,
            memlimit_bytes: 256 << 20,
        }])],
    );

    let results = judge::run(&sandbox, &submission);
    assert_eq!(results[0].status, Some(Verdict::WrongAnswer));
}

#[test]
fn time_limit_exceeded_on_first_case_skips_the_second() {
    let ans = write_tmp("tle-ans", b"1\n");
    let input = write_tmp("tle-in", b"x\n");

    let sandbox = FakeSandboxClient::new(vec![
        compile_success_response(),
        ExecResponse {
            results: vec![CmdResult {
                status: SandboxStatus::TimeLimitExceeded,
                exit_status: 0,
                run_time_ns: 1_000_000_000,
                memory: 1 << 20,
                files: HashMap::new(),
                file_ids: HashMap::new(),
            }],
        },
    ]);
    let submission = submission_with(
        CheckType::Diff,
        vec![TestGroup(vec![
            TestCase {
                in_path: input.clone(),
                ans_path: ans.clone(),
                timelimit_ns: 1_000_000_000,
                memlimit_bytes: 256 << 20,
            },
            TestCase {
                in_path: input,
                ans_path: ans,
                timelimit_ns: 1_000_000_000,
                memlimit_bytes: 256 << 20,
            },
        ])],
    );

    let results = judge::run(&sandbox, &submission);
    assert_eq!(results[0].status, Some(Verdict::TimeLimitExceeded));
}

#[test]
fn segfault_reports_signal_message() {
    let ans = write_tmp("seg-ans", b"1\n");
    let input = write_tmp("seg-in", b"x\n");

    let sandbox = FakeSandboxClient::new(vec![
        compile_success_response(),
        ExecResponse {
            results: vec![CmdResult {
                status: SandboxStatus::Signalled,
                exit_status: 11,
                run_time_ns: 5_000_000,
                memory: 1 << 20,
                files: HashMap::new(),
                file_ids: HashMap::new(),
            }],
        },
    ]);
    let submission = submission_with(
        CheckType::Diff,
        vec![TestGroup(vec![TestCase {
            in_path: input,
            ans_path: ans,
            timelimit_ns: 1_000_000_000,
            memlimit_bytes: 256 << 20,
        }])],
    );

    let results = judge::run(&sandbox, &submission);
    assert_eq!(results[0].status, Some(Verdict::RuntimeErrorSignalled));
    assert_eq!(results[0].verdict, "segmentation fault");
}

#[test]
fn compile_error_reports_compiler_stderr() {
    let sandbox = FakeSandboxClient::new(vec![ExecResponse {
        results: vec![CmdResult {
            status: SandboxStatus::NonzeroExitStatus,
            exit_status: 1,
            run_time_ns: 50_000_000,
            memory: 1 << 20,
            files: HashMap::from([(
                "stderr".to_string(),
                "a.cpp:1:1: error: expected ';'".to_string(),
            )]),
            file_ids: HashMap::new(),
        }],
    }]);
    let ans = write_tmp("ce-ans", b"1\n");
    let input = write_tmp("ce-in", b"x\n");
    let submission = submission_with(
        CheckType::Diff,
        vec![TestGroup(vec![TestCase {
            in_path: input,
            ans_path: ans,
            timelimit_ns: 1_000_000_000,
            memlimit_bytes: 256 << 20,
        }])],
    );

    let results = judge::run(&sandbox, &submission);
    assert_eq!(results[0].status, Some(Verdict::CompileError));
    assert!(results[0].verdict.contains("expected ';'"));
}

#[tokio::test]
async fn dispatcher_deduplicates_and_respects_priority_concurrency() {
    let sandbox: Arc<dyn SandboxClient> = Arc::new(FakeSandboxClient::new(vec![]));
    let dispatcher = Dispatcher::new(sandbox, 1);

    let mut submission = submission_with(CheckType::Diff, vec![]);
    submission.chal_id = 42;
    dispatcher.emit(submission.clone());

    let duplicate = submission.clone();
    dispatcher.emit(duplicate);

    // The duplicate was dropped silently, so only one copy of chal 42 was
    // ever queued: the first cancel removes it, the second finds nothing.
    assert!(dispatcher.cancel(42));
    assert!(!dispatcher.cancel(42));

    let mut second = submission_with(CheckType::Diff, vec![]);
    second.chal_id = 43;
    second.pri = Priority::NormalRejudge;
    dispatcher.emit(second);
}
