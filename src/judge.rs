//! The top-level per-submission pipeline (C6, spec.md §4.6): compile,
//! optionally build a checker, run every test group, release sandbox
//! artifacts, and produce one [`CaseResult`] per group.

use chrono::Local;
use log::{info, warn};

use crate::checker::compile_checker;
use crate::compile::{self, CompileStatus};
use crate::runner::{RunContext, run_test_group};
use crate::sandbox::SandboxClient;
use crate::submission::{CaseResult, CheckType, Submission};
use crate::verdict::Verdict;

/// Runs a submission to completion. Never panics on submission-controlled
/// input; sandbox/IO failures are folded into `InternalError` results so
/// the caller always gets exactly `submission.test.len()` results back.
pub fn run(sandbox: &dyn SandboxClient, submission: &Submission) -> Vec<CaseResult> {
    let started_at = Local::now();
    let outcome = compile::compile(sandbox, submission);

    let program_artifact_id = match outcome.status {
        CompileStatus::Accepted => outcome.artifact_id.clone(),
        CompileStatus::CompileError => {
            return all_groups_with(submission, Verdict::CompileError, outcome.stderr.clone());
        }
        CompileStatus::CompileLimitExceeded => {
            return all_groups_with(
                submission,
                Verdict::CompileLimitExceeded,
                "Compile Limit Exceeded".to_string(),
            );
        }
        CompileStatus::InternalError => {
            return all_groups_with(submission, Verdict::InternalError, outcome.stderr.clone());
        }
    };

    let Some(program_artifact_id) = program_artifact_id else {
        warn!("compile reported Accepted with no artifact id for chal {}", submission.chal_id);
        return all_groups_with(
            submission,
            Verdict::InternalError,
            "compiler produced no artifact".to_string(),
        );
    };

    let needs_checker = matches!(submission.check_type, CheckType::Cms | CheckType::Ioredir);
    let checker_artifact_id = if needs_checker {
        let checker = compile_checker(sandbox, &submission.res_path);
        if !checker.compiled {
            info!(
                "checker build failed for chal {}: {}",
                submission.chal_id, checker.stderr
            );
            release(sandbox, &program_artifact_id, None);
            return all_groups_with(
                submission,
                Verdict::InternalError,
                "special judge failed to build".to_string(),
            );
        }
        checker.artifact_id
    } else {
        None
    };

    let ctx = RunContext {
        sandbox,
        program_artifact_id: &program_artifact_id,
        comp_type: submission.comp_type,
        class_name: outcome.class_name.as_deref(),
        check_type: submission.check_type,
        checker_artifact_id: checker_artifact_id.as_deref(),
        metadata: &submission.metadata,
    };

    let results: Vec<CaseResult> = std::thread::scope(|scope| {
        let handles: Vec<_> = submission
            .test
            .iter()
            .map(|group| scope.spawn(|| run_test_group(&ctx, group)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| {
                let mut r = CaseResult::new();
                r.status = Some(Verdict::InternalError);
                r.verdict = "judge worker thread panicked".to_string();
                r
            }))
            .collect()
    });

    release(sandbox, &program_artifact_id, checker_artifact_id.as_deref());

    let results = finalize(results);

    info!(
        "chal {} finished in {}ms (started {}): {}",
        submission.chal_id,
        (Local::now() - started_at).num_milliseconds(),
        started_at.format("%H:%M:%S%.3f"),
        results.first().map(|r| r.verdict.as_str()).unwrap_or_default()
    );

    results
}

fn release(sandbox: &dyn SandboxClient, program_artifact_id: &str, checker_artifact_id: Option<&str>) {
    release_one(sandbox, "program", program_artifact_id);
    if let Some(id) = checker_artifact_id {
        release_one(sandbox, "checker", id);
    }
}

fn release_one(sandbox: &dyn SandboxClient, kind: &str, artifact_id: &str) {
    match sandbox.file_delete(artifact_id) {
        Ok(true) => {}
        Ok(false) => warn!("failed to release {kind} artifact {artifact_id}"),
        Err(e) => warn!("failed to release {kind} artifact {artifact_id}: {e}"),
    }
}

/// Every result a `None` status leaves means a worker exited without
/// settling it; that's an engine bug, not a submission outcome, so it is
/// mapped to `InternalError` rather than surfaced as `Accepted` (spec.md
/// §4.6). Then, per spec.md §4.6 step 6, every non-empty verdict is joined
/// into a single summary string and every result's verdict is overwritten
/// with it.
fn finalize(mut results: Vec<CaseResult>) -> Vec<CaseResult> {
    for r in &mut results {
        if r.status.is_none() {
            r.status = Some(Verdict::InternalError);
            r.verdict = "no verdict produced".to_string();
        }
    }

    let summary = results
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.verdict.is_empty())
        .map(|(i, r)| format!("Task {}: {}", i + 1, r.verdict))
        .collect::<Vec<_>>()
        .join("\n");
    for r in &mut results {
        r.verdict = summary.clone();
    }
    results
}

fn all_groups_with(submission: &Submission, verdict: Verdict, message: String) -> Vec<CaseResult> {
    submission
        .test
        .iter()
        .map(|_| {
            let mut r = CaseResult::new();
            r.status = Some(verdict);
            r.verdict = message.clone();
            r
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeSandboxClient;
    use crate::submission::{CompType, Metadata, TestCase, TestGroup};

    fn trivial_submission() -> Submission {
        Submission {
            chal_id: 1,
            pri: crate::submission::Priority::Normal,
            code_path: "/nonexistent/a.cpp".to_string(),
            res_path: "/nonexistent/res".to_string(),
            comp_type: CompType::Gxx,
            check_type: CheckType::Diff,
            test: vec![TestGroup(vec![TestCase {
                in_path: "/nonexistent/1.in".to_string(),
                ans_path: "/nonexistent/1.out".to_string(),
                timelimit_ns: 1_000_000_000,
                memlimit_bytes: 1 << 28,
            }])],
            metadata: Metadata::default(),
        }
    }

    #[test]
    fn compile_failure_short_circuits_to_one_result_per_group() {
        let client = FakeSandboxClient::new(vec![crate::sandbox::ExecResponse {
            results: vec![crate::sandbox::CmdResult {
                status: crate::verdict::SandboxStatus::NonzeroExitStatus,
                exit_status: 1,
                run_time_ns: 10,
                memory: 0,
                files: std::collections::HashMap::from([(
                    "stderr".to_string(),
                    "syntax error".to_string(),
                )]),
                file_ids: std::collections::HashMap::new(),
            }],
        }]);
        let submission = trivial_submission();
        let results = run(&client, &submission);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, Some(Verdict::CompileError));
    }

    #[test]
    fn every_result_gets_a_settled_status() {
        let results = all_groups_with(&trivial_submission(), Verdict::InternalError, "x".to_string());
        let finalized = finalize(results);
        assert!(finalized.iter().all(|r| r.status.is_some()));
    }

    #[test]
    fn finalize_overwrites_every_verdict_with_the_joined_summary() {
        let mut a = CaseResult::new();
        a.status = Some(Verdict::Accepted);
        let mut b = CaseResult::new();
        b.status = Some(Verdict::WrongAnswer);
        b.verdict = "expected 2, got 3".to_string();

        let finalized = finalize(vec![a, b]);
        assert_eq!(finalized[0].verdict, "Task 2: expected 2, got 3");
        assert_eq!(finalized[1].verdict, "Task 2: expected 2, got 3");
    }
}
