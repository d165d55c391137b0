//! Compiler drivers (C3, spec.md §4.3): one per `comp_type`, each building
//! the `exec` request spec.md describes and mapping the sandbox's verdict
//! onto a compile outcome uniformly.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::sandbox::{CmdEntry, CopyInSource, FileSlot, SandboxClient};
use crate::submission::{CompType, Submission};
use crate::verdict::SandboxStatus;

const COMPILE_CPU_LIMIT_NS: u64 = 10_000_000_000;
const MEMORY_512_MIB: u64 = 512 << 20;
const MEMORY_1_GIB: u64 = 1 << 30;
const MEMORY_2_GIB: u64 = 2 << 30;
const STDERR_CAP_BYTES: u64 = 100 * 1024;
const ARTIFACT_MAX_BYTES: u64 = 64_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    Accepted,
    CompileError,
    CompileLimitExceeded,
    InternalError,
}

#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub status: CompileStatus,
    pub artifact_id: Option<String>,
    pub stderr: String,
    pub time_ns: u64,
    pub memory_bytes: u64,
    /// Only populated by the Java driver (spec.md §4.3): the detected
    /// `public static void main` class, threaded into run args and
    /// per-test `copyIn` naming.
    pub class_name: Option<String>,
}

impl CompileOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: CompileStatus::CompileError,
            artifact_id: None,
            stderr: message.into(),
            time_ns: 0,
            memory_bytes: 0,
            class_name: None,
        }
    }
}

/// The "Compile result mapping (applied uniformly)" table from spec.md
/// §4.3, shared by every driver and the checker compiler.
fn map_compile_result(
    status: SandboxStatus,
    run_time_ns: u64,
    memory: u64,
    stderr: String,
    artifact_id: Option<String>,
) -> CompileOutcome {
    match status {
        SandboxStatus::Accepted => CompileOutcome {
            status: CompileStatus::Accepted,
            artifact_id,
            stderr,
            time_ns: run_time_ns,
            memory_bytes: memory,
            class_name: None,
        },
        SandboxStatus::NonzeroExitStatus => CompileOutcome {
            status: CompileStatus::CompileError,
            artifact_id: None,
            stderr,
            time_ns: run_time_ns,
            memory_bytes: memory,
            class_name: None,
        },
        SandboxStatus::TimeLimitExceeded | SandboxStatus::MemoryLimitExceeded => CompileOutcome {
            status: CompileStatus::CompileLimitExceeded,
            artifact_id: None,
            stderr,
            time_ns: run_time_ns,
            memory_bytes: memory,
            class_name: None,
        },
        _ => CompileOutcome {
            status: CompileStatus::InternalError,
            artifact_id: None,
            stderr,
            time_ns: run_time_ns,
            memory_bytes: memory,
            class_name: None,
        },
    }
}

fn run_compile(
    sandbox: &dyn SandboxClient,
    mut entry: CmdEntry,
    artifact_name: &str,
) -> CompileOutcome {
    entry.files = vec![
        Some(FileSlot::empty()),
        Some(FileSlot::empty()),
        Some(FileSlot::captured("stderr", STDERR_CAP_BYTES)),
    ];
    entry.copy_out = vec!["stderr".to_string()];
    entry.copy_out_cached = vec![artifact_name.to_string()];
    entry.copy_out_max = Some(ARTIFACT_MAX_BYTES);

    let request = crate::sandbox::ExecRequest {
        cmd: vec![entry],
        pipe_mapping: vec![],
    };

    let result = match crate::error::exec_one(sandbox, &request) {
        Ok(result) => result,
        Err(e) => return CompileOutcome::rejected(e.to_string()),
    };

    let stderr = result.files.get("stderr").cloned().unwrap_or_default();
    let artifact_id = result.file_ids.get(artifact_name).cloned();
    map_compile_result(result.status, result.run_time_ns, result.memory, stderr, artifact_id)
}

/// gcc/clang C compile (`comp_type ∈ {gcc, clang}`).
fn build_c(compiler: &str, code_path: &str) -> (CmdEntry, &'static str) {
    let mut entry = CmdEntry::new(
        vec![
            compiler.to_string(),
            "-O2".to_string(),
            "-std=gnu11".to_string(),
            "a.c".to_string(),
            "-o".to_string(),
            "a".to_string(),
            "-lm".to_string(),
        ],
        COMPILE_CPU_LIMIT_NS,
        MEMORY_512_MIB,
    );
    entry.proc_limit = 10;
    entry
        .copy_in
        .insert("a.c".to_string(), CopyInSource::path(code_path));
    (entry, "a")
}

/// g++/clang++ C++ compile (`comp_type ∈ {g++, clang++}`).
fn build_cxx(compiler: &str, code_path: &str) -> (CmdEntry, &'static str) {
    let mut entry = CmdEntry::new(
        vec![
            compiler.to_string(),
            "-O2".to_string(),
            "-std=gnu++17".to_string(),
            "a.cpp".to_string(),
            "-o".to_string(),
            "a".to_string(),
        ],
        COMPILE_CPU_LIMIT_NS,
        MEMORY_512_MIB,
    );
    entry.proc_limit = 10;
    entry
        .copy_in
        .insert("a.cpp".to_string(), CopyInSource::path(code_path));
    (entry, "a")
}

fn build_rustc(code_path: &str) -> (CmdEntry, &'static str) {
    let mut entry = CmdEntry::new(
        vec![
            "/usr/bin/rustc".to_string(),
            "./a.rs".to_string(),
            "-O".to_string(),
            "-o".to_string(),
            "a".to_string(),
        ],
        COMPILE_CPU_LIMIT_NS,
        MEMORY_1_GIB,
    );
    entry.proc_limit = 10;
    entry
        .copy_in
        .insert("a.rs".to_string(), CopyInSource::path(code_path));
    (entry, "a")
}

fn build_python3(code_path: &str) -> (CmdEntry, &'static str) {
    let mut entry = CmdEntry::new(
        vec![
            "/usr/bin/python3".to_string(),
            "-c".to_string(),
            "import py_compile; py_compile.compile('a.py', 'a.pyc', doraise=True, optimize=2)"
                .to_string(),
        ],
        COMPILE_CPU_LIMIT_NS,
        MEMORY_512_MIB,
    );
    entry.proc_limit = 10;
    entry
        .copy_in
        .insert("a.py".to_string(), CopyInSource::path(code_path));
    (entry, "a.pyc")
}

/// `makefile` unconditionally names the user's file `main.cpp` (spec.md §9
/// Design Notes: "a contract with the problem's Makefile, not an
/// inference").
fn build_makefile(code_path: &str, res_path: &str) -> anyhow::Result<(CmdEntry, &'static str)> {
    let mut entry = CmdEntry::new(
        vec!["/usr/bin/make".to_string()],
        COMPILE_CPU_LIMIT_NS,
        MEMORY_2_GIB,
    );
    entry.proc_limit = 10;
    entry.env.push("OUT=./a".to_string());
    entry
        .copy_in
        .insert("main.cpp".to_string(), CopyInSource::path(code_path));

    let make_dir = Path::new(res_path).join("make");
    for file in regular_files(&make_dir)? {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("non-UTF8 file name under {}", make_dir.display()))?
            .to_string();
        entry
            .copy_in
            .insert(name, CopyInSource::path(file.to_string_lossy()));
    }
    Ok((entry, "a"))
}

/// Every regular file directly under `dir`, used by both the `makefile`
/// driver and the checker compiler (spec.md §4.3, §4.4).
pub fn regular_files(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

const MAIN_METHOD_PATTERN: &str = r"(?m)^\s*public\s+static\s+void\s+main";
const CLASS_NAME_PATTERN: &str = r"^(\w*)";
const VALID_CLASS_NAME: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Detects the unique class containing `public static void main` by
/// splitting the source on the literal `"class "` (spec.md §4.3, §9).
///
/// This is fragile by specification, not by oversight: comments or string
/// literals containing `"class "` can produce false matches. The original
/// judge behaves this way and this port intentionally does not "fix" it.
pub fn detect_main_class(source: &str) -> Option<String> {
    let main_pattern = Regex::new(MAIN_METHOD_PATTERN).unwrap();
    let class_name_pattern = Regex::new(CLASS_NAME_PATTERN).unwrap();
    let valid_name = Regex::new(VALID_CLASS_NAME).unwrap();

    let mut found = String::new();
    let mut count = 0;
    for fragment in source.split("class ") {
        if !main_pattern.is_match(fragment) {
            continue;
        }
        let name = class_name_pattern
            .captures(fragment)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        // `found` is overwritten on every fragment with a main method,
        // valid or not; only `count` gates on validity. A later invalid
        // name can clobber an earlier valid one even while count stays 1.
        found = name.clone();
        if valid_name.is_match(&name) {
            count += 1;
        }
    }

    if count == 1 { Some(found) } else { None }
}

fn build_java(code_path: &str, class_name: &str) -> (CmdEntry, String) {
    let mut entry = CmdEntry::new(
        vec!["/usr/bin/javac".to_string(), format!("{class_name}.java")],
        COMPILE_CPU_LIMIT_NS,
        MEMORY_2_GIB,
    );
    entry.proc_limit = 25;
    entry.env.push("JAVA_HOME=/usr/lib/jvm/default-jvm".to_string());
    entry.copy_in.insert(
        format!("{class_name}.java"),
        CopyInSource::path(code_path),
    );
    (entry, format!("{class_name}.class"))
}

/// Runs the compiler selected by `submission.comp_type` and returns its
/// outcome. For Java, the class-detection pre-step runs before any sandbox
/// call; on failure the submission is rejected without touching the
/// sandbox at all (spec.md §4.3).
pub fn compile(sandbox: &dyn SandboxClient, submission: &Submission) -> CompileOutcome {
    match submission.comp_type {
        CompType::Gcc => {
            let (entry, name) = build_c("/usr/bin/gcc", &submission.code_path);
            run_compile(sandbox, entry, name)
        }
        CompType::Clang => {
            let (entry, name) = build_c("/usr/bin/clang", &submission.code_path);
            run_compile(sandbox, entry, name)
        }
        CompType::Gxx => {
            let (entry, name) = build_cxx("/usr/bin/g++", &submission.code_path);
            run_compile(sandbox, entry, name)
        }
        CompType::Clangxx => {
            let (entry, name) = build_cxx("/usr/bin/clang++", &submission.code_path);
            run_compile(sandbox, entry, name)
        }
        CompType::Rustc => {
            let (entry, name) = build_rustc(&submission.code_path);
            run_compile(sandbox, entry, name)
        }
        CompType::Python3 => {
            let (entry, name) = build_python3(&submission.code_path);
            run_compile(sandbox, entry, name)
        }
        CompType::Makefile => match build_makefile(&submission.code_path, &submission.res_path) {
            Ok((entry, name)) => run_compile(sandbox, entry, name),
            Err(e) => CompileOutcome::rejected(format!("failed to read makefile resources: {e}")),
        },
        CompType::Java => {
            let source = match fs::read_to_string(&submission.code_path) {
                Ok(s) => s,
                Err(e) => return CompileOutcome::rejected(format!("failed to read source: {e}")),
            };
            let Some(class_name) = detect_main_class(&source) else {
                return CompileOutcome::rejected(
                    "Your main class not found or invalid class name or more than one main function.",
                );
            };
            let (entry, artifact_name) = build_java(&submission.code_path, &class_name);
            let mut outcome = run_compile(sandbox, entry, &artifact_name);
            outcome.class_name = Some(class_name);
            outcome
        }
    }
}

/// `args` + per-case `procLimit` for the run phase (spec.md §4.5): Java
/// needs 25 processes for the JVM, every other language needs 1.
pub fn run_args_and_proc_limit(
    comp_type: CompType,
    class_name: Option<&str>,
) -> (Vec<String>, u32) {
    match comp_type {
        CompType::Python3 => (vec!["/usr/bin/python3".to_string(), "a".to_string()], 1),
        CompType::Java => (
            vec![
                "/usr/bin/java".to_string(),
                class_name.expect("class_name set for java").to_string(),
            ],
            25,
        ),
        _ => (vec!["a".to_string()], 1),
    }
}

/// Name the compiled artifact is `copyIn`'d under for the run phase.
pub fn run_artifact_name(comp_type: CompType, class_name: Option<&str>) -> String {
    match comp_type {
        CompType::Python3 => "a".to_string(),
        CompType::Java => format!("{}.class", class_name.expect("class_name set for java")),
        _ => "a".to_string(),
    }
}
