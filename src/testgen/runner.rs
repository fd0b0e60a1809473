// Runs one generated test through `go test` and classifies the outcome.
// Process plumbing lives behind `TestExecutor`; classification is pure.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;

use crate::cancel::CancelToken;
use crate::error::RunError;

const WAIT_POLL: Duration = Duration::from_millis(50);
const MISSING_ERROR: &str = "Error message not found";
const FAIL_MARKER: &str = "--- FAIL:";
const NO_TESTS: &str = "no tests to run";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Passed,
    CompileFailed(String),
    RuntimeFailed(String),
}

impl RunResult {
    pub fn passed(&self) -> bool {
        matches!(self, RunResult::Passed)
    }

    pub fn compile_error(&self) -> Option<&str> {
        match self {
            RunResult::CompileFailed(d) => Some(d),
            _ => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            RunResult::RuntimeFailed(m) => Some(m),
            _ => None,
        }
    }
}

/// One `go test` run: package directory relative to the module root and an
/// anchored filter for the test name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInvocation {
    pub repo_root: PathBuf,
    pub package_dir: PathBuf,
    pub test_name: String,
}

impl TestInvocation {
    pub fn new(repo_root: &Path, test_file: &Path, test_name: &str) -> Self {
        let dir = test_file.parent().unwrap_or(Path::new(""));
        let package_dir = dir.strip_prefix(repo_root).unwrap_or(dir).to_path_buf();
        Self {
            repo_root: repo_root.to_path_buf(),
            package_dir,
            test_name: test_name.to_string(),
        }
    }

    /// `./pkg/calc`, or `.` for the module root.
    pub fn package_arg(&self) -> String {
        let parts: Vec<String> = self
            .package_dir
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            ".".to_string()
        } else {
            format!("./{}", parts.join("/"))
        }
    }

    pub fn run_filter(&self) -> String {
        format!("^{}$", self.test_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait TestExecutor {
    fn execute(&self, inv: &TestInvocation, cancel: &CancelToken)
        -> Result<ProcessOutput, RunError>;
}

/* ============================================================
   go test
   ============================================================ */

pub struct GoTestRunner {
    go: String,
}

impl GoTestRunner {
    pub fn new(go: impl Into<String>) -> Self {
        Self { go: go.into() }
    }
}

impl TestExecutor for GoTestRunner {
    fn execute(
        &self,
        inv: &TestInvocation,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, RunError> {
        tracing::debug!(
            go = %self.go,
            package = %inv.package_arg(),
            filter = %inv.run_filter(),
            "running go test"
        );

        let mut child = Command::new(&self.go)
            .arg("test")
            .arg(inv.package_arg())
            .arg("-v")
            .arg("-run")
            .arg(inv.run_filter())
            .current_dir(&inv.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: self.go.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(WAIT_POLL),
                Err(source) => {
                    return Err(RunError::Wait {
                        program: self.go.clone(),
                        source,
                    })
                }
            }
        };

        Ok(ProcessOutput {
            success: status.success(),
            code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            // Keep whatever arrived before the error.
            if let Err(e) = p.read_to_end(&mut buf) {
                tracing::warn!(read = buf.len(), "reading test output: {e}");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/* ============================================================
   Classification
   ============================================================ */

pub fn run_test(
    executor: &dyn TestExecutor,
    inv: &TestInvocation,
    cancel: &CancelToken,
) -> Result<RunResult, RunError> {
    let out = executor.execute(inv, cancel)?;
    classify(inv, &out)
}

/// Passed, compile failure (diagnostics on stderr), runtime failure
/// (`--- FAIL:` on stdout), or a fatal error when none of these apply.
pub fn classify(inv: &TestInvocation, out: &ProcessOutput) -> Result<RunResult, RunError> {
    if out.success {
        if out.stdout.contains(NO_TESTS) {
            return Err(RunError::NoTestsRan(inv.run_filter()));
        }
        return Ok(RunResult::Passed);
    }

    let diagnostics = extract_compile_errors(&out.stderr);
    if !diagnostics.is_empty() {
        return Ok(RunResult::CompileFailed(diagnostics));
    }

    if let Some(message) = extract_test_failure(&out.stdout) {
        return Ok(RunResult::RuntimeFailed(message));
    }

    Err(RunError::Unclassified {
        code: out
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".into()),
        output: format!("{}\n{}", out.stderr.trim(), out.stdout.trim())
            .trim()
            .to_string(),
    })
}

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Message part of every `file.go:line:col: message` line, one per line.
/// `#` package headers are skipped.
pub fn extract_compile_errors(stderr: &str) -> String {
    static DIAG: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = regex(&DIAG, r"^[^#].*\.go:\d+:\d+:\s+(.*)$") else {
        return String::new();
    };
    let mut out = String::new();
    for line in stderr.lines() {
        if let Some(m) = re.captures(line).and_then(|c| c.get(1)) {
            out.push_str(m.as_str());
            out.push('\n');
        }
    }
    out
}

/// `None` unless stdout carries a failure marker. Otherwise the first
/// testify `Error:` text, else the first `panic:` line, else the first
/// `t.Error`/`t.Fatal` log line, else a placeholder.
pub fn extract_test_failure(stdout: &str) -> Option<String> {
    if !stdout.contains(FAIL_MARKER) {
        return None;
    }

    static ERROR: OnceLock<Option<Regex>> = OnceLock::new();
    static LOG: OnceLock<Option<Regex>> = OnceLock::new();

    let testify = regex(&ERROR, r"Error:\s*(.*)")
        .and_then(|re| re.captures(stdout))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    let panicked = || {
        stdout
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with("panic:"))
            .map(str::to_string)
    };
    let logged = || {
        let re = regex(&LOG, r"^\s+\S+_test\.go:\d+:\s+(.*)$")?;
        stdout
            .lines()
            .find_map(|l| re.captures(l)?.get(1))
            .map(|m| m.as_str().trim().to_string())
    };

    Some(
        testify
            .or_else(panicked)
            .or_else(logged)
            .unwrap_or_else(|| MISSING_ERROR.to_string()),
    )
}
