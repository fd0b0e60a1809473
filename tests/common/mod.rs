#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use gotestgen::cancel::CancelToken;
use gotestgen::config::Config;
use gotestgen::error::{GenerationError, RunError};
use gotestgen::llm::{ChatModel, ChatRequest, Provider, ProviderConfig};
use gotestgen::testgen::{ImportFixer, ProcessOutput, TestExecutor, TestInvocation};
use tempfile::TempDir;

pub const PASSING_TEST: &str = "```go\nfunc TestAdd(t *testing.T) {\n\tif Add(1, 2) != 3 {\n\t\tt.Fatal(\"want 3\")\n\t}\n}\n```";

pub const BROKEN_TEST: &str = "```go\nfunc TestAdd(t *testing.T) {\n\tif Sub(1, 2) != 3 {\n\t\tt.Fatal(\"want 3\")\n\t}\n}\n```";

/// Throwaway module `example.com/calc` with `pkg/calc.go` declaring `Add`.
pub fn calc_module() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "go.mod", "module example.com/calc\n\ngo 1.21\n");
    write(
        dir.path(),
        "pkg/calc.go",
        "package calc\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n",
    );
    dir
}

pub fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn config(repo: &Path, func_path: &str, func: &str, rounds: usize) -> Config {
    Config {
        repo: repo.to_path_buf(),
        func_path: PathBuf::from(func_path),
        func_name: func.to_string(),
        rounds,
        test_count: 0,
        use_func_test_file: false,
        seed: Some(7),
        depth: 1,
        go: "go".into(),
        imports: ImportFixer::disabled(),
        repair_malformed: false,
        verbose: false,
        provider: ProviderConfig {
            provider: Provider::OpenAI,
            model: "test-model".into(),
            api_key: "unused".into(),
            base_url: None,
        },
    }
}

/// Replays canned answers and records every request it was sent.
pub struct ScriptedModel {
    answers: RefCell<VecDeque<String>>,
    fallback: String,
    pub requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(answers: &[&str], fallback: &str) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|a| a.to_string()).collect()),
            fallback: fallback.to_string(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn always(answer: &str) -> Self {
        Self::new(&[], answer)
    }
}

impl ChatModel for ScriptedModel {
    fn complete(&self, request: &ChatRequest, cancel: &CancelToken) -> Result<String, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        self.requests.borrow_mut().push(request.clone());
        Ok(self
            .answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Replays canned `go test` outputs and records every invocation.
pub struct ScriptedExecutor {
    outputs: RefCell<VecDeque<ProcessOutput>>,
    fallback: ProcessOutput,
    pub invocations: RefCell<Vec<TestInvocation>>,
}

impl ScriptedExecutor {
    pub fn new(outputs: Vec<ProcessOutput>, fallback: ProcessOutput) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            fallback,
            invocations: RefCell::new(Vec::new()),
        }
    }

    pub fn always(output: ProcessOutput) -> Self {
        Self::new(Vec::new(), output)
    }
}

impl TestExecutor for ScriptedExecutor {
    fn execute(&self, inv: &TestInvocation, _: &CancelToken) -> Result<ProcessOutput, RunError> {
        self.invocations.borrow_mut().push(inv.clone());
        Ok(self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

pub fn passed() -> ProcessOutput {
    ProcessOutput {
        success: true,
        code: Some(0),
        stdout: "=== RUN   TestAdd\n--- PASS: TestAdd (0.00s)\nPASS\nok  \texample.com/calc/pkg\t0.002s\n"
            .into(),
        stderr: String::new(),
    }
}

pub fn compile_failure() -> ProcessOutput {
    ProcessOutput {
        success: false,
        code: Some(1),
        stdout: "FAIL\texample.com/calc/pkg [build failed]\n".into(),
        stderr: "# example.com/calc/pkg [example.com/calc/pkg.test]\npkg/calc_test.go:6:5: undefined: Sub\n"
            .into(),
    }
}

pub fn runtime_failure() -> ProcessOutput {
    ProcessOutput {
        success: false,
        code: Some(1),
        stdout: "=== RUN   TestAdd\n    calc_test.go:7: want 3\n--- FAIL: TestAdd (0.00s)\nFAIL\n"
            .into(),
        stderr: String::new(),
    }
}

pub fn count_tests(source: &str) -> usize {
    source
        .lines()
        .filter(|l| l.starts_with("func Test"))
        .count()
}
