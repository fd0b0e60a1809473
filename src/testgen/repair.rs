// src/testgen/repair.rs
//
// Generate -> save -> run -> classify, repeated under a round budget.
// Strictly sequential: every round's prompt depends on the previous failure.

use std::path::Path;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::llm::{ChatModel, PromptContext};
use crate::logger::{LogLevel, Reporter};
use crate::model::TestLocation;
use crate::testgen::artifact::{parse_artifact, GeneratedTest};
use crate::testgen::patch::TestFilePatcher;
use crate::testgen::runner::{run_test, RunResult, TestExecutor, TestInvocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Start,
    Generated,
    Saved,
    Ran,
    Passed,
    Failed,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed { rounds: usize },
    Exhausted { rounds: usize },
}

impl Outcome {
    pub fn rounds(self) -> usize {
        match self {
            Outcome::Passed { rounds } | Outcome::Exhausted { rounds } => rounds,
        }
    }
}

/// Run-local state. Only the controller touches it.
#[derive(Debug)]
pub struct RepairSession {
    pub context: PromptContext,
    pub round: usize,
    pub state: LoopState,
    pub last: Option<RunResult>,
    pub test: Option<GeneratedTest>,
}

impl RepairSession {
    fn new(initial: String) -> Self {
        Self {
            context: PromptContext::new(initial),
            round: 0,
            state: LoopState::Start,
            last: None,
            test: None,
        }
    }

    fn enter(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, round = self.round, "repair loop");
        self.state = next;
    }
}

#[derive(Debug, Clone)]
pub struct RepairReport {
    pub outcome: Outcome,
    pub context: PromptContext,
    pub test: Option<GeneratedTest>,
    pub last: Option<RunResult>,
}

pub struct RepairLoop<'a> {
    model: &'a dyn ChatModel,
    executor: &'a dyn TestExecutor,
    patcher: &'a TestFilePatcher,
    cancel: &'a CancelToken,
    max_rounds: usize,
    repair_malformed: bool,
}

impl<'a> RepairLoop<'a> {
    pub fn new(
        model: &'a dyn ChatModel,
        executor: &'a dyn TestExecutor,
        patcher: &'a TestFilePatcher,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            model,
            executor,
            patcher,
            cancel,
            max_rounds: 0,
            repair_malformed: false,
        }
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Treat unusable generator output as a repairable failure.
    pub fn repair_malformed(mut self, yes: bool) -> Self {
        self.repair_malformed = yes;
        self
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub fn run(
        &self,
        initial: String,
        target: &TestLocation,
        repo_root: &Path,
        reporter: &mut Reporter<'_>,
    ) -> Result<RepairReport> {
        let mut session = RepairSession::new(initial);

        let outcome = loop {
            /* ---------- GENERATE ---------- */
            self.checkpoint()?;
            let raw = self
                .model
                .complete(&session.context.to_request(), self.cancel)?;
            session.enter(LoopState::Generated);

            let test = match parse_artifact(&raw) {
                Ok(test) => test,
                Err(e) if self.repair_malformed => {
                    session.enter(LoopState::Failed);
                    if session.round >= self.max_rounds {
                        session.enter(LoopState::Exhausted);
                        reporter.log(LogLevel::Warn, format!("Unusable generator output: {e}"));
                        break Outcome::Exhausted {
                            rounds: session.round,
                        };
                    }
                    session.context.add_malformed(&raw, &e);
                    session.round += 1;
                    reporter.log(
                        LogLevel::Warn,
                        format!("Unusable generator output ({e}), asking again"),
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            /* ---------- SAVE ---------- */
            self.checkpoint()?;
            let summary = self.patcher.save(&target.path, &target.package.name, &test)?;
            session.enter(LoopState::Saved);
            reporter.log(
                LogLevel::Info,
                format!(
                    "Saved {} to {} (+{} -{})",
                    test.name,
                    summary.path.display(),
                    summary.added,
                    summary.removed
                ),
            );

            /* ---------- RUN ---------- */
            self.checkpoint()?;
            let inv = TestInvocation::new(repo_root, &target.path, &test.name);
            let result = run_test(self.executor, &inv, self.cancel)?;
            session.enter(LoopState::Ran);

            if result.passed() {
                session.enter(LoopState::Passed);
                session.last = Some(result);
                session.test = Some(test);
                reporter.log(LogLevel::Success, "Test passed");
                break Outcome::Passed {
                    rounds: session.round,
                };
            }

            session.enter(LoopState::Failed);
            if session.round >= self.max_rounds {
                session.enter(LoopState::Exhausted);
                session.last = Some(result);
                session.test = Some(test);
                break Outcome::Exhausted {
                    rounds: session.round,
                };
            }

            session.context.add_repair(&test.source, &result);
            session.round += 1;
            reporter.log(
                LogLevel::Warn,
                format!(
                    "Test failed, attempting repair ({}/{})",
                    session.round, self.max_rounds
                ),
            );
            session.last = Some(result);
            session.test = Some(test);
        };

        if let Outcome::Exhausted { rounds } = outcome {
            reporter.log(
                LogLevel::Warn,
                format!("Round budget exhausted after {rounds} repair round(s); no passing test"),
            );
        }

        Ok(RepairReport {
            outcome,
            context: session.context,
            test: session.test,
            last: session.last,
        })
    }
}
