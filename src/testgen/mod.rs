pub mod artifact;
pub mod patch;
pub mod repair;
pub mod runner;

pub use artifact::{parse_artifact, GeneratedTest};
pub use patch::{ImportFixer, PatchSummary, TestFilePatcher};
pub use repair::{LoopState, Outcome, RepairLoop, RepairReport};
pub use runner::{GoTestRunner, ProcessOutput, RunResult, TestExecutor, TestInvocation};
