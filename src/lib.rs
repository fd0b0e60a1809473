//! Generates one passing Go unit test for a single function: build the
//! usage closure, prompt a generation service, then save, run and repair the
//! test until it passes or the round budget runs out.

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod logger;
pub mod model;
pub mod source;
pub mod testgen;

use std::io::Write;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::context::{ExampleTestSelector, FocalFunctionResolver, UsageClosureExtractor};
use crate::error::Result;
use crate::llm::{ChatModel, PromptAssembler};
use crate::logger::{LogLevel, Reporter};
use crate::source::SourceModel;
use crate::testgen::{RepairLoop, RepairReport, TestExecutor, TestFilePatcher};

/// One full run for the function named by `config`. The generation service
/// and the test process are injected so callers can substitute them.
pub fn run(
    config: &Config,
    model: &dyn ChatModel,
    executor: &dyn TestExecutor,
    cancel: &CancelToken,
    out: &mut dyn Write,
) -> Result<RepairReport> {
    let mut reporter = Reporter::new(out);

    let source = SourceModel::load(&config.repo)?;
    tracing::debug!(
        module = source.module_path(),
        packages = source.packages().count(),
        "source model loaded"
    );

    let focal = FocalFunctionResolver::new(&source).resolve(&config.func_path, &config.func_name)?;
    let uses = UsageClosureExtractor::new(&source)
        .with_depth(config.depth)
        .extract(&focal);
    let focal = focal.into_focal(uses);
    reporter.log(
        LogLevel::Info,
        format!(
            "Generating a test for {} ({} referenced definition(s))",
            focal.id,
            focal.uses.len()
        ),
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let examples = ExampleTestSelector::new(&source, config.test_count)
        .include_focal_test(config.use_func_test_file)
        .select(&focal, &mut rng)?;
    for example in &examples {
        tracing::debug!(path = %example.path.display(), "example test");
    }

    let initial = PromptAssembler::build(&examples, &focal);
    let patcher = TestFilePatcher::new(config.imports.clone());

    RepairLoop::new(model, executor, &patcher, cancel)
        .max_rounds(config.rounds)
        .repair_malformed(config.repair_malformed)
        .run(initial, &focal.test_location(), source.root(), &mut reporter)
}
