use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gotestgen::cancel::CancelToken;
use gotestgen::config::{Config, RunArgs};
use gotestgen::error::Error;
use gotestgen::llm::LlmClient;
use gotestgen::testgen::{GoTestRunner, Outcome};

#[derive(Parser)]
#[command(
    name = "gotestgen",
    version,
    about = "Generate a passing Go unit test for one function, repairing it against `go test` failures."
)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<Outcome, Error> {
    let config = Config::from_args(cli.run)?;

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.cancel()) {
        tracing::warn!("interrupt handler not installed: {e}");
    }

    let client = LlmClient::new(config.provider.clone())?;
    let runner = GoTestRunner::new(config.go.clone());
    let mut stdout = io::stdout();

    let report = gotestgen::run(&config, &client, &runner, &cancel, &mut stdout)?;
    Ok(report.outcome)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.run.verbose);

    match run(cli) {
        Ok(outcome) => {
            tracing::debug!(?outcome, "run finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
