// src/error.rs
//
// Error taxonomy. One enum per stage, wrapped by `Error` so the message
// always names the stage that failed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required flag: --{0}")]
    Missing(&'static str),

    #[error("{provider} API key not set (export {env} or add api_key to {config})")]
    MissingApiKey {
        provider: &'static str,
        env: &'static str,
        config: String,
    },

    #[error("unknown provider `{0}` (expected `openai` or `anthropic`)")]
    UnknownProvider(String),

    #[error("reading {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("no go.mod found in {0}")]
    NoModule(PathBuf),

    #[error("go.mod in {0} has no module directive")]
    NoModulePath(PathBuf),

    #[error("Go grammar unavailable: {0}")]
    Grammar(String),

    #[error("{} source error(s):\n{}", .0.len(), .0.join("\n"))]
    Syntax(Vec<String>),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0} is not part of any loaded package")]
    FileNotLoaded(PathBuf),

    #[error("function {name} not found in {file}")]
    NotFound { name: String, file: PathBuf },

    #[error("{name} is ambiguous in {file}: {}", .candidates.join(", "))]
    Ambiguous {
        name: String,
        file: PathBuf,
        candidates: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum ExampleError {
    #[error("reading {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Response(String),

    #[error("worker thread exited without a response")]
    Disconnected,

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("generated code does not parse: {0}")]
    Syntax(String),

    #[error("test function not found")]
    TestNotFound,
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("starting {program}: {source}")]
    ImportsSpawn { program: String, source: io::Error },

    #[error("{program} failed on {path}: {message}")]
    Imports {
        program: String,
        path: PathBuf,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("starting {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("waiting for {program}: {source}")]
    Wait { program: String, source: io::Error },

    #[error("test process failed without a recognizable diagnostic (exit {code}):\n{output}")]
    Unclassified { code: String, output: String },

    #[error("no test matched {0}")]
    NoTestsRan(String),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("loading source: {0}")]
    Load(#[from] LoadError),

    #[error("resolving focal function: {0}")]
    Resolve(#[from] ResolveError),

    #[error("selecting example tests: {0}")]
    Examples(#[from] ExampleError),

    #[error("generating test: {0}")]
    Generation(GenerationError),

    #[error("parsing generated test: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("saving test: {0}")]
    Patch(#[from] PatchError),

    #[error("running test: {0}")]
    Run(RunError),

    #[error("cancelled")]
    Cancelled,
}

impl From<GenerationError> for Error {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Cancelled => Error::Cancelled,
            other => Error::Generation(other),
        }
    }
}

impl From<RunError> for Error {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Cancelled => Error::Cancelled,
            other => Error::Run(other),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
